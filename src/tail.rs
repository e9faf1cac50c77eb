//! The consumer-facing handle and the channel plumbing behind it.

use std::time::SystemTime;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Capacity of the lines channel.
const LINES_CAPACITY: usize = 1024;
/// Capacity of the errors channel.
const ERRORS_CAPACITY: usize = 16;

/// A line of the target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Line content as raw bytes, including the trailing newline when one
    /// was read. No decoding is applied; the delivered lines reconstruct
    /// the source exactly.
    pub text: Vec<u8>,
    /// When the line was extracted.
    pub time: SystemTime,
}

/// Tailing options.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Caps line assembly length in bytes; an unterminated line reaching the
    /// cap is delivered early, split. Zero means unbounded.
    pub max_line_bytes: usize,
}

/// Sender-side bundle cloned into every spawned task.
///
/// Tasks hold this instead of a reference back to the [`Tail`] handle. When
/// the last clone drops the lines and errors channels close, and the
/// completion channel unblocks [`Tail::close`]; closed channels therefore
/// mean every task has exited.
#[derive(Clone)]
pub(crate) struct Emitter {
    pub(crate) lines: mpsc::Sender<Line>,
    pub(crate) errors: mpsc::Sender<Error>,
    pub(crate) cancel: CancellationToken,
    pub(crate) max_line_bytes: usize,
    _completion: mpsc::Sender<()>,
}

impl Emitter {
    /// Delivers one line to the consumer. Returns `false` when the follower
    /// should stop: the handle was cancelled or the consumer went away.
    pub(crate) async fn emit_line(&self, text: Vec<u8>) -> bool {
        let line = Line {
            text,
            time: SystemTime::now(),
        };
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            res = self.lines.send(line) => res.is_ok(),
        }
    }

    /// Surfaces an error to the consumer. The send is attempted under
    /// cancellation so a full errors channel can never wedge teardown; the
    /// caller exits afterwards whether or not the send landed.
    pub(crate) async fn emit_error(&self, error: Error) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.errors.send(error) => {}
        }
    }
}

/// Handle to an active tail.
///
/// Lines and errors arrive on the two public receivers. Both channels close,
/// exactly once, after every internal task has exited: on [`Tail::close`],
/// or on their own when the source ends (reader-mode EOF, watched file
/// removed). Dropping the handle cancels the tail without waiting.
pub struct Tail {
    /// Receive end for extracted lines.
    pub lines: mpsc::Receiver<Line>,
    /// Receive end for non-fatal and fatal follower errors. A fatal error
    /// stops the follower it came from, not the whole tail.
    pub errors: mpsc::Receiver<Error>,
    cancel: CancellationToken,
    completion: mpsc::Receiver<()>,
}

impl Tail {
    /// Builds a handle plus the emitter its tasks will hold.
    pub(crate) fn new(options: &Options) -> (Self, Emitter) {
        let (lines_tx, lines_rx) = mpsc::channel(LINES_CAPACITY);
        let (errors_tx, errors_rx) = mpsc::channel(ERRORS_CAPACITY);
        let (completion_tx, completion_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let emitter = Emitter {
            lines: lines_tx,
            errors: errors_tx,
            cancel: cancel.clone(),
            max_line_bytes: options.max_line_bytes,
            _completion: completion_tx,
        };
        let tail = Self {
            lines: lines_rx,
            errors: errors_rx,
            cancel,
            completion: completion_rx,
        };
        (tail, emitter)
    }

    /// Stops tailing and waits until every spawned task has exited.
    /// Idempotent.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        // Nothing is ever sent on the completion channel; recv resolves when
        // the last task drops its emitter.
        let _ = self.completion.recv().await;
    }
}

impl Drop for Tail {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
