//! The per-file follower: open-with-retry, truncation detection, the
//! reader/event task pair, and the rotation handoff.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::fd_path;
use crate::reader::LineReader;
use crate::tail::Emitter;
use crate::watcher::{classify, FileEvent, FileWatcher};

/// How long to wait before re-trying to open a missing file.
const OPEN_RETRY_INTERVAL: Duration = Duration::from_secs(1);
/// How long a renamed file keeps being tailed after rotation.
const OLD_FILE_GRACE: Duration = Duration::from_secs(15);

/// Where to start reading on first open.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Anchor {
    Start,
    End,
}

/// What the reader task reports to the event task.
enum ReaderSignal {
    Eof,
    Fatal(Error),
}

/// Follows `path` until its follower exits, surviving rotation: each rename
/// spawns a fresh chain on the original path. Boxed because that makes the
/// chain recursive through `tokio::spawn`.
pub(crate) fn run_file(
    emitter: Emitter,
    path: PathBuf,
    anchor: Anchor,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        match FileFollower::open(&emitter, path, anchor).await {
            Ok(Some(follower)) => follower.run().await,
            // Cancelled while waiting for the file; nothing to report.
            Ok(None) => {}
            Err(err) => {
                if !emitter.cancel.is_cancelled() {
                    emitter.emit_error(err).await;
                }
            }
        }
    })
}

/// Tails a plain byte stream: line extraction only. EOF and a broken pipe
/// are clean endings, and the final unterminated line is delivered then.
pub(crate) async fn run_reader<R>(emitter: Emitter, source: R)
where
    R: AsyncRead + Unpin,
{
    let mut reader = LineReader::new(source, emitter.max_line_bytes, 0);
    loop {
        let next = tokio::select! {
            _ = emitter.cancel.cancelled() => return,
            next = reader.next_line() => next,
        };
        match next {
            Ok(Some(text)) => {
                if !emitter.emit_line(text).await {
                    return;
                }
            }
            Ok(None) => break,
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => break,
            Err(err) => {
                if !emitter.cancel.is_cancelled() {
                    emitter.emit_error(err.into()).await;
                }
                return;
            }
        }
    }

    // The stream is over for good; hand over any unterminated tail.
    if let Some(rest) = reader.take_partial() {
        emitter.emit_line(rest).await;
    }
}

/// One open file being followed.
struct FileFollower {
    reader: LineReader<File>,
    emitter: Emitter,
    path: PathBuf,
    token: CancellationToken,
    watcher: FileWatcher,
    /// Duplicate handle used to recover the file's pathname after a rename.
    fd_handle: std::fs::File,
}

impl FileFollower {
    /// Opens the watched path, waiting for it to appear if necessary.
    ///
    /// Returns `Ok(None)` when cancelled during the wait. Only NotFound is
    /// retried; any other open failure is fatal to this follower. The `End`
    /// anchor is honored on the first attempt alone: a file that appears
    /// after a retry holds nothing but new data, so retries start at the
    /// top.
    async fn open(emitter: &Emitter, path: PathBuf, anchor: Anchor) -> Result<Option<Self>> {
        let mut watcher = FileWatcher::new()?;
        let mut anchor = anchor;
        let mut file = loop {
            match File::open(&path).await {
                Ok(file) => break file,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    anchor = Anchor::Start;
                    trace!(path = %path.display(), "file absent, waiting");
                    tokio::select! {
                        _ = emitter.cancel.cancelled() => return Ok(None),
                        _ = sleep(OPEN_RETRY_INTERVAL) => {}
                    }
                }
                Err(err) => {
                    return Err(Error::Open {
                        path: path.clone(),
                        source: err,
                    })
                }
            }
        };

        let position = match anchor {
            Anchor::End => file.seek(io::SeekFrom::End(0)).await?,
            Anchor::Start => 0,
        };
        watcher.watch(&path)?;
        let fd_handle = file.try_clone().await?.into_std().await;

        debug!(path = %path.display(), position, "following file");
        Ok(Some(Self {
            reader: LineReader::new(file, emitter.max_line_bytes, position),
            emitter: emitter.clone(),
            path,
            token: emitter.cancel.child_token(),
            watcher,
            fd_handle,
        }))
    }

    /// Runs the event loop, with the reader loop on a task of its own so a
    /// long read never delays rename or remove handling.
    async fn run(self) {
        let Self {
            reader,
            emitter,
            path,
            token,
            mut watcher,
            fd_handle,
        } = self;

        let (signal_tx, mut signal_rx) = mpsc::channel(1);
        let (wake_tx, wake_rx) = mpsc::channel(1);
        tokio::spawn(read_loop(
            reader,
            emitter.clone(),
            token.clone(),
            signal_tx,
            wake_rx,
        ));

        let mut renamed = false;
        // The reader is parked and needs a wake on the next event.
        let mut waiting = false;
        // An event arrived mid-pass; wake the reader as soon as it parks.
        let mut pending_write = false;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,

                event = watcher.next() => {
                    let event = match event {
                        Some(Ok(event)) => event,
                        Some(Err(err)) => {
                            emitter.emit_error(err.into()).await;
                            break;
                        }
                        None => break,
                    };
                    match classify(&event.kind) {
                        FileEvent::Remove => {
                            debug!(path = %path.display(), "watched file removed");
                            break;
                        }
                        FileEvent::Rename => {
                            if !renamed {
                                debug!(path = %path.display(), "rotation detected");
                                tokio::spawn(run_file(
                                    emitter.clone(),
                                    path.clone(),
                                    Anchor::Start,
                                ));
                                spawn_grace_timer(token.clone());
                            }
                            // Writes may still land on the renamed file;
                            // track it under its new name to keep seeing them.
                            let moved_to = match fd_path::path_of(&fd_handle) {
                                Ok(moved_to) => moved_to,
                                Err(err) => {
                                    emitter.emit_error(Error::FdPathResolve(err)).await;
                                    break;
                                }
                            };
                            if let Err(err) = watcher.watch(&moved_to) {
                                emitter.emit_error(err).await;
                                break;
                            }
                            renamed = true;
                        }
                        FileEvent::Write => {}
                    }
                    // Any surviving event counts as write activity: a rename
                    // may carry bytes appended just before it.
                    if waiting {
                        let _ = wake_tx.try_send(());
                        waiting = false;
                        pending_write = false;
                    } else {
                        pending_write = true;
                    }
                }

                signal = signal_rx.recv() => match signal {
                    Some(ReaderSignal::Eof) => {
                        if pending_write {
                            // The file changed while the reader was draining;
                            // send it straight back instead of parking it.
                            let _ = wake_tx.try_send(());
                            pending_write = false;
                        } else {
                            waiting = true;
                        }
                    }
                    Some(ReaderSignal::Fatal(err)) => {
                        emitter.emit_error(err).await;
                        break;
                    }
                    None => break,
                },
            }
        }

        // Stops the reader task and the grace timer; dropping the wake
        // sender unparks a reader already waiting.
        token.cancel();
    }
}

/// The reader half: truncation check, drain to EOF, signal, park.
async fn read_loop(
    mut reader: LineReader<File>,
    emitter: Emitter,
    token: CancellationToken,
    signals: mpsc::Sender<ReaderSignal>,
    mut wake: mpsc::Receiver<()>,
) {
    loop {
        if let Err(err) = detect_truncation(&mut reader).await {
            send_signal(&signals, &token, ReaderSignal::Fatal(err)).await;
            return;
        }

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return,
                next = reader.next_line() => next,
            };
            match next {
                Ok(Some(text)) => {
                    if !emitter.emit_line(text).await {
                        return;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    send_signal(&signals, &token, ReaderSignal::Fatal(err.into())).await;
                    return;
                }
            }
        }

        if !send_signal(&signals, &token, ReaderSignal::Eof).await {
            return;
        }
        tokio::select! {
            _ = token.cancelled() => return,
            woken = wake.recv() => {
                if woken.is_none() {
                    return;
                }
            }
        }
    }
}

async fn send_signal(
    signals: &mpsc::Sender<ReaderSignal>,
    token: &CancellationToken,
    signal: ReaderSignal,
) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        res = signals.send(signal) => res.is_ok(),
    }
}

/// A process truncating in place keeps the inode but shrinks the file; a
/// cursor larger than the size would otherwise sit past EOF forever.
async fn detect_truncation(reader: &mut LineReader<File>) -> Result<()> {
    let size = reader.source_ref().metadata().await?.len();
    if size < reader.position() {
        debug!(size, position = reader.position(), "file truncated, rewinding");
        reader.rewind().await?;
    }
    Ok(())
}

/// Bounds how long a renamed file keeps a follower alive after rotation.
fn spawn_grace_timer(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = sleep(OLD_FILE_GRACE) => {
                debug!("rotation grace window elapsed, stopping old follower");
                token.cancel();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tail::{Options, Tail};
    use crate::test_helpers::TempLogFile;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn open_reader_at(log: &TempLogFile, offset: u64) -> LineReader<File> {
        let file = File::open(log.path()).await.unwrap();
        LineReader::new(file, 0, offset)
    }

    #[tokio::test]
    async fn test_detect_truncation_rewinds_shrunken_file() {
        let log = TempLogFile::with_content("one\ntwo\n").unwrap();
        let mut reader = open_reader_at(&log, 8).await;

        log.truncate().unwrap();
        log.append("x\n").unwrap();
        detect_truncation(&mut reader).await.unwrap();

        assert_eq!(reader.position(), 0);
        assert_eq!(reader.next_line().await.unwrap(), Some(b"x\n".to_vec()));
    }

    #[tokio::test]
    async fn test_detect_truncation_ignores_growth() {
        let log = TempLogFile::with_content("one\ntwo\n").unwrap();
        let mut reader = open_reader_at(&log, 4).await;

        detect_truncation(&mut reader).await.unwrap();

        assert_eq!(reader.position(), 4);
    }

    #[tokio::test]
    async fn test_open_returns_none_when_cancelled() {
        let (_tail, emitter) = Tail::new(&Options::default());
        emitter.cancel.cancel();

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.log");

        let opened = timeout(
            Duration::from_secs(5),
            FileFollower::open(&emitter, missing, Anchor::End),
        )
        .await
        .expect("cancelled open should not keep retrying")
        .unwrap();
        assert!(opened.is_none());
    }

    #[tokio::test]
    async fn test_open_does_not_retry_fatal_errors() {
        let (_tail, emitter) = Tail::new(&Options::default());

        // A path whose parent is a regular file fails with NotADirectory,
        // which must not enter the retry loop.
        let log = TempLogFile::with_content("x\n").unwrap();
        let bogus = log.path().join("child.log");

        let result = timeout(
            Duration::from_secs(5),
            FileFollower::open(&emitter, bogus, Anchor::End),
        )
        .await
        .expect("fatal open errors should fail fast");
        assert!(matches!(result, Err(Error::Open { .. })));
    }

    #[tokio::test]
    async fn test_open_end_anchor_starts_at_eof() {
        let (_tail, emitter) = Tail::new(&Options::default());
        let log = TempLogFile::with_content("existing\n").unwrap();

        let follower = FileFollower::open(&emitter, log.path().to_path_buf(), Anchor::End)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(follower.reader.position(), 9);
    }

    #[tokio::test]
    async fn test_open_start_anchor_reads_existing_content() {
        let (_tail, emitter) = Tail::new(&Options::default());
        let log = TempLogFile::with_content("existing\n").unwrap();

        let mut follower = FileFollower::open(&emitter, log.path().to_path_buf(), Anchor::Start)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            follower.reader.next_line().await.unwrap(),
            Some(b"existing\n".to_vec())
        );
    }
}
