//! Buffered line extraction over an arbitrary byte source.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Read buffer capacity when no line-length cap shrinks it.
const DEFAULT_BUF_CAPACITY: usize = 4096;

/// Extracts newline-terminated lines from a byte source.
///
/// Reads happen through a fixed-capacity buffer; a line longer than the
/// buffer accumulates in the carry buffer across reads. At EOF any
/// unterminated tail stays in the carry buffer and is prepended to the next
/// successful read, so the concatenation of every emitted line plus the
/// current carry always equals the bytes consumed from the source.
pub(crate) struct LineReader<R> {
    source: R,
    buf: Box<[u8]>,
    pos: usize,
    filled: usize,
    carry: Vec<u8>,
    max_line: usize,
    offset: u64,
}

impl<R> LineReader<R> {
    /// Wraps `source`, starting the cursor accounting at `offset`.
    ///
    /// `max_line` of zero means unbounded; a positive value caps both the
    /// read buffer capacity and the length at which an unterminated line is
    /// force-emitted.
    pub(crate) fn new(source: R, max_line: usize, offset: u64) -> Self {
        let capacity = if max_line > 0 {
            max_line.min(DEFAULT_BUF_CAPACITY)
        } else {
            DEFAULT_BUF_CAPACITY
        };
        Self {
            source,
            buf: vec![0; capacity].into_boxed_slice(),
            pos: 0,
            filled: 0,
            carry: Vec::new(),
            max_line,
            offset,
        }
    }

    /// Bytes read from the source so far; tracks the underlying file cursor.
    pub(crate) fn position(&self) -> u64 {
        self.offset
    }

    pub(crate) fn source_ref(&self) -> &R {
        &self.source
    }

    /// Drains the carry buffer, returning any unterminated tail as a line
    /// without a trailing newline. Only meaningful once the source is known
    /// to produce no further bytes.
    pub(crate) fn take_partial(&mut self) -> Option<Vec<u8>> {
        if self.carry.is_empty() {
            None
        } else {
            Some(self.take_carry())
        }
    }

    fn take_carry(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.carry)
    }
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Returns the next complete line including its trailing newline, or
    /// `None` at EOF. A partial line at EOF stays in the carry buffer.
    ///
    /// Lines are raw bytes: nothing is validated or substituted, so the
    /// emitted lines reconstruct the source exactly. With a line cap set, an
    /// unterminated line reaching the cap is emitted early without a newline
    /// and the remainder becomes the continuation. Read errors are returned
    /// as-is; the carry buffer is left untouched so a later retry resumes
    /// where this read left off.
    pub(crate) async fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            while self.pos < self.filled {
                let chunk = &self.buf[self.pos..self.filled];
                match chunk.iter().position(|&b| b == b'\n') {
                    Some(i) => {
                        if self.max_line > 0 && self.carry.len() + i + 1 > self.max_line {
                            let room = self.max_line - self.carry.len();
                            self.carry.extend_from_slice(&chunk[..room]);
                            self.pos += room;
                        } else {
                            self.carry.extend_from_slice(&chunk[..=i]);
                            self.pos += i + 1;
                        }
                        return Ok(Some(self.take_carry()));
                    }
                    None => {
                        if self.max_line > 0 && self.carry.len() + chunk.len() >= self.max_line {
                            let room = self.max_line - self.carry.len();
                            self.carry.extend_from_slice(&chunk[..room]);
                            self.pos += room;
                            return Ok(Some(self.take_carry()));
                        }
                        self.carry.extend_from_slice(chunk);
                        self.pos = self.filled;
                    }
                }
            }

            let n = self.source.read(&mut self.buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.offset += n as u64;
            self.pos = 0;
            self.filled = n;
        }
    }
}

impl<R: AsyncRead + AsyncSeek + Unpin> LineReader<R> {
    /// Seeks the source back to offset zero after a truncation, discarding
    /// buffered readahead. The carry buffer is kept: bytes already consumed
    /// belong to the line under assembly, not to the discarded region.
    pub(crate) async fn rewind(&mut self) -> io::Result<()> {
        self.source.seek(io::SeekFrom::Start(0)).await?;
        self.offset = 0;
        self.pos = 0;
        self.filled = 0;
        Ok(())
    }
}
