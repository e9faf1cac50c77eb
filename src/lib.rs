//! A `tail -F` library: follow a growing file and receive appended lines.
//!
//! The follower keeps up with log rotation (the old file is drained for a
//! grace period while the recreated one is picked up) and with in-place
//! truncation, and a missing file is waited for rather than reported. Lines
//! are delivered as raw bytes, exactly as written; decoding is left to the
//! consumer. Lines and errors arrive on a pair of channels owned by the
//! [`Tail`] handle; closing the handle tears every internal task down.
//!
//! # Example
//!
//! ```rust,no_run
//! use logtail::{tail_file, Options};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tail = tail_file("app.log", Options::default()).await?;
//!
//!     while let Some(line) = tail.lines.recv().await {
//!         print!("{}", String::from_utf8_lossy(&line.text));
//!     }
//!
//!     Ok(())
//! }
//! ```

// Internal modules - not part of public API
mod error;
mod fd_path;
mod follower;
mod reader;
mod tail;
mod watcher;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use error::{Error, Result};
pub use tail::{Line, Options, Tail};

use std::path::Path;
use tokio::io::AsyncRead;

/// Starts tailing a file, beginning at its current end.
///
/// The file does not have to exist yet; the follower waits for it to appear
/// and reads it from the start once it does. Rotation and truncation are
/// followed automatically.
///
/// # Example
///
/// ```rust,no_run
/// use logtail::{tail_file, Options};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut tail = tail_file("/var/log/app.log", Options::default()).await?;
///
///     while let Some(line) = tail.lines.recv().await {
///         print!("{}", String::from_utf8_lossy(&line.text));
///     }
///
///     Ok(())
/// }
/// ```
pub async fn tail_file<P: AsRef<Path>>(path: P, options: Options) -> Result<Tail> {
    let path = path.as_ref();
    let path = std::path::absolute(path).map_err(|source| Error::PathResolution {
        path: path.to_path_buf(),
        source,
    })?;

    let (tail, emitter) = Tail::new(&options);
    tokio::spawn(follower::run_file(emitter, path, follower::Anchor::End));
    Ok(tail)
}

/// Starts tailing an arbitrary byte stream.
///
/// No rotation handling applies; the tail ends when the stream does. EOF and
/// a broken pipe close the channels cleanly, and a final unterminated line
/// is delivered without its newline.
pub async fn tail_reader<R>(source: R, options: Options) -> Tail
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (tail, emitter) = Tail::new(&options);
    tokio::spawn(follower::run_reader(emitter, source));
    tail
}
