//! Recovering the current pathname of an open file descriptor.
//!
//! After a rename the follower only knows the file by its descriptor; the
//! resolved name is what gets added to the watcher so writes to the renamed
//! file keep waking the reader.

use std::fs::File;
use std::io;
use std::path::PathBuf;

/// Resolves the pathname an open file currently has.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
))]
pub(crate) fn path_of(file: &File) -> io::Result<PathBuf> {
    use std::os::unix::io::AsRawFd;

    std::fs::read_link(format!("/proc/self/fd/{}", file.as_raw_fd()))
}

/// Resolves the pathname an open file currently has.
#[cfg(target_os = "macos")]
pub(crate) fn path_of(file: &File) -> io::Result<PathBuf> {
    use std::ffi::{CStr, OsStr};
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::io::AsRawFd;

    let mut buf = [0u8; libc::PATH_MAX as usize];
    loop {
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_GETPATH, buf.as_mut_ptr()) };
        if rc != -1 {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }

    let cstr = CStr::from_bytes_until_nul(&buf)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "unterminated F_GETPATH buffer"))?;
    Ok(PathBuf::from(OsStr::from_bytes(cstr.to_bytes())))
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
    target_os = "macos",
)))]
pub(crate) fn path_of(_file: &File) -> io::Result<PathBuf> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "fd path resolution is not supported on this platform",
    ))
}
