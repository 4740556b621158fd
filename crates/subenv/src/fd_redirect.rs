//! Keep the protocol channel away from user code.
//!
//! The worker talks to its parent over fd 0/1. Code run by the interpreter (a
//! `print`, a spawned subprocess inheriting fd 1) would write straight into the
//! channel and corrupt framing. At startup we duplicate the channel to fresh
//! descriptors, point fd 1 at stderr and fd 0 at `/dev/null`.
//!
//! Must run before the interpreter executes anything.
//!
//! ## Safety
//!
//! The `unsafe` blocks borrow fds 0, 1 and 2, which the OS guarantees open at
//! process start, and take temporary ownership of fd 0/1 only to hand them to
//! `dup2`, then forget them so they are never closed.

use std::fs::File;
use std::io;

#[cfg(unix)]
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

#[cfg(unix)]
use nix::unistd::{dup, dup2};

/// Duplicated protocol descriptors, detached from fd 0/1.
pub struct ProtocolFds {
    pub input: File,
    pub output: File,
}

#[cfg(unix)]
pub fn isolate_protocol_fds() -> io::Result<ProtocolFds> {
    let input = unsafe { dup(BorrowedFd::borrow_raw(0)) }
        .map_err(|e| io::Error::other(format!("dup(0) failed: {e}")))?;
    let output = unsafe { dup(BorrowedFd::borrow_raw(1)) }
        .map_err(|e| io::Error::other(format!("dup(1) failed: {e}")))?;

    tracing::trace!(
        input_fd = input.as_raw_fd(),
        output_fd = output.as_raw_fd(),
        "Duplicated protocol fds"
    );

    let devnull = File::open("/dev/null")?;
    let mut fd0 = unsafe { OwnedFd::from_raw_fd(0) };
    let redirected = dup2(&devnull, &mut fd0);
    std::mem::forget(fd0);
    redirected.map_err(|e| io::Error::other(format!("dup2(/dev/null, 0) failed: {e}")))?;

    let stderr = unsafe { BorrowedFd::borrow_raw(2) };
    let mut fd1 = unsafe { OwnedFd::from_raw_fd(1) };
    let redirected = dup2(stderr, &mut fd1);
    std::mem::forget(fd1);
    redirected.map_err(|e| io::Error::other(format!("dup2(2, 1) failed: {e}")))?;

    tracing::debug!("Protocol channel isolated from stdio");

    Ok(ProtocolFds {
        input: File::from(input),
        output: File::from(output),
    })
}

/// No isolation off unix: the protocol shares the process's stdio.
#[cfg(not(unix))]
pub fn isolate_protocol_fds() -> io::Result<ProtocolFds> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "stdio isolation is only available on unix",
    ))
}
