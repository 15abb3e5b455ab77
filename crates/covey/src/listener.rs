// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared-socket plumbing between the master and its workers.
//!
//! The master binds one listening socket, clears `FD_CLOEXEC`, and
//! passes the raw fd to each spawned worker. Workers rebuild a tokio
//! listener from the inherited fd and accept from the shared socket;
//! the kernel distributes incoming connections across the pool.

use std::net::TcpListener;

use covey_core::CoveyError;
use covey_pool::LISTEN_FD_ENV;

/// Bind the master's listening socket.
pub fn bind(host: &str, port: u16) -> Result<TcpListener, CoveyError> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .map_err(|e| CoveyError::Internal(format!("failed to bind listener on {addr}: {e}")))
}

/// Clear `FD_CLOEXEC` on the listener so spawned workers inherit it.
///
/// Returns the raw fd to pass to workers via [`LISTEN_FD_ENV`].
#[cfg(unix)]
pub fn make_inheritable(listener: &TcpListener) -> Result<i32, CoveyError> {
    use std::os::unix::io::AsRawFd;

    let fd = listener.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(fcntl_error(fd));
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) };
    if rc < 0 {
        return Err(fcntl_error(fd));
    }
    Ok(fd)
}

#[cfg(unix)]
fn fcntl_error(fd: i32) -> CoveyError {
    CoveyError::Internal(format!(
        "fcntl on listener fd {fd} failed: {}",
        std::io::Error::last_os_error()
    ))
}

/// Rebuild the inherited listening socket inside a worker.
#[cfg(unix)]
pub fn from_env() -> Result<tokio::net::TcpListener, CoveyError> {
    let raw = std::env::var(LISTEN_FD_ENV).map_err(|_| {
        CoveyError::Internal(format!(
            "{LISTEN_FD_ENV} not set; the worker subcommand is spawned by `covey serve`"
        ))
    })?;
    let fd: i32 = raw
        .parse()
        .map_err(|_| CoveyError::Internal(format!("{LISTEN_FD_ENV}=`{raw}` is not an fd")))?;
    // The master passed us sole ownership of this descriptor.
    unsafe { from_fd(fd) }
}

/// Adopt a raw listener fd.
///
/// # Safety
/// `fd` must be an open TCP listening socket that no other handle in
/// this process owns; the returned listener takes ownership and closes
/// it on drop.
#[cfg(unix)]
pub unsafe fn from_fd(fd: i32) -> Result<tokio::net::TcpListener, CoveyError> {
    use std::os::unix::io::FromRawFd;

    let std_listener = unsafe { TcpListener::from_raw_fd(fd) };
    std_listener
        .set_nonblocking(true)
        .map_err(|e| CoveyError::Internal(format!("failed to set listener nonblocking: {e}")))?;
    tokio::net::TcpListener::from_std(std_listener)
        .map_err(|e| CoveyError::Internal(format!("failed to adopt listener fd {fd}: {e}")))
}
