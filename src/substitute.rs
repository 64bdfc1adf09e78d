use std::{
    io,
    os::unix::io::{AsRawFd, RawFd},
};

use socket2::Socket;
use tracing::trace;

use crate::Error;

/// Make `original` observe the connection held by `proxy`.
///
/// Implementations consume `proxy`: once this returns, either `original`
/// carries the connection or it is untouched and `proxy` has been closed.
/// The descriptor flags of `original` (close-on-exec, non-blocking) are
/// kept as the application set them.
pub trait Substitute {
    fn substitute(&self, original: RawFd, proxy: Socket) -> Result<(), Error>;
}

/// Substitution with `dup2(2)`: the descriptor number stays the application's,
/// the open file behind it becomes the proxy connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dup2;

impl Substitute for Dup2 {
    fn substitute(&self, original: RawFd, proxy: Socket) -> Result<(), Error> {
        let fd = proxy.as_raw_fd();
        if fd == original {
            // already the same descriptor, keep it open
            std::mem::forget(proxy);
            return Ok(());
        }

        // dup2 clears FD_CLOEXEC, and O_NONBLOCK follows the proxy's open file
        let fd_flags = fcntl(original, libc::F_GETFD, 0)?;
        let fl_flags = fcntl(original, libc::F_GETFL, 0)?;
        proxy
            .set_nonblocking(fl_flags & libc::O_NONBLOCK != 0)
            .map_err(Error::Substitution)?;

        let ret = unsafe { libc::dup2(fd, original) };
        if ret < 0 {
            return Err(Error::Substitution(io::Error::last_os_error()));
        }
        fcntl(original, libc::F_SETFD, fd_flags)?;

        trace!("fd {} now carries proxy connection, closing fd {}", original, fd);
        Ok(())
    }
}

fn fcntl(fd: RawFd, cmd: libc::c_int, arg: libc::c_int) -> Result<libc::c_int, Error> {
    let ret = unsafe { libc::fcntl(fd, cmd, arg) };
    if ret < 0 {
        return Err(Error::Substitution(io::Error::last_os_error()));
    }
    Ok(ret)
}
