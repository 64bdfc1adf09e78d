use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    os::unix::io::RawFd,
    time::Duration,
};

use derivative::Derivative;
use socket2::Socket;
use tracing::{debug, error};

use crate::{
    config::Config,
    connector::{self, DirectConnect, RealConnect},
    consts::Error,
    handshake,
    proto::Identity,
    substitute::{Dup2, Substitute},
};

/// Stands in for `connect(2)`: every connect handed to it goes through the
/// configured SOCKS4 proxy instead.
///
/// Holds no per-call state, one instance can serve concurrent callers.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct Redirector<C = DirectConnect, S = Dup2> {
    endpoint: SocketAddrV4,
    identity: Identity,
    timeout: Option<Duration>,
    #[derivative(Debug = "ignore")]
    real_connect: C,
    #[derivative(Debug = "ignore")]
    substitute: S,
}

impl Redirector {
    pub fn new(cfg: &Config) -> Result<Redirector, Error> {
        let real_connect = DirectConnect {
            timeout: cfg.get_timeout(),
        };
        Redirector::with_parts(cfg, real_connect, Dup2)
    }
}

impl<C, S> Redirector<C, S>
where
    C: RealConnect,
    S: Substitute,
{
    pub fn with_parts(cfg: &Config, real_connect: C, substitute: S) -> Result<Self, Error> {
        cfg.validate()?;
        Ok(Redirector {
            endpoint: cfg.get_proxy_endpoint(),
            identity: cfg.get_identity(),
            timeout: cfg.get_timeout(),
            real_connect,
            substitute,
        })
    }

    pub fn endpoint(&self) -> SocketAddrV4 {
        self.endpoint
    }

    /// Connect `original` to `dst` through the proxy.
    ///
    /// On error `original` is exactly as it was handed in.
    pub fn redirect(&self, original: RawFd, dst: &SocketAddr) -> Result<(), Error> {
        if !dst.is_ipv4() {
            return Err(Error::UnsupportedAddress(*dst));
        }

        let mut proxy = connector::open_proxy_connection(self.endpoint, &self.real_connect)?;

        // proxy is dropped, and closed, on every error below
        self.handshake(&mut proxy, dst)?;
        self.substitute.substitute(original, proxy)?;

        debug!("fd {} connected to {} via {}", original, dst, self.endpoint);
        Ok(())
    }

    fn handshake(&self, proxy: &mut Socket, dst: &SocketAddr) -> Result<(), Error> {
        if let Some(timeout) = self.timeout {
            proxy.set_write_timeout(Some(timeout)).map_err(Error::Write)?;
            proxy.set_read_timeout(Some(timeout)).map_err(Error::Read)?;
        }

        handshake::perform_handshake(proxy, dst, self.identity)?;

        // the application must not inherit the handshake deadlines
        if self.timeout.is_some() {
            proxy.set_write_timeout(None).map_err(Error::Write)?;
            proxy.set_read_timeout(None).map_err(Error::Read)?;
        }
        Ok(())
    }

    /// `connect(2)` shaped entry for an interception layer: 0 on success,
    /// -1 with `errno` set otherwise.
    ///
    /// # Safety
    ///
    /// `addr` must be valid for reads of `len` bytes.
    pub unsafe fn redirect_raw(
        &self,
        fd: libc::c_int,
        addr: *const libc::sockaddr,
        len: libc::socklen_t,
    ) -> libc::c_int {
        let dst = match sockaddr_to_v4(addr, len) {
            Ok(dst) => dst,
            Err(errno) => {
                set_errno(errno);
                return -1;
            }
        };

        match self.redirect(fd, &SocketAddr::V4(dst)) {
            Ok(()) => 0,
            Err(e) => {
                error!("redirect fd {} to {}: {}", fd, dst, e);
                set_errno(e.errno());
                -1
            }
        }
    }
}

unsafe fn sockaddr_to_v4(
    addr: *const libc::sockaddr,
    len: libc::socklen_t,
) -> Result<SocketAddrV4, i32> {
    if addr.is_null() || (len as usize) < std::mem::size_of::<libc::sockaddr_in>() {
        return Err(libc::EINVAL);
    }
    if (*addr).sa_family as libc::c_int != libc::AF_INET {
        return Err(libc::EAFNOSUPPORT);
    }
    let sin = std::ptr::read_unaligned(addr as *const libc::sockaddr_in);
    let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
    Ok(SocketAddrV4::new(ip, u16::from_be(sin.sin_port)))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn set_errno(errno: i32) {
    unsafe { *libc::__errno_location() = errno }
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
fn set_errno(errno: i32) {
    unsafe { *libc::__error() = errno }
}

#[cfg(any(target_os = "openbsd", target_os = "netbsd"))]
fn set_errno(errno: i32) {
    unsafe { *libc::__errno() = errno }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
)))]
compile_error!("no errno accessor for this target, redirect_raw cannot report failures");
