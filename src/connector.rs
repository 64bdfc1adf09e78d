//! Dial the proxy with an unredirected connect.
use std::{
    io,
    net::{SocketAddr, SocketAddrV4},
    os::unix::io::{AsRawFd, RawFd},
    time::Duration,
};

use socket2::{Domain, SockAddr, Socket, Type};
use tracing::{debug, trace};

use crate::Error;

/// The underlying connection primitive, free of any redirection.
///
/// Only ever used to reach the proxy, never the application's destination.
pub trait RealConnect {
    fn connect(&self, socket: &Socket, addr: &SockAddr) -> io::Result<()>;
}

/// Plain `connect(2)` on the socket, bounded by `timeout` when set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectConnect {
    pub timeout: Option<Duration>,
}

impl RealConnect for DirectConnect {
    fn connect(&self, socket: &Socket, addr: &SockAddr) -> io::Result<()> {
        match self.timeout {
            Some(timeout) => socket.connect_timeout(addr, timeout),
            None => socket.connect(addr),
        }
    }
}

/// Signature of `connect(2)`, as an interception layer finds the next definition.
pub type ConnectFn =
    unsafe extern "C" fn(libc::c_int, *const libc::sockaddr, libc::socklen_t) -> libc::c_int;

/// Wrap the original `connect` symbol handed over by an interception layer.
#[derive(Clone, Copy)]
pub struct RawConnect(ConnectFn);

impl RawConnect {
    /// # Safety
    ///
    /// `f` must behave like `connect(2)`.
    pub unsafe fn new(f: ConnectFn) -> RawConnect {
        RawConnect(f)
    }
}

impl RealConnect for RawConnect {
    fn connect(&self, socket: &Socket, addr: &SockAddr) -> io::Result<()> {
        let fd: RawFd = socket.as_raw_fd();
        let ret = unsafe { (self.0)(fd, addr.as_ptr(), addr.len()) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Open a fresh stream socket and connect it to `endpoint` through `real`.
///
/// The socket is closed before returning on failure.
pub fn open_proxy_connection<C>(endpoint: SocketAddrV4, real: &C) -> Result<Socket, Error>
where
    C: RealConnect + ?Sized,
{
    let socket =
        Socket::new(Domain::IPV4, Type::STREAM, None).map_err(Error::SocketCreation)?;
    trace!("opened proxy socket fd {}", socket.as_raw_fd());

    let addr = SockAddr::from(SocketAddr::V4(endpoint));
    if let Err(e) = real.connect(&socket, &addr) {
        debug!("connect proxy {} error: {}", endpoint, e);
        return Err(Error::ProxyUnreachable(e));
    }

    debug!("connected to proxy {}", endpoint);
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        net::{Ipv4Addr, TcpListener},
    };

    use super::*;

    struct Refuse(Cell<usize>);

    impl RealConnect for Refuse {
        fn connect(&self, _socket: &Socket, _addr: &SockAddr) -> io::Result<()> {
            self.0.set(self.0.get() + 1);
            Err(io::ErrorKind::ConnectionRefused.into())
        }
    }

    #[test]
    fn test_connect_proxy() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let endpoint = match listener.local_addr().unwrap() {
            SocketAddr::V4(addr) => addr,
            _ => unreachable!(),
        };

        let socket = open_proxy_connection(endpoint, &DirectConnect::default()).unwrap();
        let (_, peer) = listener.accept().unwrap();
        assert_eq!(socket.local_addr().unwrap().as_socket().unwrap(), peer);
    }

    #[test]
    fn test_unreachable_proxy() {
        let refuse = Refuse(Cell::new(0));
        let endpoint = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9);
        match open_proxy_connection(endpoint, &refuse) {
            Err(Error::ProxyUnreachable(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::ConnectionRefused)
            }
            other => panic!("unexpected {:?}", other.map(|s| s.as_raw_fd())),
        }
        assert_eq!(refuse.0.get(), 1);
    }

    #[test]
    fn test_raw_connect() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let endpoint = match listener.local_addr().unwrap() {
            SocketAddr::V4(addr) => addr,
            _ => unreachable!(),
        };

        let raw = unsafe { RawConnect::new(libc::connect) };
        let socket = open_proxy_connection(endpoint, &raw).unwrap();
        listener.accept().unwrap();
        assert!(socket.peer_addr().is_ok());
    }
}
