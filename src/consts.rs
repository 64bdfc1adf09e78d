//! SOCKS4 related constants
//!
//! Client send connect request to proxy:
//! ```txt
//! +----+----+---------+---------+----------+
//! | VN | CD | DSTPORT |  DSTIP  |  USERID  |
//! +----+----+---------+---------+----------+
//! | 1  | 1  |    2    |    4    |    8     |
//! +----+----+---------+---------+----------+
//! ```
//!
//! Proxy reply:
//! ```txt
//! +----+----+---------+---------+
//! | VN | CD | DSTPORT |  DSTIP  |
//! +----+----+---------+---------+
//! | 1  | 1  |    2    |    4    |
//! +----+----+---------+---------+
//! ```
//!
//! example: connect 93.184.216.34:80 as `toraliz`
//! bytes: `0x04 0x01 0x00 0x50 0x5d 0xb8 0xd8 0x22 b"toraliz" 0x00`
//!

use std::{io, net::SocketAddr};

pub const SOCKS4_VERSION: u8 = 4;
pub const SOCKS4_CMD_CONNECT: u8 = 1;

pub const SOCKS4_REPLY_GRANTED: u8 = 90;
pub const SOCKS4_REPLY_REJECTED: u8 = 91;
pub const SOCKS4_REPLY_NO_IDENTD: u8 = 92;
pub const SOCKS4_REPLY_IDENTD_MISMATCH: u8 = 93;

/// width of the USERID field, shorter identities are zero padded
pub const IDENTITY_LEN: usize = 8;
pub const REQUEST_LEN: usize = 8 + IDENTITY_LEN;
pub const REPLY_LEN: usize = 8;

pub const DEFAULT_PROXY_PORT: u16 = 9050;
pub const DEFAULT_IDENTITY: &str = "toraliz";
pub const CONFIG_PATH_ENV: &str = "TORALIZE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("create proxy socket: {0}")]
    SocketCreation(io::Error),
    #[error("proxy unreachable: {0}")]
    ProxyUnreachable(io::Error),
    #[error("write request: {0}")]
    Write(io::Error),
    #[error("read reply: {0}")]
    Read(io::Error),
    #[error("proxy rejected request, code {0}")]
    ProxyRejected(u8),
    #[error("substitute connection: {0}")]
    Substitution(io::Error),
    #[error("unsupported destination address {0}")]
    UnsupportedAddress(SocketAddr),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// errno an intercepted `connect(2)` should report for this error
    pub fn errno(&self) -> i32 {
        match self {
            Error::SocketCreation(e) => os_errno(e, libc::EMFILE),
            Error::ProxyUnreachable(e) => os_errno(e, libc::ECONNREFUSED),
            Error::Write(e) | Error::Read(e) => os_errno(e, libc::ECONNRESET),
            Error::ProxyRejected(_) => libc::ECONNREFUSED,
            Error::Substitution(e) => os_errno(e, libc::EBADF),
            Error::UnsupportedAddress(_) => libc::EAFNOSUPPORT,
            Error::InvalidConfig(_) => libc::EINVAL,
        }
    }
}

// an expired SO_RCVTIMEO/SO_SNDTIMEO shows up as EAGAIN
fn os_errno(e: &io::Error, fallback: i32) -> i32 {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => libc::ETIMEDOUT,
        _ => e.raw_os_error().unwrap_or(fallback),
    }
}
