use std::{
    fmt::{self, Formatter},
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
};

use bytes::{BufMut, Bytes, BytesMut};

use crate::consts::*;

/// USERID field as it goes on the wire: at most `IDENTITY_LEN` bytes, zero padded.
///
/// Longer strings are truncated, an identity of exactly `IDENTITY_LEN` bytes
/// carries no terminator inside the field.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Identity([u8; IDENTITY_LEN]);

impl Identity {
    pub fn new(s: &str) -> Identity {
        let mut field = [0u8; IDENTITY_LEN];
        let n = s.len().min(IDENTITY_LEN);
        field[..n].copy_from_slice(&s.as_bytes()[..n]);
        Identity(field)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }
}

impl Default for Identity {
    fn default() -> Self {
        Identity::new(DEFAULT_IDENTITY)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(IDENTITY_LEN);
        write!(f, "{:?}", String::from_utf8_lossy(&self.0[..end]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRequest {
    pub dst: SocketAddrV4,
    pub identity: Identity,
}

impl ConnectRequest {
    /// Only IPv4 destinations can be expressed in SOCKS4 without hostname resolution.
    pub fn new(dst: &SocketAddr, identity: Identity) -> Result<ConnectRequest, Error> {
        match *dst {
            SocketAddr::V4(dst) => Ok(ConnectRequest { dst, identity }),
            SocketAddr::V6(..) => Err(Error::UnsupportedAddress(*dst)),
        }
    }

    pub fn write_to_buf<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(SOCKS4_VERSION);
        buf.put_u8(SOCKS4_CMD_CONNECT);
        buf.put_u16(self.dst.port());
        buf.put_slice(&self.dst.ip().octets());
        buf.put_slice(self.identity.as_bytes());
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(REQUEST_LEN);
        self.write_to_buf(&mut buf);
        debug_assert_eq!(buf.len(), REQUEST_LEN);
        buf.freeze()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectReply {
    pub code: ReplyCode,
    /// port and address echoed by the proxy, unused for CONNECT
    pub bound: SocketAddrV4,
}

impl ConnectReply {
    /// `buf` must be a complete reply, partial reads are never decoded.
    pub fn decode(buf: &[u8; REPLY_LEN]) -> ConnectReply {
        let port = u16::from_be_bytes([buf[2], buf[3]]);
        let ip = Ipv4Addr::new(buf[4], buf[5], buf[6], buf[7]);
        ConnectReply {
            code: ReplyCode::from(buf[1]),
            bound: SocketAddrV4::new(ip, port),
        }
    }

    pub fn is_granted(&self) -> bool {
        self.code == ReplyCode::Granted
    }
}

/// Status byte of a reply. Anything but `Granted` is a rejection, the
/// other names only exist for diagnostics.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    Granted,
    Rejected,
    NoIdentd,
    IdentdMismatch,
    Unknown(u8),
}

impl From<u8> for ReplyCode {
    fn from(code: u8) -> Self {
        match code {
            SOCKS4_REPLY_GRANTED => ReplyCode::Granted,
            SOCKS4_REPLY_REJECTED => ReplyCode::Rejected,
            SOCKS4_REPLY_NO_IDENTD => ReplyCode::NoIdentd,
            SOCKS4_REPLY_IDENTD_MISMATCH => ReplyCode::IdentdMismatch,
            n => ReplyCode::Unknown(n),
        }
    }
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        match code {
            ReplyCode::Granted => SOCKS4_REPLY_GRANTED,
            ReplyCode::Rejected => SOCKS4_REPLY_REJECTED,
            ReplyCode::NoIdentd => SOCKS4_REPLY_NO_IDENTD,
            ReplyCode::IdentdMismatch => SOCKS4_REPLY_IDENTD_MISMATCH,
            ReplyCode::Unknown(n) => n,
        }
    }
}

impl fmt::Debug for ReplyCode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Granted => write!(f, "granted"),
            Self::Rejected => write!(f, "rejected or failed"),
            Self::NoIdentd => write!(f, "identd unreachable"),
            Self::IdentdMismatch => write!(f, "identd user mismatch"),
            Self::Unknown(n) => write!(f, "unknown({})", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv6Addr, SocketAddrV6};

    use super::*;

    fn example_dst() -> SocketAddr {
        "93.184.216.34:80".parse().unwrap()
    }

    #[test]
    fn test_encode_request() {
        let req = ConnectRequest::new(&example_dst(), Identity::new("toraliz")).unwrap();
        assert_eq!(
            &req.to_bytes()[..],
            &[0x04, 0x01, 0x00, 0x50, 93, 184, 216, 34, b't', b'o', b'r', b'a', b'l', b'i', b'z', 0x00]
        );
    }

    #[test]
    fn test_identity_truncated_to_field() {
        let req = ConnectRequest::new(&example_dst(), Identity::new("averyverylongname")).unwrap();
        let bytes = req.to_bytes();
        assert_eq!(bytes.len(), REQUEST_LEN);
        assert_eq!(&bytes[8..], b"averyver");
    }

    #[test]
    fn test_identity_zero_padded() {
        let id = Identity::new("ab");
        assert_eq!(id.as_bytes(), &[b'a', b'b', 0, 0, 0, 0, 0, 0]);
        assert_eq!(format!("{:?}", id), "\"ab\"");
        assert_eq!(Identity::new("").as_bytes(), &[0u8; IDENTITY_LEN]);
    }

    #[test]
    fn test_ipv6_destination_refused() {
        let dst = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 80, 0, 0));
        match ConnectRequest::new(&dst, Identity::default()) {
            Err(Error::UnsupportedAddress(addr)) => assert_eq!(addr, dst),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_reply() {
        let reply = ConnectReply::decode(&[0x00, 0x5A, 0x1F, 0x90, 10, 0, 0, 1]);
        assert!(reply.is_granted());
        assert_eq!(reply.bound, "10.0.0.1:8080".parse().unwrap());

        let reply = ConnectReply::decode(&[0x00, 0x5B, 0, 0, 0, 0, 0, 0]);
        assert!(!reply.is_granted());
        assert_eq!(reply.code, ReplyCode::Rejected);
    }

    #[test]
    fn test_reply_code_preserved() {
        for code in 0..=255u8 {
            let reply = ConnectReply::decode(&[0, code, 0, 0, 0, 0, 0, 0]);
            assert_eq!(u8::from(reply.code), code);
            assert_eq!(reply.is_granted(), code == 90);
        }
    }
}
