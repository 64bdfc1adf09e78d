use std::{
    io::{self, ErrorKind, Read, Write},
    net::SocketAddr,
};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::{
    consts::*,
    proto::{ConnectReply, ConnectRequest, Identity},
};

/// Send a CONNECT request for `dst` over `stream` and wait for the proxy's verdict.
///
/// The stream is left open whatever the outcome, closing it is up to the caller.
pub fn perform_handshake<S>(
    stream: &mut S,
    dst: &SocketAddr,
    identity: Identity,
) -> Result<ConnectReply, Error>
where
    S: Read + Write + ?Sized,
{
    let req = ConnectRequest::new(dst, identity)?;
    let buf = req.to_bytes();
    trace!("send connect request {:?}: {:?}", req, &buf[..]);

    stream.write_all(&buf).map_err(Error::Write)?;
    stream.flush().map_err(Error::Write)?;

    let mut reply = [0u8; REPLY_LEN];
    let mut filled = 0;
    while filled < REPLY_LEN {
        match stream.read(&mut reply[filled..]) {
            Ok(0) => return Err(short_reply(filled)),
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Read(e)),
        }
    }

    check_reply(dst, ConnectReply::decode(&reply))
}

/// Same exchange as [`perform_handshake`] on a tokio stream.
pub async fn perform_handshake_async<S>(
    stream: &mut S,
    dst: &SocketAddr,
    identity: Identity,
) -> Result<ConnectReply, Error>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let req = ConnectRequest::new(dst, identity)?;
    let buf = req.to_bytes();
    trace!("send connect request {:?}: {:?}", req, &buf[..]);

    stream.write_all(&buf).await.map_err(Error::Write)?;
    stream.flush().await.map_err(Error::Write)?;

    let mut reply = [0u8; REPLY_LEN];
    let mut filled = 0;
    while filled < REPLY_LEN {
        match stream.read(&mut reply[filled..]).await {
            Ok(0) => return Err(short_reply(filled)),
            Ok(n) => filled += n,
            Err(e) => return Err(Error::Read(e)),
        }
    }

    check_reply(dst, ConnectReply::decode(&reply))
}

fn short_reply(filled: usize) -> Error {
    Error::Read(io::Error::new(
        ErrorKind::UnexpectedEof,
        format!("proxy closed after {} of {} reply bytes", filled, REPLY_LEN),
    ))
}

fn check_reply(dst: &SocketAddr, reply: ConnectReply) -> Result<ConnectReply, Error> {
    if !reply.is_granted() {
        warn!("unable to traverse the proxy to {}: {:?}", dst, reply.code);
        return Err(Error::ProxyRejected(reply.code.into()));
    }
    debug!("proxy granted connection to {}", dst);
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Feeds the reply in fixed size pieces and accepts writes in pieces too.
    struct MockStream {
        reply: Cursor<Vec<u8>>,
        chunk: usize,
        written: Vec<u8>,
    }

    impl MockStream {
        fn new(reply: &[u8], chunk: usize) -> MockStream {
            MockStream {
                reply: Cursor::new(reply.to_vec()),
                chunk,
                written: vec![],
            }
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            Read::read(&mut self.reply, &mut buf[..n])
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Read for BrokenPipe {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            unreachable!("nothing is read after a failed write")
        }
    }

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(ErrorKind::BrokenPipe.into())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn dst() -> SocketAddr {
        "93.184.216.34:80".parse().unwrap()
    }

    #[test]
    fn test_granted_with_partial_io() {
        let mut s = MockStream::new(&[0, 90, 0, 0, 0, 0, 0, 0], 3);
        let reply = perform_handshake(&mut s, &dst(), Identity::new("toraliz")).unwrap();
        assert!(reply.is_granted());
        assert_eq!(s.written.len(), REQUEST_LEN);
        assert_eq!(&s.written[..8], &[4, 1, 0, 80, 93, 184, 216, 34]);
    }

    #[test]
    fn test_every_other_code_rejected() {
        for code in (0..=255u8).filter(|c| *c != SOCKS4_REPLY_GRANTED) {
            let mut s = MockStream::new(&[0, code, 0, 0, 0, 0, 0, 0], REPLY_LEN);
            match perform_handshake(&mut s, &dst(), Identity::default()) {
                Err(Error::ProxyRejected(c)) => assert_eq!(c, code),
                other => panic!("code {} gave {:?}", code, other),
            }
        }
    }

    #[test]
    fn test_empty_reply() {
        let mut s = MockStream::new(&[], REPLY_LEN);
        match perform_handshake(&mut s, &dst(), Identity::default()) {
            Err(Error::Read(e)) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_truncated_reply() {
        for len in 1..REPLY_LEN {
            // a granted status byte must not matter when the reply is short
            let reply = [0u8, 90, 0, 0, 0, 0, 0, 0];
            let mut s = MockStream::new(&reply[..len], 1);
            match perform_handshake(&mut s, &dst(), Identity::default()) {
                Err(Error::Read(e)) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
                other => panic!("len {} gave {:?}", len, other),
            }
        }
    }

    #[test]
    fn test_write_error() {
        match perform_handshake(&mut BrokenPipe, &dst(), Identity::default()) {
            Err(Error::Write(e)) => assert_eq!(e.kind(), ErrorKind::BrokenPipe),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_async_handshake() {
        let (mut client, mut proxy) = tokio::io::duplex(64);

        let server = tokio::spawn(async move {
            let mut req = [0u8; REQUEST_LEN];
            proxy.read_exact(&mut req).await.unwrap();
            proxy.write_all(&[0, 91, 0, 0, 0, 0, 0, 0]).await.unwrap();
            req
        });

        let res = perform_handshake_async(&mut client, &dst(), Identity::new("nobody")).await;
        assert!(matches!(res, Err(Error::ProxyRejected(91))));

        let req = server.await.unwrap();
        assert_eq!(&req[8..], b"nobody\0\0");
    }

    #[tokio::test]
    async fn test_async_short_reply() {
        let (mut client, mut proxy) = tokio::io::duplex(64);

        tokio::spawn(async move {
            let mut req = [0u8; REQUEST_LEN];
            proxy.read_exact(&mut req).await.unwrap();
            proxy.write_all(&[0, 90, 0]).await.unwrap();
        });

        let res = perform_handshake_async(&mut client, &dst(), Identity::default()).await;
        assert!(matches!(res, Err(Error::Read(_))));
    }
}
