//! SOCKS4 connect for tokio users who own their sockets.
use std::{
    io,
    net::{SocketAddr, SocketAddrV4},
    time::Duration,
};

use tokio::{net::TcpStream, time};
use tracing::debug;

use crate::{handshake, proto::Identity, Error};

/// Dial `endpoint`, ask it to connect to `dst` and return the relaying stream.
///
/// `timeout` bounds the proxy dial and the handshake separately.
pub async fn connect(
    endpoint: SocketAddrV4,
    dst: &SocketAddr,
    identity: Identity,
    timeout: Option<Duration>,
) -> Result<TcpStream, Error> {
    if !dst.is_ipv4() {
        return Err(Error::UnsupportedAddress(*dst));
    }

    let dial = TcpStream::connect(endpoint);
    let mut stream = match timeout {
        Some(t) => match time::timeout(t, dial).await {
            Ok(r) => r,
            Err(_) => Err(io::ErrorKind::TimedOut.into()),
        },
        None => dial.await,
    }
    .map_err(Error::ProxyUnreachable)?;
    debug!("connected to proxy {}", endpoint);

    let exchange = handshake::perform_handshake_async(&mut stream, dst, identity);
    match timeout {
        Some(t) => match time::timeout(t, exchange).await {
            Ok(r) => r?,
            Err(_) => return Err(Error::Read(io::ErrorKind::TimedOut.into())),
        },
        None => exchange.await?,
    };

    Ok(stream)
}
