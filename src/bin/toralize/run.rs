use std::{
    net::{SocketAddr, TcpStream as StdTcpStream},
    os::unix::io::AsRawFd,
    sync::Arc,
};

use anyhow::{bail, Context};
use socket2::{Domain, Socket, Type};
use tokio::{
    io::{copy, AsyncRead, AsyncWrite, AsyncWriteExt},
    net::{lookup_host, TcpStream},
};
use tracing::{debug, info, warn};

use toralize::{Config, Redirector};

pub async fn run_client(cfg: Arc<Config>, host: String, port: u16) -> anyhow::Result<()> {
    let dst = resolve_ipv4(&host, port).await?;
    let redirector = Redirector::new(&cfg)?;

    // the socket an application would have connected directly
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None).context("create socket")?;
    let socket = tokio::task::spawn_blocking(move || {
        redirector
            .redirect(socket.as_raw_fd(), &dst)
            .map(|()| socket)
    })
    .await?
    .with_context(|| format!("connect {} via {}", dst, cfg.get_proxy_endpoint()))?;
    info!("connected to {} ({}) via {}", host, dst, cfg.get_proxy_endpoint());

    let stream: StdTcpStream = socket.into();
    stream.set_nonblocking(true)?;
    let stream = TcpStream::from_std(stream)?;

    relay_stdio(stream, dst).await
}

async fn resolve_ipv4(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let addrs = lookup_host((host, port))
        .await
        .with_context(|| format!("resolve {}", host))?;
    for addr in addrs {
        if addr.is_ipv4() {
            return Ok(addr);
        }
    }
    bail!("no ipv4 address for {}", host)
}

async fn relay_stdio(stream: TcpStream, dst: SocketAddr) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    relay(stream, tokio::io::stdin(), &mut stdout, dst).await
}

/// input -> remote until input ends, remote -> output until remote closes.
///
/// Returns as soon as the remote closes, even if input is still open.
async fn relay<I, O>(
    stream: TcpStream,
    mut input: I,
    output: &mut O,
    dst: SocketAddr,
) -> anyhow::Result<()>
where
    I: AsyncRead + Unpin + Send + 'static,
    O: AsyncWrite + Unpin,
{
    let (mut rr, mut rw) = stream.into_split();

    let upload = tokio::spawn(async move {
        let n = copy(&mut input, &mut rw).await;
        if let Err(e) = rw.shutdown().await {
            warn!("shutdown write half err {}", e);
        }
        n
    });

    let r2l = copy(&mut rr, output)
        .await
        .with_context(|| format!("relay {} -> output", dst))?;
    output.flush().await?;

    let l2r = if upload.is_finished() {
        upload.await?.unwrap_or(0)
    } else {
        upload.abort();
        0
    };
    debug!(
        "complete relay with {}, L2R {} bytes, R2L {} bytes",
        dst, l2r, r2l
    );
    Ok(())
}
