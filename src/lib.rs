//! # Examples
//! redirect a socket the application is about to connect:
//! ```no_run
//! use std::{net::TcpStream, os::unix::io::AsRawFd};
//! use socket2::{Domain, Socket, Type};
//! use toralize::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load_from_env()?;
//!     let redirector = Redirector::new(&config)?;
//!
//!     let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
//!     redirector.redirect(socket.as_raw_fd(), &"93.184.216.34:80".parse()?)?;
//!
//!     // every byte now flows through the proxy
//!     let stream: TcpStream = socket.into();
//!     Ok(())
//! }
//! ```
//!
//! with tokio:
//! ```no_run
//! use toralize::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let config = Config::default();
//!     let stream = client::connect(
//!         config.get_proxy_endpoint(),
//!         &"93.184.216.34:80".parse().unwrap(),
//!         config.get_identity(),
//!         config.get_timeout(),
//!     )
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod consts;
pub use consts::Error;
mod config;
pub use config::Config;
pub mod proto;
pub use proto::{ConnectReply, ConnectRequest, Identity, ReplyCode};
pub mod connector;
pub use connector::{DirectConnect, RawConnect, RealConnect};
pub mod handshake;
pub mod substitute;
pub use substitute::{Dup2, Substitute};
mod redirect;
pub use redirect::Redirector;
pub mod client;
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
