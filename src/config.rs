use std::{
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{consts::*, proto::Identity};

/// Process wide settings, read once and handed to [`crate::Redirector::new`].
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_proxy_addr")]
    pub proxy_addr: Ipv4Addr,
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,
    #[serde(default = "default_identity")]
    pub identity: String,
    /// milliseconds, 0 blocks forever
    #[serde(default)]
    pub timeout: u32,
    #[serde(default = "default_level")]
    pub log_level: String,
    #[serde(default = "default_console_log")]
    pub console_log: bool,
    pub file_log_dir: Option<String>,
}

fn default_proxy_addr() -> Ipv4Addr {
    Ipv4Addr::LOCALHOST
}

fn default_proxy_port() -> u16 {
    DEFAULT_PROXY_PORT
}

fn default_identity() -> String {
    DEFAULT_IDENTITY.into()
}

fn default_level() -> String {
    "info".into()
}

fn default_console_log() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            proxy_addr: default_proxy_addr(),
            proxy_port: default_proxy_port(),
            identity: default_identity(),
            timeout: 0,
            log_level: default_level(),
            console_log: default_console_log(),
            file_log_dir: None,
        }
    }
}

impl Config {
    pub fn load_from_file(file_name: &str) -> anyhow::Result<Config> {
        let s = std::fs::read_to_string(file_name)
            .with_context(|| format!("read config file {}", file_name))?;
        let c: Config =
            toml::from_str(&s).with_context(|| format!("parse config file {}", file_name))?;
        c.validate()?;
        Ok(c)
    }

    /// Load the file named by `TORALIZE_CONFIG`, or defaults when it is unset.
    pub fn load_from_env() -> anyhow::Result<Config> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Config::load_from_file(&path),
            Err(_) => Ok(Config::default()),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !self.identity.is_ascii() {
            return Err(Error::InvalidConfig(format!(
                "identity {:?} is not ascii",
                self.identity
            )));
        }
        if self.identity.contains('\0') {
            return Err(Error::InvalidConfig("identity contains NUL".into()));
        }
        Ok(())
    }

    pub fn get_log_level(&self) -> tracing::Level {
        match self.log_level.as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "info" => tracing::Level::INFO,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }

    pub fn get_proxy_endpoint(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.proxy_addr, self.proxy_port)
    }

    pub fn get_identity(&self) -> Identity {
        Identity::new(&self.identity)
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        match self.timeout {
            0 => None,
            ms => Some(Duration::from_millis(ms as u64)),
        }
    }
}
