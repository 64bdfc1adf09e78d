use anyhow::Context;
use clap::{Arg, ArgMatches, Command};

use toralize::Config;

pub fn add_command_line_args(mut app: Command) -> Command {
    app = app
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .takes_value(true)
                .help("config path, falls back to $TORALIZE_CONFIG then defaults"),
        )
        .arg(
            Arg::new("proxy")
                .short('x')
                .long("proxy")
                .takes_value(true)
                .help("override proxy_addr in config file"),
        )
        .arg(
            Arg::new("proxy-port")
                .short('p')
                .long("proxy-port")
                .takes_value(true)
                .help("override proxy_port in config file"),
        )
        .arg(
            Arg::new("identity")
                .short('u')
                .long("identity")
                .takes_value(true)
                .help("override identity in config file"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .takes_value(true)
                .help("override log_level in config file"),
        )
        .arg(
            Arg::new("host")
                .required(true)
                .index(1)
                .help("destination host, resolved locally to ipv4"),
        )
        .arg(
            Arg::new("port")
                .required(true)
                .index(2)
                .help("destination port"),
        );

    app
}

pub fn parse_config(matches: &ArgMatches) -> anyhow::Result<Config> {
    let mut config = match matches.value_of("config") {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load_from_env()?,
    };

    if let Some(proxy) = matches.value_of("proxy") {
        config.proxy_addr = proxy
            .parse()
            .with_context(|| format!("parse proxy address {}", proxy))?;
    }

    if let Some(port) = matches.value_of("proxy-port") {
        config.proxy_port = port.parse()?;
    }

    if let Some(identity) = matches.value_of("identity") {
        config.identity = identity.into();
    }

    if let Some(log_level) = matches.value_of("log-level") {
        config.log_level = log_level.into();
    }

    config.validate()?;
    Ok(config)
}

pub fn parse_destination(matches: &ArgMatches) -> anyhow::Result<(String, u16)> {
    let host = matches.value_of("host").context("missing host")?;
    let port = matches.value_of("port").context("missing port")?;
    let port = port
        .parse()
        .with_context(|| format!("parse destination port {}", port))?;
    Ok((host.into(), port))
}
