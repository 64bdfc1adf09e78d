use std::{process, sync::Arc};

use futures::future;
use toralize::Config;
use tracing::{error, info, metadata::LevelFilter};
use tracing_subscriber::{
    filter, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, Layer,
};

mod config;
mod run;
use run::*;

fn main() -> anyhow::Result<()> {
    let mut app = clap::Command::new("toralize")
        .version(toralize::VERSION)
        .about("Connect to host:port through a SOCKS4 proxy and relay stdio.");
    app = config::add_command_line_args(app);

    let matches = app.get_matches();

    let config = config::parse_config(&matches)?;
    let (host, port) = config::parse_destination(&matches)?;
    init_tracing_subscriber(&config);
    info!("start with {:#?}", config);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let client = run_client(Arc::new(config), host, port);
        let sig = tokio::signal::ctrl_c();

        tokio::pin!(client, sig);

        match future::select(client, sig).await {
            future::Either::Left((result, ..)) => match result {
                Ok(()) => {}
                Err(e) => {
                    error!("exit with error: {:#}", e);
                    process::exit(-1)
                }
            },
            future::Either::Right(_) => {
                info!("receive exit signal")
            }
        }
    });

    // a pending stdin read holds a blocking thread until EOF, don't wait for it
    rt.shutdown_background();
    Ok(())
}

fn init_tracing_subscriber(c: &Config) {
    let formateter = tracing_subscriber::fmt::format()
        .with_level(true)
        .with_target(true);

    let file_level_filter = LevelFilter::from(c.get_log_level());
    let mut console_level_filter = file_level_filter;
    if !c.console_log {
        console_level_filter = LevelFilter::OFF;
    }

    // stdout carries relayed data, logs go to stderr
    let layer = tracing_subscriber::registry().with(
        filter::Targets::new()
            .with_target("toralize", console_level_filter)
            .and_then(
                tracing_subscriber::fmt::layer()
                    .event_format(formateter.clone())
                    .with_writer(std::io::stderr),
            ),
    );

    if let Some(dir) = &c.file_log_dir {
        let file_appender = tracing_appender::rolling::daily(dir, "toralize.log");
        layer
            .with(
                filter::Targets::new()
                    .with_target("toralize", file_level_filter)
                    .and_then(
                        tracing_subscriber::fmt::layer()
                            .event_format(formateter)
                            .with_writer(file_appender)
                            .with_ansi(false),
                    ),
            )
            .init();
    } else {
        layer.init();
    }
}
