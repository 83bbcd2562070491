//! `imapd` - IMAP4rev1 server front end
//!
//! Accepts cleartext, STARTTLS and implicit-TLS clients on one port and
//! answers the commands of the not-authenticated state.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;
mod server;
mod session;

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{CONFIG_ENV, Config};
use server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imapd=info,imapd_wire=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os(CONFIG_ENV))
        .map(PathBuf::from);
    let config = Config::load(path.as_deref()).context("loading configuration")?;

    info!(listen = %config.listen, "starting imapd");
    let server = Server::new(config).context("loading TLS certificate")?;

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("server failed")?;

    Ok(())
}
