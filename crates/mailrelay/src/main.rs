//! `mailrelay` - relays `send_mail` events to SMTP accounts.
//!
//! Reads JSON-lines events from stdin and hands them to the mail component.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod feed;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use mailrelay_core::config::ROOT_ENV;
use mailrelay_core::{ConfigLoader, MailComponent};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "mailrelay=info,mailrelay_core=info,mailrelay_smtp=info";

/// Pending events between the feed and the component.
const EVENT_BUFFER: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "mailrelay")]
#[command(about = "Relay send_mail events read from stdin to configured SMTP accounts")]
#[command(version)]
struct Cli {
    /// Directory holding `configs/` (defaults to the executable's directory)
    #[arg(short, long, env = ROOT_ENV)]
    root: Option<PathBuf>,

    /// Log filter directives, overriding `RUST_LOG`
    #[arg(long)]
    log_filter: Option<String>,
}

fn init_tracing(directives: Option<&str>) {
    let filter = directives
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter.as_deref());

    let loader = match cli.root {
        Some(root) => ConfigLoader::new(root),
        None => ConfigLoader::from_env().context("failed to determine configuration root")?,
    };
    info!(root = %loader.root().display(), "starting mailrelay");

    let mut component = MailComponent::new(loader.clone());
    component
        .started()
        .with_context(|| format!("failed to load configuration from {}", loader.root().display()))?;

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let feed = tokio::spawn(feed::forward_lines(BufReader::new(tokio::io::stdin()), tx));

    let interrupted = tokio::select! {
        () = component.run(rx) => false,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            true
        }
    };

    if interrupted {
        info!("interrupted, waiting for in-flight sends");
        feed.abort();
        component.shutdown().await;
    } else {
        let forwarded = feed.await.context("event feed task failed")??;
        info!(events = forwarded, "event feed closed");
    }

    Ok(())
}
