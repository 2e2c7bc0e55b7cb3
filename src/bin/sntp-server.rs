use anyhow::{bail, Context, Result};
use clap::Parser;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;
use tracing::info;

use proto_scan_rs::logging;
use proto_scan_rs::sntp::SntpServer;

/// sntp-server: SNTP server that reports a deliberately shifted time.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sntp-server",
    version,
    about = "SNTP server that reports the local clock shifted by a fixed number of seconds."
)]
struct Cli {
    /// Seconds to add to the real time in every reply (may be negative).
    #[arg(short = 'd', long = "offset", default_value_t = 0, allow_hyphen_values = true)]
    offset: i64,

    /// UDP port to listen on.
    #[arg(short = 'p', long = "port", default_value_t = 123)]
    port: u32,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Increase log verbosity on stderr.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Requests are worth seeing by default.
    logging::init(cli.verbose.max(1));

    if cli.port == 0 || cli.port > 65535 {
        bail!("invalid port: {} (expected 1..=65535)", cli.port);
    }
    let server = SntpServer::bind((cli.bind.as_str(), cli.port as u16), cli.offset)
        .await
        .with_context(|| format!("failed to bind {}:{}", cli.bind, cli.port))?;

    let shifted = OffsetDateTime::now_utc()
        .checked_add(Duration::seconds(cli.offset))
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default();
    info!(
        addr = %server.local_addr()?,
        offset_secs = cli.offset,
        reported_time = %shifted,
        "sntp server listening"
    );

    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    server.serve(cancel).await.context("sntp server failed")
}
