use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use proto_scan_rs::config::{default_workers, timeout_from_secs, ScanConfig, TransportSelection};
use proto_scan_rs::logging;
use proto_scan_rs::scanner::Scanner;

/// proto-scan-rs: TCP and UDP port scanner that names the protocol behind each open port.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "proto-scan-rs",
    version,
    about = "TCP and UDP port scanner that names the protocol behind each open port.",
    long_about = "Probes every port in a range and prints `<TCP|UDP> <port> [PROTOCOL]` for each \
                  port that answers. Recognised protocols: HTTP, SMTP, POP3, IMAP, DNS, NTP. \
                  Ports that answer with something unrecognised are printed without a label."
)]
struct Cli {
    /// Host name or IP address to scan.
    host: String,

    /// Scan TCP ports. This is the default when neither -t nor -u is given.
    #[arg(short = 't', long = "tcp")]
    tcp: bool,

    /// Scan UDP ports. Silent UDP ports are reported without a label.
    #[arg(short = 'u', long = "udp")]
    udp: bool,

    /// Inclusive port range to scan.
    #[arg(
        short = 'p',
        long = "ports",
        num_args = 2,
        action = clap::ArgAction::Set,
        value_names = ["START", "END"],
        default_values_t = [1u32, 65535]
    )]
    ports: Vec<u32>,

    /// Per-operation socket timeout in seconds (fractions allowed).
    #[arg(long, value_name = "SECONDS", default_value_t = 0.5)]
    timeout: f64,

    /// Number of concurrent workers. Defaults to one less than the CPU count.
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Increase log verbosity on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = ScanConfig {
        host: cli.host.clone(),
        start_port: cli.ports[0],
        end_port: cli.ports[1],
        transports: TransportSelection::new(cli.tcp, cli.udp),
        timeout: timeout_from_secs(cli.timeout)?,
        workers: cli.workers.unwrap_or_else(default_workers),
    };
    info!(?config, "configuration");
    let scanner = Scanner::new(config).context("invalid scan configuration")?;

    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping scan");
            cancel_ctrlc.cancel();
        }
    });

    let mut stdout = io::stdout();
    let summary = scanner.run_with_cancel(&mut stdout, cancel).await?;
    info!(
        done = summary.tasks_done,
        total = summary.tasks_total,
        reported = summary.reported,
        cancelled = summary.cancelled,
        "done"
    );
    Ok(())
}
