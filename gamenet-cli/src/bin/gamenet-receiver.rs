//! GameNet Receiver - per-channel telemetry collector
//!
//! Logs every delivered packet and prints a final report whenever the
//! sender's session summary arrives. Serves one sender at a time: a
//! datagram from a new address discards the previous session and starts
//! counting afresh.

use clap::Parser;
use gamenet::ChannelTelemetry;
use gamenet_cli::{
    display_compact_stats, display_engine_stats, display_report_table, init_tracing, Config,
    ReceiverConfig,
};
use gamenet_io::Timer;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Longest stretch between two progress checks
const STATS_POLL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "gamenet-receiver")]
#[command(about = "GameNet telemetry receiver", long_about = None)]
struct Args {
    /// TOML configuration file ([receiver] table)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Exit after the first final report
    #[arg(long)]
    exit_after_report: bool,

    /// Statistics interval in seconds (0 disables)
    #[arg(long)]
    stats: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn receiver_config(&self) -> anyhow::Result<ReceiverConfig> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?.receiver.unwrap_or_default(),
            None => ReceiverConfig::default(),
        };

        if let Some(bind) = &self.bind {
            config.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.exit_after_report {
            config.exit_after_report = true;
        }
        if let Some(stats) = self.stats {
            config.stats_interval_secs = stats;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = args.receiver_config()?;
    let addr = config.listen_addr()?;

    tracing::info!("GameNet Receiver starting...");
    let mut endpoint = gamenet::listen(addr, config.engine.engine_config())?;
    tracing::info!("Listening on: {}", endpoint.engine().channel().local_addr()?);

    let mut telemetry = ChannelTelemetry::new();
    let mut stats_timer = (config.stats_interval_secs > 0)
        .then(|| Timer::new(config.stats_interval(), endpoint.now()));
    let started = Instant::now();

    loop {
        endpoint.run_until(&mut telemetry, Some(STATS_POLL), |_, t| t.last_report().is_some())?;

        if let Some(report) = telemetry.take_report() {
            println!();
            println!("{}", report);
            display_report_table(&report);
            display_engine_stats(&endpoint.engine().stats());

            if config.exit_after_report {
                break;
            }
        }

        if let Some(timer) = stats_timer.as_mut() {
            if timer.try_fire(endpoint.now()) {
                display_compact_stats(&telemetry, started.elapsed());
            }
        }
    }

    tracing::info!(
        "Receiver finished after {} packets in the last session",
        telemetry.total_received()
    );
    Ok(())
}
