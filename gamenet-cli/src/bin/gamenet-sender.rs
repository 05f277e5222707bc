//! GameNet Sender - sample game traffic generator
//!
//! Sends a mix of reliable and unreliable payloads to a receiver, waits for
//! retransmissions to settle and closes the session with a summary of what
//! was sent.

use clap::Parser;
use gamenet::protocol::Discard;
use gamenet_cli::{display_engine_stats, init_tracing, Config, PayloadGenerator, SenderConfig};
use gamenet_io::Timer;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "gamenet-sender")]
#[command(about = "GameNet sample traffic sender", long_about = None)]
struct Args {
    /// TOML configuration file ([sender] table)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Receiver host
    #[arg(long)]
    host: Option<String>,

    /// Receiver port
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of packets to send
    #[arg(short = 'n', long)]
    count: Option<u32>,

    /// Packets per second (0 = as fast as possible)
    #[arg(short, long)]
    rate: Option<f64>,

    /// RNG seed for channel and payload selection
    #[arg(long)]
    seed: Option<u64>,

    /// Share of packets sent reliably (0.0 to 1.0)
    #[arg(long)]
    reliable_ratio: Option<f64>,

    /// Seconds to wait for retransmissions before sending the summary
    #[arg(long)]
    settle: Option<f64>,

    /// Seconds to keep running after the summary
    #[arg(long)]
    linger: Option<f64>,

    /// Statistics interval in seconds (0 disables)
    #[arg(long)]
    stats: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn sender_config(&self) -> anyhow::Result<SenderConfig> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?.sender.unwrap_or_default(),
            None => SenderConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(count) = self.count {
            config.count = count;
        }
        if let Some(rate) = self.rate {
            config.rate = rate;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(ratio) = self.reliable_ratio {
            config.reliable_ratio = ratio;
        }
        if let Some(settle) = self.settle {
            config.settle_secs = settle;
        }
        if let Some(linger) = self.linger {
            config.linger_secs = linger;
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

    let config = args.sender_config()?;
    let peer = config.peer_addr()?;

    tracing::info!("GameNet Sender starting...");
    tracing::info!(
        "Sending {} packets to {} at {} pkt/s (reliable ratio {})",
        config.count,
        peer,
        config.rate,
        config.reliable_ratio
    );

    let mut endpoint = gamenet::connect(peer, config.engine.engine_config())?;
    let mut generator = PayloadGenerator::new(config.seed, config.reliable_ratio);
    let interval = config.send_interval();
    let mut stats_timer = (config.stats_interval_secs > 0)
        .then(|| Timer::new(config.stats_interval(), endpoint.now()));
    let started = Instant::now();

    for i in 1..=config.count {
        let sample = generator.sample(i, endpoint.now())?;
        let len = sample.payload.len();
        let seq = endpoint.send(sample.payload, sample.reliable)?;
        tracing::info!(
            "Sent seq={} reliable={} len={} type={}",
            seq,
            sample.reliable,
            len,
            sample.kind
        );

        endpoint.run_for(interval, &mut Discard)?;

        if let Some(timer) = stats_timer.as_mut() {
            if timer.try_fire(endpoint.now()) {
                let stats = endpoint.engine().stats();
                tracing::info!(
                    "Progress: {}/{} sent, {} acked, {} retransmissions, {} in flight",
                    i,
                    config.count,
                    stats.retransmit.acknowledged,
                    stats.retransmit.retransmissions,
                    endpoint.engine().retransmission().outstanding_len()
                );
            }
        }
    }

    tracing::info!(
        "Finished sending {} packets in {:.2}s",
        config.count,
        started.elapsed().as_secs_f64()
    );
    display_engine_stats(&endpoint.engine().stats());

    let settled = endpoint.settle(config.settle_time(), &mut Discard)?;
    if !settled {
        tracing::warn!(
            "{} reliable packets still unacknowledged after {:.1}s",
            endpoint.engine().retransmission().outstanding_len(),
            config.settle_secs
        );
    }

    let seq = endpoint.send_summary()?;
    tracing::info!("Sent session summary as seq={}", seq);

    endpoint.run_for(config.linger_time(), &mut Discard)?;

    display_engine_stats(&endpoint.engine().stats());
    tracing::info!("Sender finished");
    Ok(())
}
