//! Statistics display and formatting

use gamenet_protocol::{Channel, ChannelReport, ChannelTelemetry, EngineStats, Report};
use std::io::Write;
use std::time::Duration;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format bandwidth in human-readable form
pub fn format_bandwidth(bps: u64) -> String {
    const KBPS: u64 = 1000;
    const MBPS: u64 = KBPS * 1000;
    const GBPS: u64 = MBPS * 1000;

    if bps >= GBPS {
        format!("{:.2} Gbps", bps as f64 / GBPS as f64)
    } else if bps >= MBPS {
        format!("{:.2} Mbps", bps as f64 / MBPS as f64)
    } else if bps >= KBPS {
        format!("{:.2} Kbps", bps as f64 / KBPS as f64)
    } else {
        format!("{} bps", bps)
    }
}

/// Format a time in seconds as RTT or jitter
pub fn format_rtt(secs: f64) -> String {
    if secs >= 1.0 {
        format!("{:.2}s", secs)
    } else if secs >= 0.001 {
        format!("{:.2}ms", secs * 1_000.0)
    } else {
        format!("{:.0}µs", secs * 1_000_000.0)
    }
}

/// Format a delivery ratio percentage
pub fn format_ratio(ratio: Option<f64>) -> String {
    match ratio {
        Some(pdr) => format!("{:.2} %", pdr),
        None => "N/A".to_string(),
    }
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Display engine counters
pub fn display_engine_stats(stats: &EngineStats) {
    let rt = &stats.retransmit;
    let ro = &stats.reorder;

    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ ENGINE STATISTICS                                           │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!(
        "│ Sent:       {} reliable / {} unreliable / {} summaries",
        stats.sent_reliable, stats.sent_unreliable, stats.summaries_sent
    );
    println!(
        "│ Frames:     {} transmitted / {} retransmitted ({:.1}%)",
        rt.frames_sent,
        rt.retransmissions,
        rt.retransmit_rate()
    );
    println!(
        "│ Acked:      {} acknowledged / {} abandoned ({:.1}% success)",
        rt.acknowledged,
        rt.abandoned,
        rt.success_rate()
    );
    println!(
        "│ ACKs:       {} received / {} sent / {} unknown",
        stats.acks_received, stats.acks_sent, rt.unknown_acks
    );
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ RECEIVE PATH                                                │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!(
        "│ Frames:     {} received / {} malformed / {} bad summaries",
        stats.frames_received, stats.malformed, stats.invalid_summaries
    );
    println!(
        "│ Reliable:   {} delivered / {} skipped / {} stale / {} duplicate",
        ro.delivered, ro.skipped, ro.stale, ro.duplicates
    );
    println!(
        "│ Failures:   {} send / {} ack / {} handler",
        rt.send_failures + stats.unreliable_send_failures,
        stats.ack_send_failures,
        stats.handler_failures + ro.handler_failures
    );
    println!("└─────────────────────────────────────────────────────────────┘");
}

/// Display the final report as a per-channel table
pub fn display_report_table(report: &Report) {
    println!("\n┌─────────────────────────────────────────────────────────────────────┐");
    println!(
        "│ FINAL REPORT (sender: {} reliable / {} unreliable)",
        report.sent_reliable, report.sent_unreliable
    );
    println!("├────────────┬──────────┬──────────┬──────────┬──────────┬────────────┤");
    println!("│ Channel    │ Received │ Bytes    │ Avg RTT  │ Jitter   │ PDR        │");
    println!("├────────────┼──────────┼──────────┼──────────┼──────────┼────────────┤");

    for channel in [Channel::Reliable, Channel::Unreliable] {
        println!("{}", format_report_row(report.channel(channel)));
    }

    println!("└────────────┴──────────┴──────────┴──────────┴──────────┴────────────┘");
}

/// One table row of the final report
pub fn format_report_row(report: &ChannelReport) -> String {
    format!(
        "│ {:10} │ {:8} │ {:8} │ {:8} │ {:8} │ {:10} │",
        report.channel.name(),
        report.received,
        format_bytes(report.bytes),
        format_rtt(report.avg_rtt_s),
        format_rtt(report.jitter_s),
        format_ratio(report.delivery_ratio)
    )
}

/// Display compact receive stats on one line (for continuous updates)
pub fn display_compact_stats(telemetry: &ChannelTelemetry, elapsed: Duration) {
    let reliable = telemetry.channel(Channel::Reliable);
    let unreliable = telemetry.channel(Channel::Unreliable);
    let bytes = reliable.total_bytes() + unreliable.total_bytes();
    let throughput_bps = if elapsed.as_secs() > 0 {
        (bytes * 8) / elapsed.as_secs()
    } else {
        0
    };

    print!(
        "\r[{:8}] Reliable: {} | Unreliable: {} | Received: {} | Rate: {}         ",
        format_duration(elapsed),
        reliable.received(),
        unreliable.received(),
        format_bytes(bytes),
        format_bandwidth(throughput_bps)
    );

    // A closed stdout only loses the progress line
    let _ = std::io::stdout().flush();
}
