//! Receiver-side per-channel telemetry
//!
//! Counts what arrived on each logical channel and derives throughput,
//! average RTT, RFC 3550 jitter and, once the sender's session summary is
//! in, the packet delivery ratio.

use crate::delivery::{Channel, Delivery, DeliveryHandler, HandlerError};
use crate::jitter::JitterEstimator;
use crate::sequence::SeqNumber;
use crate::summary::SessionSummary;
use std::collections::HashSet;
use std::fmt;
use tracing::info;

/// Running state for one logical channel
#[derive(Debug, Clone, Default)]
pub struct ChannelStats {
    received: u64,
    total_bytes: u64,
    first_arrival: Option<f64>,
    last_arrival: Option<f64>,
    rtts: Vec<f64>,
    jitter: JitterEstimator,
    seen: HashSet<SeqNumber>,
    duplicates: u64,
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one packet and return the updated jitter estimate
    pub fn record(
        &mut self,
        seq: SeqNumber,
        sender_ts: f64,
        payload_len: usize,
        arrival_ts: f64,
        rtt: f64,
    ) -> f64 {
        self.received += 1;
        self.total_bytes += payload_len as u64;
        self.first_arrival.get_or_insert(arrival_ts);
        self.last_arrival = Some(arrival_ts);
        self.rtts.push(rtt);
        if !self.seen.insert(seq) {
            self.duplicates += 1;
        }
        self.jitter.update(sender_ts, arrival_ts)
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Packets whose sequence number had been recorded before
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn rtt_samples(&self) -> &[f64] {
        &self.rtts
    }

    pub fn jitter(&self) -> f64 {
        self.jitter.jitter()
    }

    /// Time between first and last arrival; zero with fewer than two samples
    pub fn duration(&self) -> f64 {
        match (self.first_arrival, self.last_arrival) {
            (Some(first), Some(last)) if last > first => last - first,
            _ => 0.0,
        }
    }

    /// Payload bytes per second over the active duration
    pub fn throughput(&self) -> f64 {
        let duration = self.duration();
        if duration > 0.0 {
            self.total_bytes as f64 / duration
        } else {
            0.0
        }
    }

    pub fn avg_rtt(&self) -> f64 {
        if self.rtts.is_empty() {
            0.0
        } else {
            self.rtts.iter().sum::<f64>() / self.rtts.len() as f64
        }
    }

    fn report(&self, channel: Channel, reported_sent: u64) -> ChannelReport {
        ChannelReport {
            channel,
            received: self.received,
            bytes: self.total_bytes,
            duplicates: self.duplicates,
            duration_s: self.duration(),
            throughput_bps: self.throughput(),
            avg_rtt_s: self.avg_rtt(),
            jitter_s: self.jitter(),
            delivery_ratio: delivery_ratio(self.received, reported_sent),
        }
    }
}

/// Received count as a percentage of the sender-reported count
///
/// `None` when the sender reported nothing sent on that channel.
pub fn delivery_ratio(received: u64, reported_sent: u64) -> Option<f64> {
    if reported_sent == 0 {
        None
    } else {
        Some(received as f64 / reported_sent as f64 * 100.0)
    }
}

/// One line of the receive log
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveRecord {
    pub seq: SeqNumber,
    pub channel: Channel,
    pub sender_ts: f64,
    pub arrival_ts: f64,
    pub payload_len: usize,
    pub rtt: f64,
    pub jitter: f64,
}

/// Final figures for one channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReport {
    pub channel: Channel,
    pub received: u64,
    pub bytes: u64,
    pub duplicates: u64,
    pub duration_s: f64,
    /// Payload bytes per second
    pub throughput_bps: f64,
    pub avg_rtt_s: f64,
    pub jitter_s: f64,
    /// Percentage, `None` if the sender reported zero sent
    pub delivery_ratio: Option<f64>,
}

/// Cross-channel report reconciled against the sender's summary
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub sent_reliable: u64,
    pub sent_unreliable: u64,
    pub reliable: ChannelReport,
    pub unreliable: ChannelReport,
}

impl Report {
    pub fn channel(&self, channel: Channel) -> &ChannelReport {
        match channel {
            Channel::Reliable => &self.reliable,
            Channel::Unreliable => &self.unreliable,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== FINAL REPORT ===")?;
        writeln!(
            f,
            "Sender reported sent_reliable={} sent_unreliable={}",
            self.sent_reliable, self.sent_unreliable
        )?;
        for report in [&self.reliable, &self.unreliable] {
            writeln!(f)?;
            writeln!(f, "Channel: {}", report.channel.name().to_uppercase())?;
            writeln!(f, "  Received: {}", report.received)?;
            writeln!(f, "  Duplicates: {}", report.duplicates)?;
            writeln!(f, "  Bytes: {}", report.bytes)?;
            writeln!(f, "  Duration: {:.3} s", report.duration_s)?;
            writeln!(f, "  Throughput: {:.2} B/s", report.throughput_bps)?;
            writeln!(f, "  Avg RTT: {:.3} ms", report.avg_rtt_s * 1000.0)?;
            writeln!(f, "  Jitter (RFC3550 est): {:.3} ms", report.jitter_s * 1000.0)?;
            match report.delivery_ratio {
                Some(pdr) => writeln!(f, "  Packet Delivery Ratio: {:.2} %", pdr)?,
                None => writeln!(f, "  Packet Delivery Ratio: N/A (sender did not report)")?,
            }
        }
        write!(f, "====================")
    }
}

/// Telemetry for both logical channels of one session
#[derive(Debug, Default)]
pub struct ChannelTelemetry {
    reliable: ChannelStats,
    unreliable: ChannelStats,
    records: Vec<ReceiveRecord>,
    summary: Option<SessionSummary>,
    last_report: Option<Report>,
}

impl ChannelTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one delivered packet and return the channel's jitter
    pub fn record(
        &mut self,
        seq: SeqNumber,
        channel: Channel,
        sender_ts: f64,
        payload_len: usize,
        arrival_ts: f64,
        rtt: f64,
    ) -> f64 {
        let jitter = self
            .channel_mut(channel)
            .record(seq, sender_ts, payload_len, arrival_ts, rtt);
        self.records.push(ReceiveRecord {
            seq,
            channel,
            sender_ts,
            arrival_ts,
            payload_len,
            rtt,
            jitter,
        });
        jitter
    }

    /// Build the final report against the sender's counts
    pub fn finalize(&self, summary: &SessionSummary) -> Report {
        Report {
            sent_reliable: summary.sent_reliable,
            sent_unreliable: summary.sent_unreliable,
            reliable: self.reliable.report(Channel::Reliable, summary.sent_reliable),
            unreliable: self
                .unreliable
                .report(Channel::Unreliable, summary.sent_unreliable),
        }
    }

    pub fn channel(&self, channel: Channel) -> &ChannelStats {
        match channel {
            Channel::Reliable => &self.reliable,
            Channel::Unreliable => &self.unreliable,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut ChannelStats {
        match channel {
            Channel::Reliable => &mut self.reliable,
            Channel::Unreliable => &mut self.unreliable,
        }
    }

    /// Packets recorded on both channels
    pub fn total_received(&self) -> u64 {
        self.reliable.received() + self.unreliable.received()
    }

    /// Every recorded packet in arrival order
    pub fn records(&self) -> &[ReceiveRecord] {
        &self.records
    }

    /// The sender's summary, once it has arrived
    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    /// Report built when the sender's summary arrived
    pub fn last_report(&self) -> Option<&Report> {
        self.last_report.as_ref()
    }

    /// Hand the pending report out once
    pub fn take_report(&mut self) -> Option<Report> {
        self.last_report.take()
    }
}

impl DeliveryHandler for ChannelTelemetry {
    fn on_delivery(&mut self, delivery: Delivery) -> Result<(), HandlerError> {
        let channel = delivery.channel();
        let jitter = self.record(
            delivery.seq,
            channel,
            delivery.sender_ts,
            delivery.payload.len(),
            delivery.delivered_at,
            delivery.rtt,
        );

        info!(
            "seq={} channel={} sender_ts={:.6} arrive_ts={:.6} rtt={:.2}ms len={} jitter={:.3}ms",
            delivery.seq,
            channel,
            delivery.sender_ts,
            delivery.delivered_at,
            delivery.rtt * 1000.0,
            delivery.payload.len(),
            jitter * 1000.0
        );
        Ok(())
    }

    fn on_session_summary(&mut self, summary: SessionSummary, _now: f64) -> Result<(), HandlerError> {
        info!(
            "Received session summary: sent_reliable={} sent_unreliable={}",
            summary.sent_reliable, summary.sent_unreliable
        );
        self.last_report = Some(self.finalize(&summary));
        self.summary = Some(summary);
        Ok(())
    }

    fn on_session_reset(&mut self) {
        info!(
            "Discarding telemetry of previous session ({} packets)",
            self.total_received()
        );
        *self = Self::default();
    }
}
