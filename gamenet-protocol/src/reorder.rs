//! Receiver-side reordering of reliable frames
//!
//! Reliable frames may arrive in any order. The buffer holds everything
//! above the delivery watermark and releases frames strictly in sequence
//! order. A missing frame blocks the stream for at most the lifetime
//! threshold: once the oldest buffered frame has waited that long, the gap
//! is skipped and delivery resumes past it.
//!
//! Reliable and unreliable frames share one sequence space. Unreliable
//! arrivals are reported through [`ReorderBuffer::pass_through`] so that
//! their numbers do not show up as gaps in the reliable stream.

use crate::config::EngineConfig;
use crate::delivery::HandlerError;
use crate::packet::PayloadKind;
use crate::retransmit::TIMER_SLACK;
use crate::sequence::SeqNumber;
use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// Inclusive range of skipped sequence numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipRange {
    pub start: SeqNumber,
    pub end: SeqNumber,
}

impl SkipRange {
    pub fn single(seq: SeqNumber) -> Self {
        SkipRange { start: seq, end: seq }
    }

    pub fn contains(&self, seq: SeqNumber) -> bool {
        seq >= self.start && seq <= self.end
    }

    pub fn len(&self) -> usize {
        (self.end.as_raw() - self.start.as_raw()) as usize + 1
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    /// Extend this range by `seq` if it directly follows it
    fn try_extend(&mut self, seq: SeqNumber) -> bool {
        if self.end.next() == Some(seq) {
            self.end = seq;
            true
        } else {
            false
        }
    }
}

/// Frame released in sequence order
#[derive(Debug, Clone, PartialEq)]
pub struct Released {
    pub seq: SeqNumber,
    pub kind: PayloadKind,
    pub sender_ts: f64,
    pub payload: Bytes,
    /// Arrival time minus sender timestamp
    pub rtt: f64,
}

/// Frame waiting for its predecessors
#[derive(Debug, Clone)]
struct PendingEntry {
    kind: PayloadKind,
    payload: Bytes,
    sender_ts: f64,
    arrival_ts: f64,
}

/// Result of inserting one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// At or below the watermark; already delivered or skipped
    Stale,
    /// Already waiting in the buffer
    Duplicate,
    /// Buffered, followed by a delivery attempt
    Buffered(DeliveryPass),
}

/// Summary of one delivery attempt
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPass {
    pub delivered: usize,
    pub skipped: usize,
}

/// Reorder buffer counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReorderStats {
    pub buffered: u64,
    pub delivered: u64,
    pub skipped: u64,
    pub stale: u64,
    pub duplicates: u64,
    pub handler_failures: u64,
    /// Sequence numbers resolved by unreliable arrivals
    pub passed_through: u64,
}

/// In-order delivery buffer for the reliable channel
#[derive(Debug)]
pub struct ReorderBuffer {
    pending: BTreeMap<SeqNumber, PendingEntry>,
    /// Unreliable sequence numbers above the watermark, with arrival time
    passed: BTreeMap<SeqNumber, f64>,
    /// Highest sequence number delivered or skipped
    last_delivered: SeqNumber,
    lifetime: f64,
    skipped: Vec<SkipRange>,
    stats: ReorderStats,
}

impl ReorderBuffer {
    pub fn new(config: &EngineConfig) -> Self {
        ReorderBuffer {
            pending: BTreeMap::new(),
            passed: BTreeMap::new(),
            last_delivered: SeqNumber::ZERO,
            lifetime: config.lifetime_secs(),
            skipped: Vec::new(),
            stats: ReorderStats::default(),
        }
    }

    /// Accept a reliable frame and release whatever became deliverable
    #[allow(clippy::too_many_arguments)]
    pub fn insert<F>(
        &mut self,
        seq: SeqNumber,
        kind: PayloadKind,
        sender_ts: f64,
        payload: Bytes,
        arrival_ts: f64,
        now: f64,
        sink: &mut F,
    ) -> InsertOutcome
    where
        F: FnMut(Released) -> Result<(), HandlerError>,
    {
        if seq <= self.last_delivered {
            self.stats.stale += 1;
            trace!("Discarding stale seq {} (delivered up to {})", seq, self.last_delivered);
            return InsertOutcome::Stale;
        }

        if self.pending.contains_key(&seq) || self.passed.contains_key(&seq) {
            self.stats.duplicates += 1;
            trace!("Discarding duplicate seq {}", seq);
            return InsertOutcome::Duplicate;
        }

        self.pending.insert(
            seq,
            PendingEntry {
                kind,
                payload,
                sender_ts,
                arrival_ts,
            },
        );
        self.stats.buffered += 1;

        InsertOutcome::Buffered(self.attempt_delivery(now, sink))
    }

    /// Mark `seq` as taken by an unreliable frame
    ///
    /// Nothing is delivered for it; the watermark simply moves past it once
    /// every earlier reliable frame is out.
    pub fn pass_through<F>(&mut self, seq: SeqNumber, arrival_ts: f64, now: f64, sink: &mut F) -> DeliveryPass
    where
        F: FnMut(Released) -> Result<(), HandlerError>,
    {
        if seq <= self.last_delivered || self.pending.contains_key(&seq) {
            return DeliveryPass::default();
        }
        self.passed.entry(seq).or_insert(arrival_ts);
        self.attempt_delivery(now, sink)
    }

    /// Release frames in order, skipping gaps that have waited too long
    pub fn attempt_delivery<F>(&mut self, now: f64, sink: &mut F) -> DeliveryPass
    where
        F: FnMut(Released) -> Result<(), HandlerError>,
    {
        let mut pass = DeliveryPass::default();

        while let Some(expected) = self.last_delivered.next() {
            if let Some(entry) = self.pending.remove(&expected) {
                let released = Released {
                    seq: expected,
                    kind: entry.kind,
                    sender_ts: entry.sender_ts,
                    payload: entry.payload,
                    rtt: entry.arrival_ts - entry.sender_ts,
                };

                if let Err(e) = sink(released) {
                    self.stats.handler_failures += 1;
                    warn!("Delivery handler failed for seq {}: {}", expected, e);
                }

                self.last_delivered = expected;
                self.stats.delivered += 1;
                pass.delivered += 1;
                self.purge_stale();
                continue;
            }

            if self.passed.remove(&expected).is_some() {
                self.last_delivered = expected;
                self.stats.passed_through += 1;
                continue;
            }

            let highest = self.pending.keys().next_back().max(self.passed.keys().next_back());
            if !highest.is_some_and(|highest| *highest > expected) {
                break;
            }

            let Some(oldest) = self.oldest_pending_arrival() else {
                break;
            };
            let wait_time = now - oldest;
            if wait_time + TIMER_SLACK < self.lifetime {
                break;
            }

            warn!(
                "Skipping lost seq {} (waited {:.3}s, holding seq {}+)",
                expected,
                wait_time,
                self.pending.keys().next().map(|s| s.as_raw()).unwrap_or_default()
            );
            self.last_delivered = expected;
            self.record_skip(expected);
            self.stats.skipped += 1;
            pass.skipped += 1;
            self.purge_stale();
        }

        if pass.delivered > 0 || pass.skipped > 0 {
            debug!("Delivered {}, skipped {} frames", pass.delivered, pass.skipped);
        }

        pass
    }

    /// Timer-driven delivery attempt; resolves gaps even when no further
    /// frame arrives
    pub fn poll<F>(&mut self, now: f64, sink: &mut F) -> DeliveryPass
    where
        F: FnMut(Released) -> Result<(), HandlerError>,
    {
        if self.pending.is_empty() && self.passed.is_empty() {
            return DeliveryPass::default();
        }
        self.attempt_delivery(now, sink)
    }

    fn purge_stale(&mut self) {
        let watermark = self.last_delivered;
        self.pending.retain(|seq, _| *seq > watermark);
        self.passed.retain(|seq, _| *seq > watermark);
    }

    fn record_skip(&mut self, seq: SeqNumber) {
        if let Some(range) = self.skipped.last_mut() {
            if range.try_extend(seq) {
                return;
            }
        }
        self.skipped.push(SkipRange::single(seq));
    }

    /// Arrival time of the longest-waiting frame held behind a gap
    pub fn oldest_pending_arrival(&self) -> Option<f64> {
        self.pending
            .values()
            .map(|entry| entry.arrival_ts)
            .chain(self.passed.values().copied())
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Time at which the current gap will be skipped, if there is one
    pub fn next_deadline(&self) -> Option<f64> {
        self.oldest_pending_arrival().map(|oldest| oldest + self.lifetime)
    }

    pub fn last_delivered(&self) -> SeqNumber {
        self.last_delivered
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, seq: SeqNumber) -> bool {
        self.pending.contains_key(&seq)
    }

    /// Every sequence number given up on, as merged ranges
    pub fn skipped(&self) -> &[SkipRange] {
        &self.skipped
    }

    pub fn stats(&self) -> ReorderStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        buffer: ReorderBuffer,
        released: Vec<u32>,
    }

    impl Harness {
        fn new() -> Self {
            Harness {
                buffer: ReorderBuffer::new(&EngineConfig::default()),
                released: Vec::new(),
            }
        }

        fn insert(&mut self, seq: u32, now: f64) -> InsertOutcome {
            let released = &mut self.released;
            self.buffer.insert(
                SeqNumber::new(seq),
                PayloadKind::ApplicationData,
                now - 0.01,
                Bytes::from(seq.to_be_bytes().to_vec()),
                now,
                now,
                &mut |r: Released| -> Result<(), HandlerError> {
                    released.push(r.seq.as_raw());
                    Ok(())
                },
            )
        }

        fn poll(&mut self, now: f64) -> DeliveryPass {
            let released = &mut self.released;
            self.buffer.poll(now, &mut |r: Released| -> Result<(), HandlerError> {
                released.push(r.seq.as_raw());
                Ok(())
            })
        }
    }

    #[test]
    fn test_in_order() {
        let mut h = Harness::new();
        h.insert(1, 0.0);
        h.insert(2, 0.01);
        assert_eq!(h.released, vec![1, 2]);
        assert_eq!(h.buffer.last_delivered(), SeqNumber::new(2));
        assert_eq!(h.buffer.pending_len(), 0);
    }

    #[test]
    fn test_out_of_order_within_threshold() {
        let mut h = Harness::new();
        h.insert(1, 0.0);
        h.insert(3, 0.01);
        assert_eq!(h.released, vec![1]);
        assert!(h.buffer.is_pending(SeqNumber::new(3)));

        let outcome = h.insert(2, 0.02);
        assert_eq!(
            outcome,
            InsertOutcome::Buffered(DeliveryPass {
                delivered: 2,
                skipped: 0
            })
        );
        assert_eq!(h.released, vec![1, 2, 3]);
    }

    #[test]
    fn test_skip_after_timeout() {
        let mut h = Harness::new();
        h.insert(2, 0.0);
        assert!(h.released.is_empty());

        h.insert(3, 0.25);
        assert_eq!(h.released, vec![2, 3]);
        assert_eq!(h.buffer.skipped(), &[SkipRange::single(SeqNumber::new(1))]);
        assert_eq!(h.buffer.stats().skipped, 1);
    }

    #[test]
    fn test_no_skip_before_timeout() {
        let mut h = Harness::new();
        h.insert(2, 0.0);
        h.insert(3, 0.1);
        assert!(h.released.is_empty());
        assert_eq!(h.buffer.next_deadline(), Some(0.2));
    }

    #[test]
    fn test_skip_cascades_over_consecutive_losses() {
        let mut h = Harness::new();
        h.insert(1, 0.0);
        h.insert(5, 0.0);
        h.insert(7, 0.05);

        let pass = h.poll(0.3);
        assert_eq!(pass, DeliveryPass { delivered: 2, skipped: 4 });
        assert_eq!(h.released, vec![1, 5, 7]);
        assert_eq!(
            h.buffer.skipped(),
            &[
                SkipRange {
                    start: SeqNumber::new(2),
                    end: SeqNumber::new(4)
                },
                SkipRange::single(SeqNumber::new(6)),
            ]
        );
        assert_eq!(h.buffer.skipped()[0].len(), 3);
    }

    #[test]
    fn test_poll_resolves_gap_without_new_arrival() {
        let mut h = Harness::new();
        h.insert(2, 0.0);
        assert_eq!(h.poll(0.1), DeliveryPass::default());
        assert_eq!(h.poll(0.2), DeliveryPass { delivered: 1, skipped: 1 });
        assert_eq!(h.released, vec![2]);
    }

    #[test]
    fn test_stale_and_duplicate() {
        let mut h = Harness::new();
        h.insert(1, 0.0);
        h.insert(3, 0.0);

        assert_eq!(h.insert(1, 0.01), InsertOutcome::Stale);
        assert_eq!(h.insert(3, 0.01), InsertOutcome::Duplicate);
        assert_eq!(h.released, vec![1]);

        let stats = h.buffer.stats();
        assert_eq!(stats.stale, 1);
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn test_late_arrival_after_skip_is_stale() {
        let mut h = Harness::new();
        h.insert(2, 0.0);
        h.poll(0.3);
        assert_eq!(h.insert(1, 0.31), InsertOutcome::Stale);
        assert_eq!(h.released, vec![2]);
    }

    #[test]
    fn test_pass_through_fills_gap() {
        let mut h = Harness::new();
        h.insert(1, 0.0);
        h.insert(3, 0.01);
        assert_eq!(h.released, vec![1]);

        let released = &mut h.released;
        let pass = h.buffer.pass_through(
            SeqNumber::new(2),
            0.02,
            0.02,
            &mut |r: Released| -> Result<(), HandlerError> {
                released.push(r.seq.as_raw());
                Ok(())
            },
        );

        assert_eq!(pass, DeliveryPass { delivered: 1, skipped: 0 });
        assert_eq!(h.released, vec![1, 3]);
        assert_eq!(h.buffer.last_delivered(), SeqNumber::new(3));
        assert_eq!(h.buffer.stats().passed_through, 1);
        assert!(h.buffer.skipped().is_empty());
    }

    #[test]
    fn test_pass_through_ahead_of_gap_expires() {
        let mut h = Harness::new();
        let mut ignore = |_: Released| -> Result<(), HandlerError> { Ok(()) };
        h.buffer.pass_through(SeqNumber::new(2), 0.0, 0.0, &mut ignore);
        assert_eq!(h.buffer.pending_len(), 0);
        assert_eq!(h.buffer.next_deadline(), Some(0.2));

        assert_eq!(h.poll(0.2), DeliveryPass { delivered: 0, skipped: 1 });
        assert_eq!(h.buffer.last_delivered(), SeqNumber::new(2));
        assert_eq!(h.buffer.next_deadline(), None);
    }

    #[test]
    fn test_handler_failure_still_advances() {
        let mut buffer = ReorderBuffer::new(&EngineConfig::default());
        let mut calls = Vec::new();
        let mut sink = |r: Released| -> Result<(), HandlerError> {
            calls.push(r.seq.as_raw());
            if r.seq == SeqNumber::new(1) {
                Err("boom".into())
            } else {
                Ok(())
            }
        };

        for seq in [2, 1] {
            buffer.insert(
                SeqNumber::new(seq),
                PayloadKind::ApplicationData,
                0.0,
                Bytes::new(),
                0.0,
                0.0,
                &mut sink,
            );
        }

        assert_eq!(calls, vec![1, 2]);
        assert_eq!(buffer.last_delivered(), SeqNumber::new(2));
        assert_eq!(buffer.stats().handler_failures, 1);
    }

    #[test]
    fn test_rtt_uses_arrival_time() {
        let mut buffer = ReorderBuffer::new(&EngineConfig::default());
        let mut rtts = Vec::new();
        buffer.insert(
            SeqNumber::new(1),
            PayloadKind::ApplicationData,
            10.0,
            Bytes::from_static(b"x"),
            10.25,
            10.5,
            &mut |r: Released| -> Result<(), HandlerError> {
                rtts.push(r.rtt);
                Ok(())
            },
        );
        assert_eq!(rtts, vec![0.25]);
    }
}
