//! Sender-side retransmission of reliable frames
//!
//! Every reliable frame gets its own retry schedule: it is sent immediately,
//! then resent every `retry_interval` until an acknowledgment is observed or
//! until `lifetime_threshold` has elapsed since the first transmission, at
//! which point it is abandoned. Abandonment is silent towards the original
//! caller; it shows up in logs and in [`RetransmitStats`].
//!
//! The manager does no I/O scheduling of its own. The driver calls
//! [`RetransmissionManager::poll`] whenever it wakes up and every schedule
//! whose deadline has passed runs one step.

use crate::channel::DatagramChannel;
use crate::config::EngineConfig;
use crate::packet::{Frame, FrameError, FrameFlags};
use crate::sequence::SeqNumber;
use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// Tolerance for timer comparisons on floating-point seconds
pub(crate) const TIMER_SLACK: f64 = 1e-6;

/// Statistics about retransmission behaviour
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitStats {
    /// Every transmission, first attempts included
    pub frames_sent: u64,
    /// Transmissions after the first one
    pub retransmissions: u64,
    /// Frames whose acknowledgment arrived in time
    pub acknowledged: u64,
    /// Frames given up on after the lifetime threshold
    pub abandoned: u64,
    /// Acknowledgments for frames no longer tracked
    pub unknown_acks: u64,
    /// Transmissions the channel refused
    pub send_failures: u64,
}

impl RetransmitStats {
    /// Retransmissions as a percentage of all transmissions
    pub fn retransmit_rate(&self) -> f64 {
        if self.frames_sent == 0 {
            0.0
        } else {
            self.retransmissions as f64 / self.frames_sent as f64 * 100.0
        }
    }

    /// Acknowledged frames as a percentage of all settled frames
    pub fn success_rate(&self) -> f64 {
        let settled = self.acknowledged + self.abandoned;
        if settled == 0 {
            100.0
        } else {
            self.acknowledged as f64 / settled as f64 * 100.0
        }
    }
}

/// Result of handing an acknowledgment to the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The frame was outstanding and is now marked acknowledged
    Acknowledged,
    /// The frame was already marked acknowledged
    Duplicate,
    /// Nothing is tracked under this sequence number
    Unknown,
}

/// Summary of one [`RetransmissionManager::poll`] call
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetransmitPass {
    /// Frames sent again during this pass
    pub resent: Vec<SeqNumber>,
    /// Frames whose schedules ended because they were acknowledged
    pub completed: Vec<SeqNumber>,
    /// Frames abandoned during this pass
    pub abandoned: Vec<SeqNumber>,
}

/// Outstanding reliable frame
#[derive(Debug, Clone)]
struct OutboundEntry {
    flags: FrameFlags,
    payload: Bytes,
    /// Last encoded frame (the header timestamp changes on every attempt)
    frame: Bytes,
    first_send_ts: f64,
    next_attempt_ts: f64,
    attempts: u32,
    acked: bool,
}

/// Owns every reliable frame that has been sent but not yet settled
#[derive(Debug)]
pub struct RetransmissionManager {
    outstanding: BTreeMap<SeqNumber, OutboundEntry>,
    retry_interval: f64,
    lifetime: f64,
    stats: RetransmitStats,
}

impl RetransmissionManager {
    pub fn new(config: &EngineConfig) -> Self {
        RetransmissionManager {
            outstanding: BTreeMap::new(),
            retry_interval: config.retry_interval_secs(),
            lifetime: config.lifetime_secs(),
            stats: RetransmitStats::default(),
        }
    }

    /// Register a reliable frame and transmit it for the first time
    ///
    /// Fails only if the frame cannot be encoded; a refused transmission is
    /// logged and retried on schedule like a lost one.
    pub fn send_reliable<C: DatagramChannel + ?Sized>(
        &mut self,
        seq: SeqNumber,
        flags: FrameFlags,
        payload: Bytes,
        now: f64,
        channel: &mut C,
    ) -> Result<(), FrameError> {
        let frame = Frame::encode_at(flags, seq, &payload, now)?.freeze();

        let mut entry = OutboundEntry {
            flags,
            payload,
            frame,
            first_send_ts: now,
            next_attempt_ts: now,
            attempts: 0,
            acked: false,
        };
        self.transmit(seq, &mut entry, now, channel);
        self.outstanding.insert(seq, entry);
        Ok(())
    }

    fn transmit<C: DatagramChannel + ?Sized>(
        &mut self,
        seq: SeqNumber,
        entry: &mut OutboundEntry,
        now: f64,
        channel: &mut C,
    ) {
        if entry.attempts > 0 {
            // The receiver measures RTT from the header timestamp, so every
            // resend carries a fresh one
            match Frame::encode_at(entry.flags, seq, &entry.payload, now) {
                Ok(frame) => entry.frame = frame.freeze(),
                Err(e) => warn!("Failed to re-encode seq {}: {}", seq, e),
            }
            self.stats.retransmissions += 1;
        }

        if let Err(e) = channel.send_frame(&entry.frame) {
            self.stats.send_failures += 1;
            warn!("Channel refused seq {} (attempt {}): {}", seq, entry.attempts + 1, e);
        }

        entry.attempts += 1;
        entry.next_attempt_ts = now + self.retry_interval;
        self.stats.frames_sent += 1;
        trace!("Sent seq {} (attempt {})", seq, entry.attempts);
    }

    /// Run every retry schedule whose deadline has passed
    pub fn poll<C: DatagramChannel + ?Sized>(&mut self, now: f64, channel: &mut C) -> RetransmitPass {
        let mut pass = RetransmitPass::default();

        let due: Vec<SeqNumber> = self
            .outstanding
            .iter()
            .filter(|(_, entry)| entry.next_attempt_ts <= now + TIMER_SLACK)
            .map(|(seq, _)| *seq)
            .collect();

        for seq in due {
            let Some(mut entry) = self.outstanding.remove(&seq) else {
                continue;
            };

            if entry.acked {
                trace!("Retry schedule for seq {} finished (acknowledged)", seq);
                pass.completed.push(seq);
                continue;
            }

            let elapsed = now - entry.first_send_ts;
            if elapsed + TIMER_SLACK >= self.lifetime {
                warn!(
                    "Giving up on seq {} after {} attempts ({:.0} ms unacknowledged)",
                    seq,
                    entry.attempts,
                    elapsed * 1000.0
                );
                self.stats.abandoned += 1;
                pass.abandoned.push(seq);
                continue;
            }

            self.transmit(seq, &mut entry, now, channel);
            pass.resent.push(seq);
            self.outstanding.insert(seq, entry);
        }

        pass
    }

    /// Record an acknowledgment
    ///
    /// The retry schedule notices the flag at its next wake-up and ends; a
    /// resend that is already due in the same wake-up is suppressed, but
    /// nothing is cancelled synchronously.
    pub fn on_ack(&mut self, seq: SeqNumber) -> AckOutcome {
        match self.outstanding.get_mut(&seq) {
            Some(entry) if entry.acked => {
                debug!("Duplicate ACK for seq {}", seq);
                AckOutcome::Duplicate
            }
            Some(entry) => {
                entry.acked = true;
                self.stats.acknowledged += 1;
                debug!("ACK received for seq {} after {} attempts", seq, entry.attempts);
                AckOutcome::Acknowledged
            }
            None => {
                self.stats.unknown_acks += 1;
                debug!("ACK for seq {} which is no longer tracked (late or duplicate)", seq);
                AckOutcome::Unknown
            }
        }
    }

    /// Earliest time at which [`Self::poll`] has work to do
    pub fn next_deadline(&self) -> Option<f64> {
        self.outstanding
            .values()
            .map(|entry| entry.next_attempt_ts)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Number of frames still tracked (acknowledged ones linger until their
    /// next wake-up)
    pub fn outstanding_len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    pub fn contains(&self, seq: SeqNumber) -> bool {
        self.outstanding.contains_key(&seq)
    }

    /// Transmissions so far for an outstanding frame
    pub fn attempts(&self, seq: SeqNumber) -> Option<u32> {
        self.outstanding.get(&seq).map(|entry| entry.attempts)
    }

    /// Whether an outstanding frame has been acknowledged
    pub fn is_acked(&self, seq: SeqNumber) -> Option<bool> {
        self.outstanding.get(&seq).map(|entry| entry.acked)
    }

    pub fn stats(&self) -> RetransmitStats {
        self.stats
    }
}
