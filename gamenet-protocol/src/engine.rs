//! Delivery engine
//!
//! Ties framing, retransmission and reordering together over one
//! [`DatagramChannel`]. The engine is sans-IO with respect to time and
//! receiving: every call takes the current wall-clock time in seconds, and
//! whoever owns the socket feeds arrived datagrams to [`DeliveryEngine::on_frame`]
//! and calls [`DeliveryEngine::poll`] when [`DeliveryEngine::next_deadline`]
//! has passed.

use crate::channel::DatagramChannel;
use crate::config::EngineConfig;
use crate::delivery::{Delivery, DeliveryHandler, HandlerError};
use crate::packet::{encode_ack, Frame, FrameError, FrameFlags, Packet, PayloadKind, HEADER_SIZE};
use crate::reorder::{DeliveryPass, InsertOutcome, ReorderBuffer, ReorderStats, Released};
use crate::retransmit::{AckOutcome, RetransmissionManager, RetransmitPass, RetransmitStats};
use crate::sequence::{SeqAllocator, SeqNumber};
use crate::summary::{SessionSummary, SummaryError};
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Errors returned to callers of the send operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Sequence numbers exhausted")]
    SequenceExhausted,

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Summary error: {0}")]
    Summary(#[from] SummaryError),
}

/// What the engine did with one inbound datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Acknowledgment handed to the retransmission manager
    Ack(AckOutcome),
    /// Reliable frame acknowledged and inserted into the reorder buffer
    Reliable(InsertOutcome),
    /// Unreliable frame handed straight to the application
    Unreliable,
    /// Undecodable datagram, dropped
    Malformed,
}

/// Work done by one [`DeliveryEngine::poll`] call
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub retransmit: RetransmitPass,
    pub delivery: DeliveryPass,
}

/// Engine-wide counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Application payloads sent on the reliable channel
    pub sent_reliable: u64,
    /// Application payloads sent on the unreliable channel
    pub sent_unreliable: u64,
    pub summaries_sent: u64,
    pub frames_received: u64,
    pub acks_received: u64,
    pub acks_sent: u64,
    pub ack_send_failures: u64,
    pub unreliable_send_failures: u64,
    pub malformed: u64,
    pub invalid_summaries: u64,
    /// Handler failures on the unreliable path (reliable ones are in `reorder`)
    pub handler_failures: u64,
    pub retransmit: RetransmitStats,
    pub reorder: ReorderStats,
}

/// Reliable and unreliable delivery over a best-effort channel
#[derive(Debug)]
pub struct DeliveryEngine<C: DatagramChannel> {
    channel: C,
    config: EngineConfig,
    seqs: SeqAllocator,
    retransmit: RetransmissionManager,
    reorder: ReorderBuffer,
    stats: EngineStats,
}

impl<C: DatagramChannel> DeliveryEngine<C> {
    pub fn new(channel: C, config: EngineConfig) -> Self {
        DeliveryEngine {
            channel,
            retransmit: RetransmissionManager::new(&config),
            reorder: ReorderBuffer::new(&config),
            config,
            seqs: SeqAllocator::new(),
            stats: EngineStats::default(),
        }
    }

    /// Forget everything about the current session
    ///
    /// Sequence numbers restart at 1, unacknowledged frames and buffered
    /// gaps are dropped and the counters return to zero. The channel and
    /// configuration are kept.
    pub fn reset(&mut self) {
        debug!(
            "Resetting session: {} frames unacknowledged, {} buffered",
            self.retransmit.outstanding_len(),
            self.reorder.pending_len()
        );
        self.seqs = SeqAllocator::new();
        self.retransmit = RetransmissionManager::new(&self.config);
        self.reorder = ReorderBuffer::new(&self.config);
        self.stats = EngineStats::default();
    }

    /// Send one application payload
    ///
    /// Reliable delivery is best effort: the frame is retransmitted every
    /// retry interval until acknowledged, and silently dropped once the
    /// lifetime threshold has passed without an acknowledgment. The caller
    /// is not notified either way; watch [`EngineStats::retransmit`].
    ///
    /// Unreliable frames are sent once. A refused send is logged and counted
    /// but not reported as an error.
    pub fn send(
        &mut self,
        payload: impl Into<Bytes>,
        reliable: bool,
        now: f64,
    ) -> Result<SeqNumber, EngineError> {
        let seq = self.send_with(FrameFlags::data(reliable), payload.into(), now)?;
        if reliable {
            self.stats.sent_reliable += 1;
        } else {
            self.stats.sent_unreliable += 1;
        }
        Ok(seq)
    }

    /// Send an end-of-session summary on the reliable channel
    pub fn send_summary(&mut self, summary: &SessionSummary, now: f64) -> Result<SeqNumber, EngineError> {
        let body = summary.to_json()?;
        let seq = self.send_with(FrameFlags::summary(), Bytes::from(body), now)?;
        self.stats.summaries_sent += 1;
        debug!(
            "Sent session summary as seq {} (reliable={} unreliable={})",
            seq, summary.sent_reliable, summary.sent_unreliable
        );
        Ok(seq)
    }

    fn send_with(&mut self, flags: FrameFlags, payload: Bytes, now: f64) -> Result<SeqNumber, EngineError> {
        let size = HEADER_SIZE + payload.len();
        if size > self.config.max_datagram_size {
            return Err(FrameError::Oversized {
                size,
                max: self.config.max_datagram_size,
            }
            .into());
        }

        let seq = self.seqs.allocate().ok_or(EngineError::SequenceExhausted)?;

        if flags.reliable {
            self.retransmit
                .send_reliable(seq, flags, payload, now, &mut self.channel)?;
        } else {
            let frame = Frame::encode_at(flags, seq, &payload, now)?;
            if let Err(e) = self.channel.send_frame(&frame) {
                self.stats.unreliable_send_failures += 1;
                warn!("Unreliable seq {} not sent: {}", seq, e);
            } else {
                trace!("Sent unreliable seq {} ({} bytes)", seq, payload.len());
            }
        }

        Ok(seq)
    }

    /// Process one inbound datagram
    pub fn on_frame<H>(&mut self, raw: &[u8], now: f64, handler: &mut H) -> FrameDisposition
    where
        H: DeliveryHandler + ?Sized,
    {
        self.stats.frames_received += 1;

        let packet = match Packet::parse(raw) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.malformed += 1;
                warn!("Dropping malformed frame ({} bytes): {}", raw.len(), e);
                return FrameDisposition::Malformed;
            }
        };

        match packet {
            Packet::Ack(seq) => {
                self.stats.acks_received += 1;
                FrameDisposition::Ack(self.retransmit.on_ack(seq))
            }
            Packet::Data(frame) if frame.is_reliable() => self.on_reliable(frame, now, handler),
            Packet::Data(frame) => {
                self.on_unreliable(frame, now, handler);
                FrameDisposition::Unreliable
            }
        }
    }

    fn on_reliable<H>(&mut self, frame: Frame, now: f64, handler: &mut H) -> FrameDisposition
    where
        H: DeliveryHandler + ?Sized,
    {
        let seq = frame.seq();

        // Stale and duplicate frames are acknowledged too; the first ACK may
        // have been lost
        match self.channel.send_frame(&encode_ack(seq)) {
            Ok(()) => self.stats.acks_sent += 1,
            Err(e) => {
                self.stats.ack_send_failures += 1;
                warn!("Failed to send ACK for seq {}: {}", seq, e);
            }
        }

        let stats = &mut self.stats;
        let outcome = self.reorder.insert(
            seq,
            frame.kind(),
            frame.sender_ts(),
            frame.payload,
            now,
            now,
            &mut |released: Released| -> Result<(), HandlerError> {
                dispatch_released(released, now, handler, stats)
            },
        );

        FrameDisposition::Reliable(outcome)
    }

    fn on_unreliable<H>(&mut self, frame: Frame, now: f64, handler: &mut H)
    where
        H: DeliveryHandler + ?Sized,
    {
        let seq = frame.seq();
        let delivery = Delivery {
            seq,
            reliable: false,
            sender_ts: frame.sender_ts(),
            rtt: now - frame.sender_ts(),
            payload: frame.payload,
            delivered_at: now,
        };

        if let Err(e) = handler.on_delivery(delivery) {
            self.stats.handler_failures += 1;
            warn!("Delivery handler failed for unreliable seq {}: {}", seq, e);
        }

        // The reliable stream must not wait for a number it will never see
        let stats = &mut self.stats;
        self.reorder
            .pass_through(seq, now, now, &mut |released: Released| -> Result<(), HandlerError> {
                dispatch_released(released, now, handler, stats)
            });
    }

    /// Run every timer that is due: retransmissions, abandonment and
    /// reorder gap skipping
    pub fn poll<H>(&mut self, now: f64, handler: &mut H) -> PollOutcome
    where
        H: DeliveryHandler + ?Sized,
    {
        let retransmit = self.retransmit.poll(now, &mut self.channel);

        let stats = &mut self.stats;
        let delivery = self
            .reorder
            .poll(now, &mut |released: Released| -> Result<(), HandlerError> {
                dispatch_released(released, now, handler, stats)
            });

        PollOutcome { retransmit, delivery }
    }

    /// Earliest time at which [`Self::poll`] has work to do
    pub fn next_deadline(&self) -> Option<f64> {
        match (self.retransmit.next_deadline(), self.reorder.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// True when no frame awaits an acknowledgment and no gap is pending
    pub fn is_idle(&self) -> bool {
        self.retransmit.is_empty() && self.reorder.pending_len() == 0
    }

    /// Summary of what this engine has sent so far
    pub fn sender_summary(&self, now: f64) -> SessionSummary {
        SessionSummary::new(self.stats.sent_reliable, self.stats.sent_unreliable, now)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            retransmit: self.retransmit.stats(),
            reorder: self.reorder.stats(),
            ..self.stats
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn retransmission(&self) -> &RetransmissionManager {
        &self.retransmit
    }

    pub fn reorder_buffer(&self) -> &ReorderBuffer {
        &self.reorder
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }
}

/// Hand one in-order reliable frame to the application, routed by frame kind
fn dispatch_released<H>(
    released: Released,
    now: f64,
    handler: &mut H,
    stats: &mut EngineStats,
) -> Result<(), HandlerError>
where
    H: DeliveryHandler + ?Sized,
{
    match released.kind {
        PayloadKind::SessionSummary => match SessionSummary::from_json(&released.payload) {
            Ok(summary) => handler.on_session_summary(summary, now),
            Err(e) => {
                stats.invalid_summaries += 1;
                warn!("Dropping session summary seq {}: {}", released.seq, e);
                Ok(())
            }
        },
        PayloadKind::ApplicationData => handler.on_delivery(Delivery {
            seq: released.seq,
            reliable: true,
            sender_ts: released.sender_ts,
            payload: released.payload,
            rtt: released.rtt,
            delivered_at: now,
        }),
    }
}
