//! Application-facing delivery contract

use crate::sequence::SeqNumber;
use crate::summary::SessionSummary;
use bytes::Bytes;

/// Error type application handlers may return
///
/// Failures are logged at the dispatch boundary and never disturb protocol
/// state.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Logical traffic class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Reliable,
    Unreliable,
}

impl Channel {
    pub fn from_reliable(reliable: bool) -> Self {
        if reliable {
            Channel::Reliable
        } else {
            Channel::Unreliable
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Reliable => "reliable",
            Channel::Unreliable => "unreliable",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One payload handed to the application
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub seq: SeqNumber,
    pub reliable: bool,
    /// Sender timestamp from the frame header (seconds since the epoch)
    pub sender_ts: f64,
    pub payload: Bytes,
    /// Arrival time minus sender timestamp, in seconds
    pub rtt: f64,
    /// Local time at which the payload was handed over
    pub delivered_at: f64,
}

impl Delivery {
    pub fn channel(&self) -> Channel {
        Channel::from_reliable(self.reliable)
    }
}

/// Receiver of delivered payloads
///
/// `on_delivery` runs exactly once per delivered reliable frame and once per
/// arrived unreliable frame. Session summaries from the peer are routed to
/// `on_session_summary` instead.
pub trait DeliveryHandler {
    fn on_delivery(&mut self, delivery: Delivery) -> Result<(), HandlerError>;

    fn on_session_summary(&mut self, _summary: SessionSummary, _now: f64) -> Result<(), HandlerError> {
        Ok(())
    }

    /// The remote end changed; anything kept for the old session is stale
    fn on_session_reset(&mut self) {}
}

impl<F> DeliveryHandler for F
where
    F: FnMut(Delivery) -> Result<(), HandlerError>,
{
    fn on_delivery(&mut self, delivery: Delivery) -> Result<(), HandlerError> {
        self(delivery)
    }
}

/// Handler that drops everything; useful for pure senders
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl DeliveryHandler for Discard {
    fn on_delivery(&mut self, _delivery: Delivery) -> Result<(), HandlerError> {
        Ok(())
    }
}
