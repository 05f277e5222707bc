//! GameNet Protocol Core Implementation
//!
//! This crate implements the sans-IO core of GameNet: a reliable and an
//! unreliable logical channel multiplexed over one best-effort datagram
//! channel. It covers framing, per-frame retransmission with a bounded
//! lifetime, in-order delivery with gap skipping, and per-channel receive
//! telemetry (throughput, RTT, RFC 3550 jitter, delivery ratio).
//!
//! Time is always passed in explicitly as wall-clock seconds, so every
//! component can be driven deterministically from tests.

pub mod channel;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod jitter;
pub mod packet;
pub mod reorder;
pub mod retransmit;
pub mod sequence;
pub mod summary;
pub mod telemetry;

pub use channel::{ChannelError, DatagramChannel, RecordingChannel};
pub use config::{EngineConfig, DEFAULT_LIFETIME_THRESHOLD, DEFAULT_RETRY_INTERVAL};
pub use delivery::{Channel, Delivery, DeliveryHandler, Discard, HandlerError};
pub use engine::{DeliveryEngine, EngineError, EngineStats, FrameDisposition, PollOutcome};
pub use jitter::JitterEstimator;
pub use packet::{
    wall_clock_secs, Frame, FrameError, FrameFlags, FrameHeader, Packet, PacketType, PayloadKind,
    HEADER_SIZE, MAX_DATAGRAM_SIZE, MAX_PAYLOAD_SIZE,
};
pub use reorder::{DeliveryPass, InsertOutcome, ReorderBuffer, ReorderStats, Released, SkipRange};
pub use retransmit::{AckOutcome, RetransmissionManager, RetransmitPass, RetransmitStats};
pub use sequence::{SeqAllocator, SeqNumber};
pub use summary::{SessionSummary, SummaryError};
pub use telemetry::{ChannelReport, ChannelStats, ChannelTelemetry, ReceiveRecord, Report};
