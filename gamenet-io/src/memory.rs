//! In-process datagram link with fault injection
//!
//! [`MemoryChannel::pair`] returns two connected ends backed by crossbeam
//! queues. Each direction applies the same fault model:
//!
//! | Fault       | Description                                           |
//! |-------------|-------------------------------------------------------|
//! | Loss        | Drop a frame with probability `loss_rate`.            |
//! | Reordering  | Hold a frame back until the next one has been sent,   |
//! |             | or until the peer finds its queue empty.              |
//! | Duplication | Deliver a frame twice.                                |
//! | Filter      | Drop every frame the filter hook rejects.             |
//!
//! Randomness comes from a seeded RNG per direction, so a failing test
//! replays identically.

use crate::FrameSource;
use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use gamenet_protocol::{ChannelError, DatagramChannel};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Frame filter; returning `false` drops the frame
pub type FrameFilter = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Fault model of one link; all probabilities are in `[0.0, 1.0]`
#[derive(Clone, Default)]
pub struct LinkConfig {
    /// Probability that a frame is silently dropped
    pub loss_rate: f64,
    /// Probability that a frame is overtaken by the next one
    pub reorder_rate: f64,
    /// Probability that a frame is delivered twice
    pub duplicate_rate: f64,
    pub seed: u64,
    pub filter: Option<FrameFilter>,
}

impl LinkConfig {
    /// A perfect link
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loss(mut self, rate: f64) -> Self {
        self.loss_rate = rate;
        self
    }

    pub fn with_reorder(mut self, rate: f64) -> Self {
        self.reorder_rate = rate;
        self
    }

    pub fn with_duplicates(mut self, rate: f64) -> Self {
        self.duplicate_rate = rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for LinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkConfig")
            .field("loss_rate", &self.loss_rate)
            .field("reorder_rate", &self.reorder_rate)
            .field("duplicate_rate", &self.duplicate_rate)
            .field("seed", &self.seed)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// What the link did to outbound frames
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub offered: u64,
    /// Frames queued to the peer; a held frame the peer picks up itself is
    /// not counted
    pub delivered: u64,
    pub dropped: u64,
    pub filtered: u64,
    pub duplicated: u64,
    pub reordered: u64,
}

/// Slot for a frame held back for reordering, shared by both ends of one
/// direction
type HeldFrame = Arc<Mutex<Option<Bytes>>>;

/// One end of an in-process link
pub struct MemoryChannel {
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
    config: LinkConfig,
    rng: StdRng,
    held_out: HeldFrame,
    held_in: HeldFrame,
    stats: LinkStats,
}

impl MemoryChannel {
    /// Two connected ends sharing one fault model
    ///
    /// The directions use different seeds derived from `config.seed`.
    pub fn pair(config: LinkConfig) -> (MemoryChannel, MemoryChannel) {
        let (a_tx, b_rx) = channel::unbounded();
        let (b_tx, a_rx) = channel::unbounded();
        let a_to_b = HeldFrame::default();
        let b_to_a = HeldFrame::default();
        let seed = config.seed;

        let a = MemoryChannel {
            tx: a_tx,
            rx: a_rx,
            config: config.clone(),
            rng: StdRng::seed_from_u64(seed),
            held_out: a_to_b.clone(),
            held_in: b_to_a.clone(),
            stats: LinkStats::default(),
        };
        let b = MemoryChannel {
            tx: b_tx,
            rx: b_rx,
            config,
            rng: StdRng::seed_from_u64(seed.wrapping_add(1)),
            held_out: b_to_a,
            held_in: a_to_b,
            stats: LinkStats::default(),
        };
        (a, b)
    }

    /// Release a frame held back for reordering
    pub fn flush(&mut self) -> Result<(), ChannelError> {
        let held = self.held_out.lock().take();
        if let Some(frame) = held {
            self.push(frame)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Frames waiting to be read on this end
    pub fn pending(&self) -> usize {
        self.rx.len() + usize::from(self.held_in.lock().is_some())
    }

    fn push(&mut self, frame: Bytes) -> Result<(), ChannelError> {
        self.tx.send(frame).map_err(|_| ChannelError::Closed)?;
        self.stats.delivered += 1;
        Ok(())
    }

    fn roll(&mut self, rate: f64) -> bool {
        rate > 0.0 && self.rng.gen::<f64>() < rate
    }
}

impl fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("config", &self.config)
            .field("held", &self.held_out.lock().is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

impl DatagramChannel for MemoryChannel {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        self.stats.offered += 1;

        if let Some(filter) = &self.config.filter {
            if !filter(frame) {
                self.stats.filtered += 1;
                trace!("Link filter dropped {} bytes", frame.len());
                return Ok(());
            }
        }

        if self.roll(self.config.loss_rate) {
            self.stats.dropped += 1;
            trace!("Link dropped {} bytes", frame.len());
            return Ok(());
        }

        let frame = Bytes::copy_from_slice(frame);
        let duplicate = self.roll(self.config.duplicate_rate);

        let slot_free = self.held_out.lock().is_none();
        if slot_free && self.roll(self.config.reorder_rate) {
            self.stats.reordered += 1;
            *self.held_out.lock() = Some(frame);
            return Ok(());
        }

        if duplicate {
            self.stats.duplicated += 1;
            self.push(frame.clone())?;
        }
        self.push(frame)?;
        self.flush()
    }
}

impl FrameSource for MemoryChannel {
    fn recv_frame(&mut self) -> Result<Option<Bytes>, ChannelError> {
        match self.rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            // A held frame is overtaken by everything already queued
            Err(TryRecvError::Empty) => Ok(self.held_in.lock().take()),
            Err(TryRecvError::Disconnected) => match self.held_in.lock().take() {
                Some(frame) => Ok(Some(frame)),
                None => Err(ChannelError::Closed),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(channel: &mut MemoryChannel) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Some(frame) = channel.recv_frame().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_perfect_link() {
        let (mut a, mut b) = MemoryChannel::pair(LinkConfig::new());
        a.send_frame(b"one").unwrap();
        a.send_frame(b"two").unwrap();
        b.send_frame(b"back").unwrap();

        assert_eq!(drain(&mut b), vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
        assert_eq!(drain(&mut a), vec![Bytes::from_static(b"back")]);
        assert_eq!(a.stats().delivered, 2);
    }

    #[test]
    fn test_full_loss() {
        let (mut a, mut b) = MemoryChannel::pair(LinkConfig::new().with_loss(1.0));
        for _ in 0..10 {
            a.send_frame(b"gone").unwrap();
        }
        assert!(drain(&mut b).is_empty());
        assert_eq!(a.stats().dropped, 10);
    }

    #[test]
    fn test_loss_is_reproducible() {
        let run = |seed| {
            let (mut a, mut b) = MemoryChannel::pair(LinkConfig::new().with_loss(0.3).with_seed(seed));
            for i in 0..100u8 {
                a.send_frame(&[i]).unwrap();
            }
            drain(&mut b)
        };

        let first = run(7);
        assert_eq!(first, run(7));
        assert!(first.len() > 40 && first.len() < 95);
    }

    #[test]
    fn test_duplication() {
        let (mut a, mut b) = MemoryChannel::pair(LinkConfig::new().with_duplicates(1.0));
        a.send_frame(b"twice").unwrap();
        assert_eq!(drain(&mut b).len(), 2);
        assert_eq!(a.stats().duplicated, 1);
    }

    #[test]
    fn test_reorder_swaps_neighbours() {
        let (mut a, mut b) = MemoryChannel::pair(LinkConfig::new().with_reorder(1.0));
        a.send_frame(b"1").unwrap();
        a.send_frame(b"2").unwrap();
        a.send_frame(b"3").unwrap();
        a.flush().unwrap();

        let got = drain(&mut b);
        let got: Vec<&[u8]> = got.iter().map(|f| &f[..]).collect();
        assert_eq!(got, vec![&b"2"[..], &b"1"[..], &b"3"[..]]);
        assert_eq!(a.stats().reordered, 2);
    }

    #[test]
    fn test_held_frame_reaches_idle_peer() {
        let (mut a, mut b) = MemoryChannel::pair(LinkConfig::new().with_reorder(1.0));
        a.send_frame(b"last").unwrap();
        assert_eq!(a.stats().reordered, 1);
        assert_eq!(b.pending(), 1);

        // No further send and no flush from the sending end
        assert_eq!(drain(&mut b), vec![Bytes::from_static(b"last")]);
        assert_eq!(b.pending(), 0);
        a.flush().unwrap();
        assert!(drain(&mut b).is_empty());
    }

    #[test]
    fn test_held_frame_trails_queued_frames() {
        let (mut a, mut b) = MemoryChannel::pair(LinkConfig::new().with_reorder(1.0));
        a.send_frame(b"1").unwrap();
        a.send_frame(b"2").unwrap();
        a.send_frame(b"3").unwrap();

        let got = drain(&mut b);
        let got: Vec<&[u8]> = got.iter().map(|f| &f[..]).collect();
        assert_eq!(got, vec![&b"2"[..], &b"1"[..], &b"3"[..]]);
    }

    #[test]
    fn test_filter_drops_matching_frames() {
        let link = LinkConfig::new().with_filter(|frame| !frame.starts_with(b"ACK:"));
        let (mut a, mut b) = MemoryChannel::pair(link);

        a.send_frame(b"ACK:1").unwrap();
        a.send_frame(b"data").unwrap();

        assert_eq!(drain(&mut b), vec![Bytes::from_static(b"data")]);
        assert_eq!(a.stats().filtered, 1);
    }

    #[test]
    fn test_closed_peer() {
        let (mut a, b) = MemoryChannel::pair(LinkConfig::new());
        drop(b);
        assert!(matches!(a.send_frame(b"x"), Err(ChannelError::Closed)));
        assert!(matches!(a.recv_frame(), Err(ChannelError::Closed)));
    }
}
