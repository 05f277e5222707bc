//! Cooperative event loop around a [`DeliveryEngine`]
//!
//! One thread, no locks: the loop drains the channel, hands every frame to
//! the engine, runs the engine's timers and then sleeps until the next
//! deadline, bounded by a tick so newly arrived frames are picked up
//! promptly.

use crate::time::{Clock, SystemClock};
use bytes::Bytes;
use gamenet_protocol::{
    ChannelError, DatagramChannel, DeliveryEngine, DeliveryHandler, EngineConfig, EngineError,
    SeqNumber,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Default upper bound on one idle sleep
pub const DEFAULT_TICK: Duration = Duration::from_millis(5);

/// Tolerance for end-of-run checks, and the shortest sleep
const LOOP_SLACK: f64 = 1e-6;

/// Nonblocking source of inbound frames
pub trait FrameSource {
    /// Next waiting frame, or `None` if nothing has arrived
    fn recv_frame(&mut self) -> Result<Option<Bytes>, ChannelError>;

    /// Whether the frame just returned came from a different remote end
    /// than the one before it; reports each change once
    fn take_peer_change(&mut self) -> bool {
        false
    }
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn recv_frame(&mut self) -> Result<Option<Bytes>, ChannelError> {
        (**self).recv_frame()
    }

    fn take_peer_change(&mut self) -> bool {
        (**self).take_peer_change()
    }
}

/// Endpoint errors
#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Shared flag asking a running loop to return
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Engine, channel and clock driven by one loop
pub struct Endpoint<C: DatagramChannel, K: Clock = SystemClock> {
    engine: DeliveryEngine<C>,
    clock: K,
    tick: Duration,
    stop: StopHandle,
}

impl<C: DatagramChannel + FrameSource> Endpoint<C, SystemClock> {
    /// Endpoint on the system clock
    pub fn new(channel: C, config: EngineConfig) -> Self {
        Self::with_clock(channel, config, SystemClock)
    }
}

impl<C: DatagramChannel + FrameSource, K: Clock> Endpoint<C, K> {
    pub fn with_clock(channel: C, config: EngineConfig, clock: K) -> Self {
        Endpoint {
            engine: DeliveryEngine::new(channel, config),
            clock,
            tick: DEFAULT_TICK,
            stop: StopHandle::default(),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Send one payload stamped with the endpoint's clock
    pub fn send(&mut self, payload: impl Into<Bytes>, reliable: bool) -> Result<SeqNumber, EndpointError> {
        let now = self.clock.now();
        Ok(self.engine.send(payload, reliable, now)?)
    }

    /// Send the summary of everything sent so far
    pub fn send_summary(&mut self) -> Result<SeqNumber, EndpointError> {
        let now = self.clock.now();
        let summary = self.engine.sender_summary(now);
        Ok(self.engine.send_summary(&summary, now)?)
    }

    /// Drain every waiting frame, then run the engine's timers
    ///
    /// A frame from a new remote end discards the old session's state in
    /// both the engine and the handler before it is processed.
    ///
    /// Returns the number of frames processed.
    pub fn pump<H>(&mut self, handler: &mut H) -> Result<usize, EndpointError>
    where
        H: DeliveryHandler + ?Sized,
    {
        let mut frames = 0;
        while let Some(frame) = self.engine.channel_mut().recv_frame()? {
            if self.engine.channel_mut().take_peer_change() {
                info!("New peer, starting a fresh session");
                self.engine.reset();
                handler.on_session_reset();
            }
            let now = self.clock.now();
            self.engine.on_frame(&frame, now, handler);
            frames += 1;
        }

        let now = self.clock.now();
        self.engine.poll(now, handler);
        Ok(frames)
    }

    /// Run the loop until `done` returns true, `timeout` elapses or the
    /// stop handle fires
    ///
    /// Returns whether `done` was satisfied.
    pub fn run_until<H, F>(
        &mut self,
        handler: &mut H,
        timeout: Option<Duration>,
        mut done: F,
    ) -> Result<bool, EndpointError>
    where
        H: DeliveryHandler + ?Sized,
        F: FnMut(&DeliveryEngine<C>, &H) -> bool,
    {
        let end = timeout.map(|t| self.clock.now() + t.as_secs_f64());

        loop {
            self.pump(handler)?;
            if done(&self.engine, handler) {
                return Ok(true);
            }
            if self.stop.is_stopped() {
                debug!("Event loop stopped");
                return Ok(false);
            }

            let now = self.clock.now();
            if end.is_some_and(|end| now + LOOP_SLACK >= end) {
                return Ok(false);
            }

            let mut wake = now + self.tick.as_secs_f64();
            if let Some(deadline) = self.engine.next_deadline() {
                wake = wake.min(deadline);
            }
            if let Some(end) = end {
                wake = wake.min(end);
            }
            let sleep = (wake - now).max(LOOP_SLACK);
            self.clock.sleep(Duration::from_secs_f64(sleep));
        }
    }

    /// Run the loop for a fixed time
    pub fn run_for<H>(&mut self, duration: Duration, handler: &mut H) -> Result<(), EndpointError>
    where
        H: DeliveryHandler + ?Sized,
    {
        self.run_until(handler, Some(duration), |_, _| false)?;
        Ok(())
    }

    /// Run until no reliable frame awaits an acknowledgment, or `timeout`
    pub fn settle<H>(&mut self, timeout: Duration, handler: &mut H) -> Result<bool, EndpointError>
    where
        H: DeliveryHandler + ?Sized,
    {
        self.run_until(handler, Some(timeout), |engine, _| {
            engine.retransmission().is_empty()
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn engine(&self) -> &DeliveryEngine<C> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut DeliveryEngine<C> {
        &mut self.engine
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn into_engine(self) -> DeliveryEngine<C> {
        self.engine
    }
}
