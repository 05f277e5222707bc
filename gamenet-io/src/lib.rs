//! GameNet I/O and Platform Abstraction
//!
//! This crate connects the sans-IO protocol core to real (or simulated)
//! datagram transports: a nonblocking UDP channel, an in-process lossy link
//! for tests and demos, clocks, and the event loop that drives an engine.

pub mod endpoint;
pub mod memory;
pub mod socket;
pub mod time;

pub use endpoint::{Endpoint, EndpointError, FrameSource, StopHandle, DEFAULT_TICK};
pub use memory::{FrameFilter, LinkConfig, LinkStats, MemoryChannel};
pub use socket::UdpChannel;
pub use time::{Clock, ManualClock, SystemClock, Timer};
