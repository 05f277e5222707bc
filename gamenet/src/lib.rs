//! GameNet - reliable and unreliable game traffic over one datagram channel
//!
//! High-level Rust API: the protocol core, its I/O drivers, and shortcuts
//! for opening UDP endpoints.

pub use gamenet_io as io;
pub use gamenet_protocol as protocol;

// Re-export commonly used types
pub use io::{Endpoint, EndpointError, LinkConfig, MemoryChannel, UdpChannel};
pub use protocol::{
    Channel, ChannelTelemetry, Delivery, DeliveryEngine, DeliveryHandler, EngineConfig, Report,
    SeqNumber, SessionSummary,
};

use std::net::SocketAddr;

/// Open a client endpoint sending to `peer`
pub fn connect(peer: SocketAddr, config: EngineConfig) -> Result<Endpoint<UdpChannel>, EndpointError> {
    Ok(Endpoint::new(UdpChannel::connect(peer)?, config))
}

/// Open a server endpoint on `addr`
///
/// The peer is learned from the first datagram. A datagram from another
/// address replaces the peer and starts a new session.
pub fn listen(addr: SocketAddr, config: EngineConfig) -> Result<Endpoint<UdpChannel>, EndpointError> {
    Ok(Endpoint::new(UdpChannel::bind(addr)?, config))
}
