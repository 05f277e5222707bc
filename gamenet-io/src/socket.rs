//! UDP datagram channel
//!
//! Nonblocking UDP socket configured through socket2. A channel created with
//! [`UdpChannel::connect`] always talks to one peer; one created with
//! [`UdpChannel::bind`] learns its peer from the first datagram it receives
//! and follows whichever address sent the latest datagram. A change of
//! address is reported once through [`FrameSource::take_peer_change`] so the
//! owner can start a fresh session.

use crate::FrameSource;
use bytes::Bytes;
use gamenet_protocol::{ChannelError, DatagramChannel, MAX_DATAGRAM_SIZE};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use tracing::{debug, info};

/// UDP implementation of [`DatagramChannel`]
#[derive(Debug)]
pub struct UdpChannel {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    connected: bool,
    peer_changed: bool,
    recv_buf: Vec<u8>,
}

impl UdpChannel {
    /// Bind a server-side channel to the given address
    pub fn bind(addr: SocketAddr) -> Result<Self, ChannelError> {
        let socket = Self::open(addr)?;
        info!("Listening on {}", socket.local_addr()?);
        Ok(Self::from_socket(socket, None, false))
    }

    /// Open a client-side channel that sends to `peer`
    pub fn connect(peer: SocketAddr) -> Result<Self, ChannelError> {
        let local: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = Self::open(local)?;
        socket.connect(peer)?;
        debug!("Connected {} -> {}", socket.local_addr()?, peer);
        Ok(Self::from_socket(socket, Some(peer), true))
    }

    fn open(addr: SocketAddr) -> Result<UdpSocket, ChannelError> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    }

    fn from_socket(socket: UdpSocket, peer: Option<SocketAddr>, connected: bool) -> Self {
        UdpChannel {
            socket,
            peer,
            connected,
            peer_changed: false,
            recv_buf: vec![0u8; MAX_DATAGRAM_SIZE],
        }
    }

    /// Set the send buffer size
    pub fn set_send_buffer_size(&self, size: usize) -> Result<(), ChannelError> {
        SockRef::from(&self.socket).set_send_buffer_size(size)?;
        Ok(())
    }

    /// Set the receive buffer size
    pub fn set_recv_buffer_size(&self, size: usize) -> Result<(), ChannelError> {
        SockRef::from(&self.socket).set_recv_buffer_size(size)?;
        Ok(())
    }

    /// Get the receive buffer size
    pub fn recv_buffer_size(&self) -> Result<usize, ChannelError> {
        Ok(SockRef::from(&self.socket).recv_buffer_size()?)
    }

    /// Get the local address this channel is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, ChannelError> {
        Ok(self.socket.local_addr()?)
    }

    /// The remote end, once known
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }
}

impl DatagramChannel for UdpChannel {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        if self.connected {
            self.socket.send(frame)?;
        } else {
            let peer = self.peer.ok_or(ChannelError::NoPeer)?;
            self.socket.send_to(frame, peer)?;
        }
        Ok(())
    }
}

impl FrameSource for UdpChannel {
    fn recv_frame(&mut self) -> Result<Option<Bytes>, ChannelError> {
        loop {
            let (n, from) = match self.socket.recv_from(&mut self.recv_buf) {
                Ok(received) => received,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                // ICMP port unreachable from an earlier send
                Err(e) if matches!(e.kind(), ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset) => {
                    debug!("Peer unreachable: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match self.peer {
                None => {
                    info!("Peer {} connected", from);
                    self.peer = Some(from);
                }
                Some(peer) if peer != from && self.connected => {
                    debug!("Ignoring {} bytes from unexpected peer {}", n, from);
                    continue;
                }
                Some(peer) if peer != from => {
                    info!("Peer {} replaced by {}", peer, from);
                    self.peer = Some(from);
                    self.peer_changed = true;
                }
                Some(_) => {}
            }

            return Ok(Some(Bytes::copy_from_slice(&self.recv_buf[..n])));
        }
    }

    fn take_peer_change(&mut self) -> bool {
        std::mem::take(&mut self.peer_changed)
    }
}
