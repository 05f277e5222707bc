//! Boundary to the underlying datagram transport
//!
//! The engine only ever pushes opaque frames into a channel. Receiving is
//! driven from outside: whoever owns the socket hands arrived frames to
//! [`crate::engine::DeliveryEngine::on_frame`].

use thiserror::Error;

/// Channel errors
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No peer address known yet")]
    NoPeer,

    #[error("Channel is closed")]
    Closed,
}

/// Best-effort datagram channel
///
/// No delivery, ordering, or duplication guarantees are expected. A frame
/// that is accepted by `send_frame` may still be lost.
pub trait DatagramChannel {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError>;
}

impl<C: DatagramChannel + ?Sized> DatagramChannel for &mut C {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        (**self).send_frame(frame)
    }
}

impl<C: DatagramChannel + ?Sized> DatagramChannel for Box<C> {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        (**self).send_frame(frame)
    }
}

/// Channel that keeps every frame it is given, for inspection in tests
#[derive(Debug, Default)]
pub struct RecordingChannel {
    pub frames: Vec<Vec<u8>>,
    /// When set, every send fails with [`ChannelError::Closed`]
    pub fail_sends: bool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything sent so far
    pub fn take(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.frames)
    }
}

impl DatagramChannel for RecordingChannel {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        if self.fail_sends {
            return Err(ChannelError::Closed);
        }
        self.frames.push(frame.to_vec());
        Ok(())
    }
}
