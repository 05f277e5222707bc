//! GameNet Frame Structures and Serialization
//!
//! Every data datagram starts with a fixed 13-byte header followed by the
//! opaque payload:
//!
//! ```text
//!  0        1                 5                               13
//! +--------+-----------------+-------------------------------+---------
//! | flags  | sequence (u32)  | sender timestamp (f64 seconds)| payload
//! +--------+-----------------+-------------------------------+---------
//! ```
//!
//! All multi-byte fields are big-endian. Acknowledgments use a separate,
//! textual format (`ACK:<seq>`) that is recognised before header decoding.

use crate::sequence::SeqNumber;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Size of the data frame header in bytes (flags + seq + timestamp)
pub const HEADER_SIZE: usize = 13;

/// Largest datagram the underlying channel is expected to carry
pub const MAX_DATAGRAM_SIZE: usize = 65536;

/// Largest payload that fits in a single datagram
pub const MAX_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - HEADER_SIZE;

/// Tag that opens every acknowledgment datagram
pub const ACK_TAG: &[u8] = b"ACK:";

/// Flag bit: frame belongs to the reliable channel
const FLAG_RELIABLE: u8 = 0b0000_0001;

/// Flag bit: payload is a session summary, not application data
const FLAG_SUMMARY: u8 = 0b0000_0010;

/// Current wall-clock time as seconds since the Unix epoch
pub fn wall_clock_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// What a data frame's payload carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Opaque application bytes
    ApplicationData,
    /// Sender's end-of-session statistics (JSON)
    SessionSummary,
}

/// Decoded flag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFlags {
    pub reliable: bool,
    pub kind: PayloadKind,
}

impl FrameFlags {
    pub fn data(reliable: bool) -> Self {
        FrameFlags {
            reliable,
            kind: PayloadKind::ApplicationData,
        }
    }

    pub fn summary() -> Self {
        FrameFlags {
            reliable: true,
            kind: PayloadKind::SessionSummary,
        }
    }

    /// Parse a flag byte, rejecting unknown bits and unreliable summaries
    pub fn from_bits(bits: u8) -> Result<Self, FrameError> {
        if bits & !(FLAG_RELIABLE | FLAG_SUMMARY) != 0 {
            return Err(FrameError::InvalidFlags(bits));
        }

        let reliable = bits & FLAG_RELIABLE != 0;
        let kind = if bits & FLAG_SUMMARY != 0 {
            if !reliable {
                return Err(FrameError::InvalidFlags(bits));
            }
            PayloadKind::SessionSummary
        } else {
            PayloadKind::ApplicationData
        };

        Ok(FrameFlags { reliable, kind })
    }

    pub fn as_bits(self) -> u8 {
        let mut bits = 0;
        if self.reliable {
            bits |= FLAG_RELIABLE;
        }
        if self.kind == PayloadKind::SessionSummary {
            bits |= FLAG_SUMMARY;
        }
        bits
    }
}

/// Fixed frame header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    pub flags: FrameFlags,
    pub seq: SeqNumber,
    /// Sender wall-clock time in seconds since the Unix epoch
    pub sender_ts: f64,
}

impl FrameHeader {
    /// Parse header from bytes (network byte order)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let mut buf = &bytes[..HEADER_SIZE];
        let flags = FrameFlags::from_bits(buf.get_u8())?;
        Ok(FrameHeader {
            flags,
            seq: SeqNumber::new(buf.get_u32()),
            sender_ts: buf.get_f64(),
        })
    }

    /// Serialize header to bytes (network byte order)
    pub fn to_bytes(&self, buf: &mut BytesMut) {
        buf.put_u8(self.flags.as_bits());
        buf.put_u32(self.seq.as_raw());
        buf.put_f64(self.sender_ts);
    }
}

/// Data frame: header plus opaque payload
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame with an explicit sender timestamp
    pub fn new(flags: FrameFlags, seq: SeqNumber, sender_ts: f64, payload: Bytes) -> Self {
        Frame {
            header: FrameHeader {
                flags,
                seq,
                sender_ts,
            },
            payload,
        }
    }

    /// Encode an application frame stamped with the current wall-clock time
    pub fn encode(reliable: bool, seq: SeqNumber, payload: &[u8]) -> Result<BytesMut, FrameError> {
        Self::encode_at(FrameFlags::data(reliable), seq, payload, wall_clock_secs())
    }

    /// Encode a frame with the given flags and timestamp
    pub fn encode_at(
        flags: FrameFlags,
        seq: SeqNumber,
        payload: &[u8],
        sender_ts: f64,
    ) -> Result<BytesMut, FrameError> {
        let size = HEADER_SIZE + payload.len();
        if size > MAX_DATAGRAM_SIZE {
            return Err(FrameError::Oversized {
                size,
                max: MAX_DATAGRAM_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(size);
        FrameHeader {
            flags,
            seq,
            sender_ts,
        }
        .to_bytes(&mut buf);
        buf.put_slice(payload);
        Ok(buf)
    }

    /// Parse a data frame from bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let header = FrameHeader::from_bytes(bytes)?;
        let payload = Bytes::copy_from_slice(&bytes[HEADER_SIZE..]);
        Ok(Frame { header, payload })
    }

    /// Serialize the frame to bytes
    pub fn to_bytes(&self) -> Result<BytesMut, FrameError> {
        Self::encode_at(
            self.header.flags,
            self.header.seq,
            &self.payload,
            self.header.sender_ts,
        )
    }

    #[inline]
    pub fn seq(&self) -> SeqNumber {
        self.header.seq
    }

    #[inline]
    pub fn is_reliable(&self) -> bool {
        self.header.flags.reliable
    }

    #[inline]
    pub fn kind(&self) -> PayloadKind {
        self.header.flags.kind
    }

    #[inline]
    pub fn sender_ts(&self) -> f64 {
        self.header.sender_ts
    }

    /// Total size of the frame (header + payload)
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode an acknowledgment datagram for `seq`
pub fn encode_ack(seq: SeqNumber) -> Bytes {
    let mut buf = BytesMut::with_capacity(ACK_TAG.len() + 10);
    buf.put_slice(ACK_TAG);
    buf.put_slice(seq.to_string().as_bytes());
    buf.freeze()
}

/// Check whether a datagram is an acknowledgment
#[inline]
pub fn is_ack(bytes: &[u8]) -> bool {
    bytes.starts_with(ACK_TAG)
}

/// Parse the sequence number out of an acknowledgment datagram
pub fn decode_ack(bytes: &[u8]) -> Result<SeqNumber, FrameError> {
    let digits = bytes.strip_prefix(ACK_TAG).ok_or(FrameError::InvalidAck)?;
    std::str::from_utf8(digits)
        .ok()
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse::<u32>().ok())
        .map(SeqNumber::new)
        .ok_or(FrameError::InvalidAck)
}

/// Any datagram the engine can receive
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Ack(SeqNumber),
    Data(Frame),
}

impl Packet {
    /// Classify and parse a datagram; acknowledgments are recognised first
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        if is_ack(bytes) {
            Ok(Packet::Ack(decode_ack(bytes)?))
        } else {
            Ok(Packet::Data(Frame::decode(bytes)?))
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Packet::Ack(_))
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Ack(_) => PacketType::Ack,
            Packet::Data(f) if f.is_reliable() => PacketType::Reliable,
            Packet::Data(_) => PacketType::Unreliable,
        }
    }
}

/// Packet type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Ack,
    Reliable,
    Unreliable,
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::Ack => write!(f, "Ack"),
            PacketType::Reliable => write!(f, "Reliable"),
            PacketType::Unreliable => write!(f, "Unreliable"),
        }
    }
}

/// Frame parsing and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("Invalid flag byte: {0:#04x}")]
    InvalidFlags(u8),

    #[error("Malformed acknowledgment")]
    InvalidAck,

    #[error("Frame too large: {size} bytes (max {max})")]
    Oversized { size: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let bytes = Frame::encode_at(FrameFlags::data(true), SeqNumber::new(0x0102_0304), b"xy", 1.5)
            .unwrap();

        assert_eq!(bytes.len(), HEADER_SIZE + 2);
        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[1..5], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[5..13], &1.5f64.to_be_bytes());
        assert_eq!(&bytes[13..], b"xy");
    }

    #[test]
    fn test_frame_serialization() {
        let bytes =
            Frame::encode_at(FrameFlags::data(false), SeqNumber::new(42), b"hello", 1234.25).unwrap();
        let frame = Frame::decode(&bytes).unwrap();

        assert_eq!(frame.seq(), SeqNumber::new(42));
        assert!(!frame.is_reliable());
        assert_eq!(frame.kind(), PayloadKind::ApplicationData);
        assert_eq!(frame.sender_ts(), 1234.25);
        assert_eq!(&frame.payload[..], b"hello");
    }

    #[test]
    fn test_encode_stamps_current_time() {
        let before = wall_clock_secs();
        let bytes = Frame::encode(true, SeqNumber::new(1), b"").unwrap();
        let after = wall_clock_secs();

        let frame = Frame::decode(&bytes).unwrap();
        assert!(frame.sender_ts() >= before && frame.sender_ts() <= after);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_decode_too_short() {
        let err = Frame::decode(&[0x01, 0, 0, 0, 1]).unwrap_err();
        assert_eq!(
            err,
            FrameError::TooShort {
                expected: HEADER_SIZE,
                actual: 5
            }
        );
    }

    #[test]
    fn test_flags() {
        assert_eq!(FrameFlags::from_bits(0x00).unwrap(), FrameFlags::data(false));
        assert_eq!(FrameFlags::from_bits(0x01).unwrap(), FrameFlags::data(true));
        assert_eq!(FrameFlags::from_bits(0x03).unwrap(), FrameFlags::summary());
        assert_eq!(FrameFlags::summary().as_bits(), 0x03);

        // Summaries are always reliable
        assert_eq!(FrameFlags::from_bits(0x02), Err(FrameError::InvalidFlags(0x02)));
        assert_eq!(FrameFlags::from_bits(0x80), Err(FrameError::InvalidFlags(0x80)));
    }

    #[test]
    fn test_oversized_payload() {
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let err = Frame::encode_at(FrameFlags::data(true), SeqNumber::new(1), &payload, 0.0)
            .unwrap_err();
        assert!(matches!(err, FrameError::Oversized { .. }));

        let payload = vec![0u8; MAX_PAYLOAD_SIZE];
        assert!(Frame::encode_at(FrameFlags::data(true), SeqNumber::new(1), &payload, 0.0).is_ok());
    }

    #[test]
    fn test_ack_format() {
        let ack = encode_ack(SeqNumber::new(1234));
        assert_eq!(&ack[..], b"ACK:1234");
        assert!(is_ack(&ack));
        assert_eq!(decode_ack(&ack).unwrap(), SeqNumber::new(1234));
    }

    #[test]
    fn test_ack_malformed() {
        assert_eq!(decode_ack(b"ACK:"), Err(FrameError::InvalidAck));
        assert_eq!(decode_ack(b"ACK:12a"), Err(FrameError::InvalidAck));
        assert_eq!(decode_ack(b"ACK:-1"), Err(FrameError::InvalidAck));
        assert_eq!(decode_ack(b"ACK:99999999999"), Err(FrameError::InvalidAck));
    }

    #[test]
    fn test_packet_auto_detect() {
        let packet = Packet::parse(b"ACK:7").unwrap();
        assert_eq!(packet, Packet::Ack(SeqNumber::new(7)));
        assert_eq!(packet.packet_type(), PacketType::Ack);

        let bytes = Frame::encode_at(FrameFlags::data(true), SeqNumber::new(7), b"ACK:", 0.0).unwrap();
        let packet = Packet::parse(&bytes).unwrap();
        assert_eq!(packet.packet_type(), PacketType::Reliable);
    }

    #[test]
    fn test_ack_tag_is_not_a_valid_flag_byte() {
        assert!(FrameFlags::from_bits(ACK_TAG[0]).is_err());
    }
}
