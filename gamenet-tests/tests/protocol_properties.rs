//! Property-based tests for GameNet framing and in-order delivery
//!
//! These tests use proptest to generate random frames and arrival orders and
//! check the invariants the receive path relies on.

use bytes::Bytes;
use gamenet_protocol::packet::{decode_ack, encode_ack};
use gamenet_protocol::{
    EngineConfig, Frame, FrameFlags, HandlerError, InsertOutcome, Packet, PacketType, PayloadKind,
    ReorderBuffer, Released, SeqNumber,
};
use proptest::prelude::*;

// Property test strategies

fn flags_strategy() -> impl Strategy<Value = FrameFlags> {
    prop_oneof![
        Just(FrameFlags::data(true)),
        Just(FrameFlags::data(false)),
        Just(FrameFlags::summary()),
    ]
}

fn small_payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=256)
}

/// Sequence numbers 1..=n in random arrival order
fn arrival_order_strategy() -> impl Strategy<Value = Vec<u32>> {
    (1u32..=64).prop_flat_map(|n| Just((1..=n).collect::<Vec<_>>()).prop_shuffle())
}

/// Arrival order plus, per sequence number, whether it is lost
fn lossy_arrival_strategy() -> impl Strategy<Value = (Vec<u32>, Vec<bool>)> {
    arrival_order_strategy().prop_flat_map(|order| {
        let n = order.len();
        (Just(order), prop::collection::vec(prop::bool::weighted(0.2), n))
    })
}

fn insert(buffer: &mut ReorderBuffer, seq: u32, now: f64, out: &mut Vec<u32>) -> InsertOutcome {
    let mut sink = |r: Released| -> Result<(), HandlerError> {
        out.push(r.seq.as_raw());
        Ok(())
    };
    buffer.insert(
        SeqNumber::new(seq),
        PayloadKind::ApplicationData,
        0.0,
        Bytes::copy_from_slice(&seq.to_be_bytes()),
        now,
        now,
        &mut sink,
    )
}

// Property tests

proptest! {
    #[test]
    fn prop_frame_roundtrip(
        flags in flags_strategy(),
        seq in any::<u32>(),
        sender_ts in 0.0f64..4.0e9,
        payload in small_payload_strategy(),
    ) {
        let encoded = Frame::encode_at(flags, SeqNumber::new(seq), &payload, sender_ts).unwrap();
        let frame = Frame::decode(&encoded).unwrap();

        prop_assert_eq!(frame.header.flags, flags);
        prop_assert_eq!(frame.seq().as_raw(), seq);
        prop_assert_eq!(frame.sender_ts(), sender_ts);
        prop_assert_eq!(&frame.payload[..], &payload[..]);
        prop_assert_eq!(frame.size(), encoded.len());
    }

    #[test]
    fn prop_packet_type_follows_flags(
        reliable in any::<bool>(),
        seq in 1u32..=u32::MAX,
        payload in small_payload_strategy(),
    ) {
        let encoded = Frame::encode_at(FrameFlags::data(reliable), SeqNumber::new(seq), &payload, 1.0).unwrap();
        let expected = if reliable { PacketType::Reliable } else { PacketType::Unreliable };
        prop_assert_eq!(Packet::parse(&encoded).unwrap().packet_type(), expected);
    }

    #[test]
    fn prop_ack_roundtrip(seq in any::<u32>()) {
        let ack = encode_ack(SeqNumber::new(seq));
        prop_assert_eq!(decode_ack(&ack).unwrap(), SeqNumber::new(seq));
        prop_assert!(Packet::parse(&ack).unwrap().is_ack());
    }

    #[test]
    fn prop_ack_rejects_non_digits(suffix in "[0-9]{0,4}[a-z:+-][0-9a-z]{0,4}") {
        let ack = format!("ACK:{}", suffix);
        prop_assert!(decode_ack(ack.as_bytes()).is_err());
    }

    #[test]
    fn prop_parse_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = Packet::parse(&bytes);
    }

    #[test]
    fn prop_reorder_delivers_each_seq_once_in_order(order in arrival_order_strategy()) {
        let mut buffer = ReorderBuffer::new(&EngineConfig::default());
        let mut delivered = Vec::new();
        let mut watermark = buffer.last_delivered();

        for &seq in &order {
            insert(&mut buffer, seq, 0.0, &mut delivered);
            prop_assert!(buffer.last_delivered() >= watermark);
            watermark = buffer.last_delivered();
        }

        let expected: Vec<u32> = (1..=order.len() as u32).collect();
        prop_assert_eq!(delivered, expected);
        prop_assert_eq!(buffer.pending_len(), 0);
        prop_assert_eq!(buffer.stats().skipped, 0);
    }

    #[test]
    fn prop_reorder_duplicates_are_dropped(order in arrival_order_strategy()) {
        let mut buffer = ReorderBuffer::new(&EngineConfig::default());
        let mut delivered = Vec::new();

        for &seq in order.iter().chain(order.iter()) {
            insert(&mut buffer, seq, 0.0, &mut delivered);
        }

        prop_assert_eq!(delivered.len(), order.len());
        prop_assert_eq!(buffer.stats().stale, order.len() as u64);
    }

    #[test]
    fn prop_reorder_skips_lost_frames_after_lifetime((order, lost) in lossy_arrival_strategy()) {
        let mut buffer = ReorderBuffer::new(&EngineConfig::default());
        let mut delivered = Vec::new();

        for &seq in &order {
            if !lost[seq as usize - 1] {
                insert(&mut buffer, seq, 0.0, &mut delivered);
            }
        }

        // Every gap has now waited longer than the 200 ms lifetime
        let mut sink = |r: Released| -> Result<(), HandlerError> {
            delivered.push(r.seq.as_raw());
            Ok(())
        };
        buffer.poll(1.0, &mut sink);

        let expected: Vec<u32> = (1..=order.len() as u32)
            .filter(|seq| !lost[*seq as usize - 1])
            .collect();
        prop_assert_eq!(&delivered, &expected);
        prop_assert_eq!(buffer.pending_len(), 0);

        for range in buffer.skipped() {
            for seq in range.start.as_raw()..=range.end.as_raw() {
                prop_assert!(lost[seq as usize - 1]);
            }
        }
    }
}
