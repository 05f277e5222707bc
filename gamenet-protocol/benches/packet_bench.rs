use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use gamenet_protocol::packet::{decode_ack, encode_ack, Frame, FrameFlags, Packet};
use gamenet_protocol::reorder::{ReorderBuffer, Released};
use gamenet_protocol::sequence::SeqNumber;
use gamenet_protocol::{EngineConfig, HandlerError, JitterEstimator, PayloadKind};

fn bench_frame_encode(c: &mut Criterion) {
    let payload = vec![0u8; 1200]; // Typical game state update
    let mut group = c.benchmark_group("frame");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("encode", |b| {
        b.iter(|| {
            let frame = Frame::encode_at(
                FrameFlags::data(true),
                SeqNumber::new(1000),
                black_box(&payload),
                1_700_000_000.0,
            )
            .unwrap();
            black_box(frame);
        });
    });

    let bytes = Frame::encode_at(FrameFlags::data(true), SeqNumber::new(1000), &payload, 1_700_000_000.0)
        .unwrap()
        .freeze();

    group.bench_function("decode", |b| {
        b.iter(|| {
            let frame = Frame::decode(black_box(&bytes)).unwrap();
            black_box(frame);
        });
    });

    group.bench_function("parse", |b| {
        b.iter(|| {
            let packet = Packet::parse(black_box(&bytes)).unwrap();
            black_box(packet);
        });
    });

    group.finish();
}

fn bench_ack(c: &mut Criterion) {
    let mut group = c.benchmark_group("ack");

    group.bench_function("encode", |b| {
        b.iter(|| {
            let ack = encode_ack(black_box(SeqNumber::new(123_456)));
            black_box(ack);
        });
    });

    let ack = encode_ack(SeqNumber::new(123_456));
    group.bench_function("decode", |b| {
        b.iter(|| {
            let seq = decode_ack(black_box(&ack)).unwrap();
            black_box(seq);
        });
    });

    group.finish();
}

fn bench_jitter_update(c: &mut Criterion) {
    c.bench_function("jitter_update", |b| {
        let mut est = JitterEstimator::new();
        let mut t = 0.0;
        b.iter(|| {
            t += 0.02;
            black_box(est.update(black_box(t), black_box(t + 0.005)));
        });
    });
}

fn bench_reorder_window(c: &mut Criterion) {
    let config = EngineConfig::default();
    let payload = Bytes::from(vec![0u8; 64]);

    c.bench_function("reorder_reversed_window_64", |b| {
        b.iter(|| {
            let mut buffer = ReorderBuffer::new(&config);
            let mut sink = |r: Released| -> Result<(), HandlerError> {
                black_box(r);
                Ok(())
            };
            for seq in (1..=64u32).rev() {
                buffer.insert(
                    SeqNumber::new(seq),
                    PayloadKind::ApplicationData,
                    0.0,
                    payload.clone(),
                    0.01,
                    0.01,
                    &mut sink,
                );
            }
            black_box(buffer.last_delivered());
        });
    });
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_ack,
    bench_jitter_update,
    bench_reorder_window
);
criterion_main!(benches);
