//! Jitter buffer hot-path benchmarks.
//!
//! Workloads:
//! - steady enqueue/dequeue of in-order packets
//! - enqueue across a sequence gap (concealment synthesis)
//! - concealment followed by late real packets (in-place upgrades)
//!
//! Run with: `cargo bench --bench jitter`

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jitterbuf::{channel, Consumer, JitterConfig, Packet, Producer};

const FRAME_SIZE: usize = 1;
const FRAMES_PER_PACKET: usize = 480;

fn make_buffer() -> (Producer, Consumer) {
    channel(JitterConfig {
        element_size: FRAME_SIZE,
        packet_elements: FRAMES_PER_PACKET,
        clock_rate: 48_000,
        max_length: Duration::from_millis(10_000),
        min_length: Duration::ZERO,
    })
    .expect("construction failed")
}

fn bench_enqueue_dequeue(c: &mut Criterion) {
    let (mut producer, mut consumer) = make_buffer();
    let payload = vec![0u8; FRAME_SIZE * FRAMES_PER_PACKET];
    let mut out = vec![0u8; FRAME_SIZE * FRAMES_PER_PACKET];
    let mut sequence_number = 0u64;

    c.bench_function("enqueue_dequeue", |b| {
        b.iter(|| {
            sequence_number += 1;
            let enqueued = producer
                .enqueue(
                    &[Packet {
                        sequence_number,
                        data: black_box(&payload),
                        elements: FRAMES_PER_PACKET,
                    }],
                    |_| unreachable!("in-order packets need no concealment"),
                )
                .unwrap();
            assert_eq!(enqueued, FRAMES_PER_PACKET);
            let dequeued = consumer.dequeue(&mut out, FRAMES_PER_PACKET).unwrap();
            black_box(dequeued);
        });
    });
}

fn bench_concealment(c: &mut Criterion) {
    let mut group = c.benchmark_group("concealment");
    for gap in [2usize, 8, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(gap), &gap, |b, &gap| {
            let (mut producer, mut consumer) = make_buffer();
            let payload = vec![0u8; FRAME_SIZE * FRAMES_PER_PACKET];
            let mut out = vec![0u8; FRAME_SIZE * FRAMES_PER_PACKET];
            let mut sequence_number = 0u64;

            b.iter(|| {
                // Jump the sequence: the buffer synthesizes the gap.
                sequence_number += gap as u64;
                producer
                    .enqueue(
                        &[Packet {
                            sequence_number,
                            data: black_box(&payload),
                            elements: FRAMES_PER_PACKET,
                        }],
                        |slots| {
                            for slot in slots {
                                slot.data.fill(0);
                            }
                        },
                    )
                    .unwrap();
                // Drain to keep the ring in steady state.
                for _ in 0..gap {
                    consumer.dequeue(&mut out, FRAMES_PER_PACKET).unwrap();
                }
            });
        });
    }
    group.finish();
}

fn bench_concealment_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("concealment_update");
    for gap in [2usize, 8, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(gap), &gap, |b, &gap| {
            let (mut producer, mut consumer) = make_buffer();
            let payload = vec![0u8; FRAME_SIZE * FRAMES_PER_PACKET];
            let real = vec![1u8; FRAME_SIZE * FRAMES_PER_PACKET];
            let mut out = vec![0u8; FRAME_SIZE * FRAMES_PER_PACKET];
            let mut sequence_number = 0u64;

            b.iter(|| {
                let start = sequence_number;
                sequence_number += gap as u64;
                producer
                    .enqueue(
                        &[Packet {
                            sequence_number,
                            data: black_box(&payload),
                            elements: FRAMES_PER_PACKET,
                        }],
                        |slots| {
                            for slot in slots {
                                slot.data.fill(0);
                            }
                        },
                    )
                    .unwrap();
                // The missing packets arrive late and upgrade in place.
                for late in start + 1..sequence_number {
                    let updated = producer
                        .enqueue(
                            &[Packet {
                                sequence_number: late,
                                data: black_box(&real),
                                elements: FRAMES_PER_PACKET,
                            }],
                            |_| unreachable!("updates need no concealment"),
                        )
                        .unwrap();
                    black_box(updated);
                }
                for _ in 0..gap {
                    consumer.dequeue(&mut out, FRAMES_PER_PACKET).unwrap();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_enqueue_dequeue,
    bench_concealment,
    bench_concealment_update
);
criterion_main!(benches);
