use bytes::Bytes;
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use docwire::protocol::{BufferHeader, Frame, Message, MessageType, Receiver};
use serde_json::json;

fn message_with_buffers(count: usize, size: usize) -> Message {
    let mut message = Message::create(MessageType::PatchDoc, json!({"events": [], "references": []}), json!({}));
    for i in 0..count {
        message.add_buffer(BufferHeader::new(i.to_string()), Bytes::from(vec![0u8; size]));
    }
    message
}

fn bench_send(c: &mut Criterion) {
    let mut group = c.benchmark_group("message");

    // JSON fragments only
    let small = message_with_buffers(0, 0);
    group.bench_function("send_no_buffers", |b| {
        b.iter(|| {
            let mut frames: Vec<Frame> = Vec::with_capacity(3);
            black_box(small.send(&mut frames).unwrap());
        });
    });

    // Four 64 KB buffers
    let large = message_with_buffers(4, 64 * 1024);
    group.throughput(Throughput::Bytes(4 * 64 * 1024));
    group.bench_function("send_4x64kb", |b| {
        b.iter(|| {
            let mut frames: Vec<Frame> = Vec::with_capacity(11);
            black_box(large.send(&mut frames).unwrap());
        });
    });

    group.finish();
}

fn bench_consume(c: &mut Criterion) {
    let mut group = c.benchmark_group("receiver");

    for (name, count, size) in [("consume_no_buffers", 0, 0), ("consume_4x64kb", 4, 64 * 1024)] {
        let mut frames: Vec<Frame> = Vec::new();
        message_with_buffers(count, size).send(&mut frames).unwrap();
        if size > 0 {
            group.throughput(Throughput::Bytes((count * size) as u64));
        }

        group.bench_function(name, |b| {
            b.iter(|| {
                let mut receiver = Receiver::new();
                let mut out = None;
                for frame in &frames {
                    out = receiver.consume(frame.clone()).unwrap();
                }
                black_box(out.unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_send, bench_consume);
criterion_main!(benches);
