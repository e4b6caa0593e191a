use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::sync::Arc;
use verifier_gateway::core::header::CommandHeader;
use verifier_gateway::device::SimulatedDevice;
use verifier_gateway::protocol::dispatcher::CommandDispatcher;
use verifier_gateway::protocol::message::{build_response, encode_request, IncomingMessage};
use verifier_gateway::protocol::{CommandCode, ErrorCode};

fn bench_header_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("header_codec");
    let header = CommandHeader::new(1, 2, 0x478, 0x356);

    group.bench_function("encode", |b| b.iter(|| black_box(header).encode()));
    group.bench_function("decode", |b| {
        let bytes = header.encode();
        b.iter(|| CommandHeader::decode(black_box(bytes)))
    });

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_parse_and_respond(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_and_respond");
    let payload_sizes = [0usize, 64, 1024, 8000];

    for &size in &payload_sizes {
        let frame = Bytes::from(
            encode_request(1, 0, CommandCode::GetMeasurement, &vec![0xAB; size]).unwrap(),
        );
        group.throughput(Throughput::Bytes(frame.len() as u64));

        group.bench_function(format!("parse_{size}b"), |b| {
            b.iter(|| {
                let msg = IncomingMessage::parse(black_box(frame.clone()));
                assert!(msg.is_ok());
            })
        });

        group.bench_function(format!("respond_{size}b"), |b| {
            let request = CommandHeader::new(1, 0, 0, 0x183);
            let payload = vec![0x7E; size];
            b.iter(|| build_response(&request, black_box(&payload), ErrorCode::None))
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_dispatch(c: &mut Criterion) {
    let dispatcher = CommandDispatcher::new(Arc::new(SimulatedDevice::new()));
    let frame = Bytes::from(encode_request(1, 0, CommandCode::GetChipId, &[]).unwrap());

    c.bench_function("dispatch_chip_id", |b| {
        b.iter_batched(
            || frame.clone(),
            |raw| dispatcher.dispatch(raw),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_header_codec,
    bench_parse_and_respond,
    bench_dispatch
);
criterion_main!(benches);
