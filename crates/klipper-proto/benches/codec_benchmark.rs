use criterion::{black_box, criterion_group, criterion_main, Criterion};
use klipper_proto::cursor::ScratchWriter;
use klipper_proto::transport::{self, Transport};
use klipper_proto::MESSAGE_LENGTH_MAX;

fn benchmark_encode_frame(c: &mut Criterion) {
    c.bench_function("encode_queue_step_frame", |b| {
        b.iter(|| {
            let mut buf = [0u8; MESSAGE_LENGTH_MAX];
            let mut w = ScratchWriter::new(&mut buf);
            transport::encode_frame(black_box(0x10), &mut w, |w| {
                w.write_u32(0)?; // oid
                w.write_u32(1200)?; // interval
                w.write_u32(1000)?; // count
                w.write_i32(0) // add
            })
            .unwrap();
        })
    });
}

fn benchmark_receive_frame(c: &mut Criterion) {
    let mut buf = [0u8; MESSAGE_LENGTH_MAX];
    let mut w = ScratchWriter::new(&mut buf);
    transport::encode_frame(0x10, &mut w, |w| w.write_u32(42)).unwrap();
    let frame = w.as_slice().to_vec();

    c.bench_function("receive_frame", |b| {
        b.iter(|| {
            let mut t = Transport::new();
            let _ = t.receive(black_box(&frame));
        })
    });
}

criterion_group!(benches, benchmark_encode_frame, benchmark_receive_frame);
criterion_main!(benches);
