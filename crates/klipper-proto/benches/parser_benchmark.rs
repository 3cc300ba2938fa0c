use criterion::{black_box, criterion_group, criterion_main, Criterion};
use klipper_proto::dictionary::{build, ConstantValue, DictionaryInput, IdentifiedDescriptor};
use klipper_proto::vlq;

fn benchmark_vlq_decode(c: &mut Criterion) {
    let mut buf = [0u8; vlq::MAX_ENCODED_LEN];
    let n = vlq::encode_i32(123_456_789, &mut buf);
    let encoded = buf[..n].to_vec();

    c.bench_function("vlq_decode_i32", |b| {
        b.iter(|| {
            let _ = vlq::decode_i32(black_box(&encoded)).unwrap();
        })
    });
}

fn benchmark_dictionary_build(c: &mut Criterion) {
    let constants = [
        ("CLOCK_FREQ", ConstantValue::Unsigned(12_000_000)),
        ("ADC_MAX", ConstantValue::Unsigned(4095)),
        ("PWM_MAX", ConstantValue::Unsigned(255)),
    ];
    let commands: Vec<IdentifiedDescriptor> = (0..64)
        .map(|id| IdentifiedDescriptor { id, name: "queue_step", format: "oid=%c interval=%u count=%hu add=%hi" })
        .collect();
    let input = DictionaryInput {
        version: "bench",
        build_versions: "bench",
        constants: &constants,
        commands: &commands,
        responses: &[],
        enumerations: &[],
    };

    c.bench_function("dictionary_build_64_commands", |b| {
        b.iter(|| {
            let _ = build(black_box(&input));
        })
    });
}

criterion_group!(benches, benchmark_vlq_decode, benchmark_dictionary_build);
criterion_main!(benches);
