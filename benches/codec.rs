#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use crosswire::{ByteBuffer, Crosswire, StructSchema, StructValue, TypeRegistry, TypeSpec, Value};
use std::hint::black_box;
use std::rc::Rc;
use std::sync::Arc;

// --- SETUP ---

fn item_schema(registry: &TypeRegistry) -> Arc<StructSchema> {
    registry
        .register_struct_by_name(
            StructSchema::new("bench", "Item")
                .field("id", TypeSpec::VarInt64)
                .field("name", TypeSpec::String)
                .field("payload", TypeSpec::List(Box::new(TypeSpec::Int64))),
        )
        .expect("registration")
}

fn generate_items(schema: &Arc<StructSchema>, count: usize) -> Value {
    let items = (0..count)
        .map(|i| {
            let mut item = StructValue::new(schema.clone());
            item.set("id", Value::Int64(i as i64)).expect("field");
            item.set("name", Value::str(format!("item-{i}"))).expect("field");
            item.set("payload", Value::Int64Array(Rc::new(vec![i as i64; 128])))
                .expect("field");
            Value::struct_value(item)
        })
        .collect();
    Value::list(items)
}

// --- BENCHMARKS ---

fn bench_varints(c: &mut Criterion) {
    let values: Vec<u32> = (0..4096u32).map(|i| i.wrapping_mul(2_654_435_761)).collect();

    let mut group = c.benchmark_group("Varint");
    group.throughput(Throughput::Elements(values.len() as u64));

    group.bench_function("write_varuint32", |b| {
        b.iter(|| {
            let mut buf = ByteBuffer::with_capacity(values.len() * 5);
            for &v in &values {
                buf.write_varuint32(black_box(v));
            }
            buf
        })
    });

    let mut encoded = ByteBuffer::with_capacity(values.len() * 5);
    for &v in &values {
        encoded.write_varuint32(v);
    }
    group.bench_function("read_varuint32", |b| {
        b.iter(|| {
            let mut buf = ByteBuffer::from_vec(encoded.as_slice().to_vec());
            for _ in 0..values.len() {
                black_box(buf.read_varuint32().expect("varint"));
            }
        })
    });

    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let item_count = 1_000;
    let registry = Arc::new(TypeRegistry::new());
    let schema = item_schema(&registry);
    let data = generate_items(&schema, item_count);

    let mut codec = Crosswire::builder().with_registry(registry.clone());
    let encoded = codec.to_bytes(&data).expect("serialize");
    println!("Roundtrip payload: {} items, {} bytes", item_count, encoded.len());

    let mut group = c.benchmark_group("Codec Roundtrip");
    group.throughput(Throughput::Bytes(encoded.len() as u64));

    group.bench_function("serialize_structs", |b| {
        let mut codec = Crosswire::builder().with_registry(registry.clone());
        b.iter(|| {
            let mut buffer = ByteBuffer::with_capacity(encoded.len());
            codec
                .serialize(&mut buffer, black_box(&data))
                .expect("serialize");
            buffer
        })
    });

    group.bench_function("deserialize_structs", |b| {
        let mut codec = Crosswire::builder().with_registry(registry.clone());
        b.iter(|| {
            codec.from_bytes(black_box(&encoded)).expect("deserialize")
        })
    });

    group.finish();
}

fn bench_shared_graph(c: &mut Criterion) {
    // One shared string referenced from every slot: measures the identity
    // map and back-reference path.
    let shared = Value::str("shared-fragment");
    let list = Value::list((0..10_000).map(|_| shared.clone()).collect());

    let mut codec = Crosswire::default();
    let encoded = codec.to_bytes(&list).expect("serialize");

    let mut group = c.benchmark_group("Shared Graph");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("serialize_backrefs", |b| {
        b.iter(|| {
            let mut buffer = ByteBuffer::with_capacity(encoded.len());
            codec
                .serialize(&mut buffer, black_box(&list))
                .expect("serialize");
            buffer
        })
    });
    group.finish();
}

criterion_group!(benches, bench_varints, bench_roundtrip, bench_shared_graph);
criterion_main!(benches);
