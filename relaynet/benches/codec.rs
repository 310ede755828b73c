use criterion::{black_box, criterion_group, criterion_main, Criterion};

use relaynet::codec::builtin::{registry_with_builtins, ConnectRequest, PROTOCOL_VERSION};
use relaynet::codec::{downcast, encode_message};
use relaynet::cursor::ByteCursor;

fn encode_connect_request(c: &mut Criterion) {
    let message = ConnectRequest { protocol: PROTOCOL_VERSION };
    c.bench_function("encode ConnectRequest", |b| {
        b.iter(|| black_box(encode_message(&message).unwrap()));
    });
}

fn decode_connect_request(c: &mut Criterion) {
    let registry = registry_with_builtins();
    let bytes = encode_message(&ConnectRequest { protocol: PROTOCOL_VERSION }).unwrap();

    c.bench_function("decode ConnectRequest", |b| {
        b.iter(|| {
            let mut cursor = ByteCursor::new(bytes.clone());
            let type_id = cursor.read_u8().unwrap();
            let decoded = registry.decode(type_id, &mut cursor).unwrap();
            black_box(downcast::<ConnectRequest>(decoded.as_ref()).unwrap());
        });
    });
}

criterion_group!(benches, encode_connect_request, decode_connect_request);
criterion_main!(benches);
