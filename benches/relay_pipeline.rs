use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ollama_openai_proxy::stream::{
    decode_line, extract_delta, translate, BackendEvent, LineFramer,
};

fn sample_stream(tokens: usize) -> Vec<u8> {
    let mut raw = String::new();
    for idx in 0..tokens {
        let chunk = serde_json::json!({
            "id": "chatcmpl-bench",
            "object": "chat.completion.chunk",
            "created": 1_727_000_000,
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {"content": format!("tok{idx} ")}, "finish_reason": null}]
        });
        raw.push_str("data: ");
        raw.push_str(&chunk.to_string());
        raw.push_str("\n\n");
    }
    raw.push_str("data: [DONE]\n\n");
    raw.into_bytes()
}

fn relay_bytes(raw: &[u8], chunk_size: usize, model: &Arc<str>) -> usize {
    let mut framer = LineFramer::new();
    let mut written = 0usize;
    for chunk in raw.chunks(chunk_size) {
        for line in framer.feed(chunk) {
            match decode_line(&line) {
                BackendEvent::Data(payload) => {
                    let record = translate(extract_delta(&payload, model), model)
                        .to_ndjson_line()
                        .unwrap();
                    written += record.len();
                }
                BackendEvent::Sentinel => return written,
                BackendEvent::Malformed(_) | BackendEvent::Ignorable => {}
            }
        }
    }
    written
}

fn bench_framing(c: &mut Criterion) {
    let raw = sample_stream(256);
    for chunk_size in [16usize, 512, 16 * 1024] {
        c.bench_function(&format!("framer_256_events_chunk_{chunk_size}"), |b| {
            b.iter(|| {
                let mut framer = LineFramer::new();
                let mut lines = 0usize;
                for chunk in raw.chunks(chunk_size) {
                    lines += framer.feed(black_box(chunk)).len();
                }
                black_box(lines);
            });
        });
    }
}

fn bench_decode(c: &mut Criterion) {
    let line = br#"data: {"id":"chatcmpl-bench","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#;
    c.bench_function("decode_data_line", |b| {
        b.iter(|| black_box(decode_line(black_box(line))));
    });
    c.bench_function("decode_fragment_line", |b| {
        b.iter(|| black_box(decode_line(black_box(b"undefined:1"))));
    });
}

fn bench_relay(c: &mut Criterion) {
    let raw = sample_stream(256);
    let model: Arc<str> = Arc::from("llama3.2:3b");
    for chunk_size in [64usize, 4096] {
        c.bench_function(&format!("relay_256_events_chunk_{chunk_size}"), |b| {
            b.iter(|| black_box(relay_bytes(black_box(&raw), chunk_size, &model)));
        });
    }
}

criterion_group!(benches, bench_framing, bench_decode, bench_relay);
criterion_main!(benches);
