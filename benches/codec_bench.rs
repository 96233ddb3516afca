use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use http::Method;
use turbonet::bridge::codec::{decode_frame, encode_frame};
use turbonet::bridge::message::{HttpVersion, RequestDescriptor};
use turbonet::http::orderedheaders::OrderedHeaderMap;

fn descriptor() -> RequestDescriptor {
    let mut headers = OrderedHeaderMap::new();
    headers.insert("Host", "example.com").unwrap();
    headers.insert(
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36",
    ).unwrap();
    headers.insert("Accept", "*/*").unwrap();
    headers.insert("Content-Type", "application/json").unwrap();
    headers.insert("Content-Length", "27").unwrap();

    RequestDescriptor {
        method: Method::POST,
        endpoint: "/api/v1/items?page=2".to_string(),
        headers,
        body: Some(r#"{"name":"widget","qty":42}"#.to_string()),
        version: HttpVersion::Http11,
    }
}

fn benchmark_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_codec");
    for size in [64usize, 4 * 1024, 256 * 1024] {
        let payload = vec![b'x'; size];
        let frame = encode_frame(&payload).unwrap();

        group.bench_with_input(BenchmarkId::new("encode", size), &payload, |b, p| {
            b.iter(|| encode_frame(black_box(p)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &frame, |b, f| {
            b.iter(|| decode_frame(black_box(f)).unwrap().len())
        });
    }
    group.finish();
}

fn benchmark_request_frame(c: &mut Criterion) {
    let descriptor = descriptor();

    // Per-request overhead on the send path.
    c.bench_function("request_to_frame", |b| {
        b.iter(|| {
            black_box(&descriptor)
                .to_message("req-1")
                .to_frame()
                .unwrap()
        })
    });
}

criterion_group!(benches, benchmark_frame_codec, benchmark_request_frame);
criterion_main!(benches);
