use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use recon_query::engine::process;
use recon_query::query::parse;
use recon_query::{ListParams, SortKey, SortOrder};
use serde_json::{json, Value};

fn sample_records(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            json!({
                "_id": format!("{i:024x}"),
                "ipv4": format!("10.{}.{}.{}", i / 65536 % 256, i / 256 % 256, i % 256),
                "domain": format!("host{i}.example.com"),
                "nmap": {"ports": [{"port": 22}, {"port": 80 + (i % 50) as i64}]},
                "httpx": [{"hosts": [{"ports": [{"port": 8000 + (i % 1000) as i64}]}]}]
            })
        })
        .collect()
}

fn bench_list(c: &mut Criterion) {
    let records = sample_records(20_000);
    let parsed = parse("port>=8500 AND port!=8999");
    let params = ListParams { sort_key: SortKey::Ports, sort_order: SortOrder::Desc, ..ListParams::default() };
    let mut group = c.benchmark_group("list");
    group.throughput(Throughput::Elements(records.len() as u64));
    group.bench_function("process_20k", |b| {
        b.iter(|| process(records.clone(), &parsed, &params).pagination.total_records)
    });
    group.finish();
}

criterion_group!(benches, bench_list);
criterion_main!(benches);
