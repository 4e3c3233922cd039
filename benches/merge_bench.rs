//! Benchmark for the rights merge hot path.
//!
//! The merge runs once per permission-change submission, inside the per-card
//! serialization lock, so its cost is on the critical path of bulk card
//! synchronization.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use gatelink_protocol::Rights;

fn bench_merge(c: &mut Criterion) {
    let pending = Rights::new(0x0000_0105, 0x0000_010F);
    let incoming = Rights::new(0x0000_0002, 0x0000_0006);

    c.bench_function("rights_merge", |b| {
        b.iter(|| black_box(pending).merge(black_box(incoming)))
    });

    c.bench_function("rights_merge_chain_64", |b| {
        b.iter(|| {
            let mut acc = Rights::default();
            for i in 0..64u32 {
                acc = acc.merge(black_box(Rights::grant(1 << (i % 32))));
            }
            acc
        })
    });
}

criterion_group!(benches, bench_merge);
criterion_main!(benches);
