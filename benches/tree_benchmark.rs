//! Performance benchmarks for comment tree building
//!
//! Tests reconciliation and flat rebuilding at different thread sizes.
//! Run with: cargo bench

use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kindling::{from_content, from_flat, CommentColor, ContentNode, FlatComment};

/// Generate a content forest of `roots` threads, each a chain of `depth`
/// replies with `fanout` siblings at every level below the root.
fn generate_nodes(roots: usize, depth: usize, fanout: usize, next_id: &mut u64) -> Vec<ContentNode> {
    (0..roots)
        .map(|_| {
            *next_id += 1;
            let id = *next_id;
            let children = if depth > 0 {
                generate_nodes(fanout, depth - 1, fanout, next_id)
            } else {
                Vec::new()
            };
            ContentNode {
                id,
                author: Some(format!("user{id}")),
                text: Some(format!("comment body for {id}")),
                created_at: Utc.timestamp_opt(1_700_000_000 + id as i64, 0).single().unwrap(),
                deleted: false,
                children,
            }
        })
        .collect()
}

fn collect_ids(nodes: &[ContentNode], out: &mut Vec<u64>) {
    for node in nodes {
        out.push(node.id);
        collect_ids(&node.children, out);
    }
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_content_tree");

    for roots in [10, 50, 200].iter() {
        let mut next_id = 0;
        let nodes = generate_nodes(*roots, 3, 2, &mut next_id);
        let mut order = Vec::new();
        collect_ids(&nodes, &mut order);
        // Worst case for the sort: markup reports the reverse order.
        order.reverse();
        let colors: HashMap<u64, CommentColor> = order
            .iter()
            .step_by(7)
            .map(|&id| (id, CommentColor::C9c))
            .collect();

        group.throughput(Throughput::Elements(order.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_roots", roots)),
            &(nodes, order, colors),
            |b, (nodes, order, colors)| {
                b.iter(|| {
                    let tree = from_content(black_box(nodes), black_box(order), black_box(colors));
                    black_box(tree)
                });
            },
        );
    }

    group.finish();
}

fn bench_flat_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuild_from_flat");

    for count in [100, 1_000, 10_000].iter() {
        let flat: Vec<FlatComment> = (0..*count)
            .map(|i| FlatComment {
                id: i as u64 + 1,
                author: format!("user{i}"),
                body: format!("comment body for {i}"),
                created_at: Utc.timestamp_opt(1_700_000_000 + i as i64, 0).single().unwrap(),
                depth: i % 8,
                color: CommentColor::C00,
            })
            .collect();

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_comments", count)),
            &flat,
            |b, flat| {
                b.iter(|| {
                    let tree = from_flat(black_box(flat.clone()));
                    black_box(tree)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_reconcile, bench_flat_rebuild);
criterion_main!(benches);
