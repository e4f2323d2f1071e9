use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use ltree_core::{Lquery, Ltxtquery, MemoryStore, Path, PathTree, Position};

fn deep_path(depth: usize) -> Path {
    Path::from_labels((0..depth).map(|i| format!("n{i}"))).unwrap()
}

fn bench_patterns(c: &mut Criterion) {
    let path = deep_path(64);
    let lquery = Lquery::parse("*.n10.*.n4*.*{2,}.n63").unwrap();
    let ltxtquery = Ltxtquery::parse("n1 & (n2 | x) & !y").unwrap();

    c.bench_function("lquery_match_depth_64", |b| {
        b.iter(|| black_box(lquery.matches(black_box(&path))))
    });
    c.bench_function("ltxtquery_eval_depth_64", |b| {
        b.iter(|| black_box(ltxtquery.evaluate(black_box(&path))))
    });
    c.bench_function("path_parse_depth_64", |b| {
        let text = path.to_string();
        b.iter(|| black_box(Path::parse(black_box(&text)).unwrap()))
    });
}

fn bench_inserts(c: &mut Criterion) {
    c.bench_function("append_100_roots", |b| {
        b.iter_batched(
            || PathTree::new(MemoryStore::new()),
            |mut tree| {
                for _ in 0..100 {
                    tree.insert(&Position::Root).unwrap();
                }
                tree
            },
            BatchSize::SmallInput,
        )
    });
    c.bench_function("prepend_100_children", |b| {
        b.iter_batched(
            || {
                let mut tree = PathTree::new(MemoryStore::new());
                let root = tree.insert(&Position::Root).unwrap();
                (tree, root.path)
            },
            |(mut tree, root)| {
                for _ in 0..100 {
                    tree.insert(&Position::FirstChildOf(root.clone())).unwrap();
                }
                tree
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_patterns, bench_inserts);
criterion_main!(benches);
