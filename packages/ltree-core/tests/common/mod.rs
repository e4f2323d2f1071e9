#![allow(dead_code)]

use ltree_core::{MemoryStore, Path, PathStore, PathTransaction, Predicate, TransactionalStore};
use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("ltree_core=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

pub fn p(text: &str) -> Path {
    Path::parse(text).unwrap()
}

pub fn seeded(paths: &[&str]) -> MemoryStore {
    let mut store = MemoryStore::new();
    let mut tx = store.begin().unwrap();
    for path in paths {
        tx.insert(&p(path)).unwrap();
    }
    tx.commit().unwrap();
    store
}

pub fn all_paths<S: PathStore>(store: &mut S) -> Vec<String> {
    store
        .fetch_matching(&Predicate::And(Vec::new()))
        .unwrap()
        .into_iter()
        .map(|row| row.path.to_string())
        .collect()
}
