//! The conformance scenarios against the in-memory store, which every backend is held to.

use ltree_core::MemoryStore;
use ltree_test_support as scenarios;

macro_rules! memory_scenarios {
    ($($name:ident),* $(,)?) => {
        $(
            #[test]
            fn $name() {
                scenarios::$name(MemoryStore::new());
            }
        )*
    };
}

memory_scenarios!(
    relationship_queries,
    pattern_queries,
    first_child_without_rewrite,
    sibling_order,
    move_preserves_subtree,
    planned_insert_conflict,
    renumber_on_exhaustion,
    delete_policies,
    rollback_on_drop,
    duplicate_insert_conflicts,
    batch_rewrites,
    failed_rewrite_keeps_transaction_usable,
    insert_tree_preorder,
    projections,
);
