//! Store-agnostic conformance scenarios.
//!
//! Every scenario takes a fresh, empty store and panics on the first mismatch, so a backend's
//! test file is one short `#[test]` per scenario.

use ltree_core::{
    Comparison, Error, Lookup, Lquery, Ltxtquery, OnDelete, Path, PathStore, PathTransaction,
    PathTree, Position, Predicate, PrefixRewrite, Projected, Projection, Row, TransactionalStore,
    TreeConfig, TreeSpec,
};

pub fn p(text: &str) -> Path {
    Path::parse(text).unwrap_or_else(|e| panic!("bad test path {text:?}: {e}"))
}

pub fn seed<S: TransactionalStore>(store: &mut S, paths: &[&str]) {
    let mut tx = store.begin().expect("begin seed transaction");
    for path in paths {
        tx.insert(&p(path)).expect("seed insert");
    }
    tx.commit().expect("commit seed");
}

/// Every stored path, in store order.
pub fn paths<S: PathStore>(store: &mut S) -> Vec<String> {
    texts(store.fetch_matching(&Predicate::And(vec![])).expect("fetch all"))
}

fn texts(rows: Vec<Row>) -> Vec<String> {
    rows.into_iter().map(|row| row.path.to_string()).collect()
}

fn query<S: TransactionalStore>(tree: &mut PathTree<S>, lookup: Lookup) -> Vec<String> {
    texts(tree.query(&lookup).expect("query"))
}

const CATALOG: &[&str] = &[
    "Top",
    "Top.Science",
    "Top.Science.Astronomy",
    "Top.Science.Astronomy.Astrophysics",
    "Top.Science.Astronomy.Cosmology",
    "Top.Hobbies",
    "Top.Hobbies.Amateurs_Astronomy",
    "Top.Collections",
    "Top.Collections.Pictures",
    "Top.Collections.Pictures.Astronomy",
    "Top.Collections.Pictures.Astronomy.Stars",
    "Top.Collections.Pictures.Astronomy.Galaxies",
    "Top.Collections.Pictures.Astronomy.Astronauts",
];

pub fn relationship_queries<S: TransactionalStore>(mut store: S) {
    seed(
        &mut store,
        &["Top", "Top.Science", "Top.Science.Astronomy", "Top.Hobbies", "Topic"],
    );
    let mut tree = PathTree::new(store);

    assert_eq!(
        query(&mut tree, Lookup::DescendantOf(p("Top"))),
        ["Top.Hobbies", "Top.Science", "Top.Science.Astronomy"]
    );
    assert_eq!(
        query(&mut tree, Lookup::AncestorOf(p("Top.Science.Astronomy"))),
        ["Top", "Top.Science"]
    );
    assert_eq!(
        query(&mut tree, Lookup::ContainedBy(vec![p("Top.Science")])),
        ["Top.Science", "Top.Science.Astronomy"]
    );
    assert_eq!(
        query(&mut tree, Lookup::Contains(vec![p("Top.Science"), p("Topic")])),
        ["Top", "Top.Science", "Topic"]
    );
    assert_eq!(
        query(&mut tree, Lookup::ChildOf(p("Top"))),
        ["Top.Hobbies", "Top.Science"]
    );
    assert_eq!(
        query(&mut tree, Lookup::ParentOf(p("Top.Science.Astronomy"))),
        ["Top.Science"]
    );
    assert!(query(&mut tree, Lookup::ParentOf(p("Top"))).is_empty());
    assert_eq!(
        query(&mut tree, Lookup::SiblingOf(p("Top.Science"))),
        ["Top.Hobbies", "Top.Science"]
    );
    assert_eq!(
        query(&mut tree, Lookup::SiblingOf(p("Top"))),
        ["Top", "Topic"]
    );
    assert_eq!(
        query(&mut tree, Lookup::from_name("depth__gte", "2").expect("lookup")),
        ["Top.Hobbies", "Top.Science", "Top.Science.Astronomy"]
    );
    assert_eq!(query(&mut tree, Lookup::Exact(p("Topic"))), ["Topic"]);
    assert!(query(&mut tree, Lookup::Contains(vec![])).is_empty());
}

pub fn pattern_queries<S: TransactionalStore>(mut store: S) {
    seed(&mut store, CATALOG);
    let mut tree = PathTree::new(store);
    let lquery = |text: &str| Lquery::parse(text).expect("lquery");
    let ltxtquery = |text: &str| Ltxtquery::parse(text).expect("ltxtquery");

    assert_eq!(
        query(&mut tree, Lookup::Matches(lquery("*.Astronomy.*"))),
        [
            "Top.Collections.Pictures.Astronomy",
            "Top.Collections.Pictures.Astronomy.Astronauts",
            "Top.Collections.Pictures.Astronomy.Galaxies",
            "Top.Collections.Pictures.Astronomy.Stars",
            "Top.Science.Astronomy",
            "Top.Science.Astronomy.Astrophysics",
            "Top.Science.Astronomy.Cosmology",
        ]
    );
    assert_eq!(
        query(&mut tree, Lookup::Matches(lquery("*.!pictures@.Astronomy.*"))),
        [
            "Top.Science.Astronomy",
            "Top.Science.Astronomy.Astrophysics",
            "Top.Science.Astronomy.Cosmology",
        ]
    );
    assert_eq!(
        query(&mut tree, Lookup::Matches(lquery("Top.*{0,2}.Astronomy"))),
        ["Top.Collections.Pictures.Astronomy", "Top.Science.Astronomy"]
    );
    assert_eq!(
        query(&mut tree, Lookup::Search(ltxtquery("Astro*% & !pictures@"))),
        [
            "Top.Hobbies.Amateurs_Astronomy",
            "Top.Science.Astronomy",
            "Top.Science.Astronomy.Astrophysics",
            "Top.Science.Astronomy.Cosmology",
        ]
    );
    assert_eq!(
        query(&mut tree, Lookup::Search(ltxtquery("Astro* & !pictures@"))),
        [
            "Top.Science.Astronomy",
            "Top.Science.Astronomy.Astrophysics",
            "Top.Science.Astronomy.Cosmology",
        ]
    );
}

pub fn first_child_without_rewrite<S: TransactionalStore>(mut store: S) {
    seed(&mut store, &["Top", "Top.Science", "Top.Hobbies"]);
    let mut tree = PathTree::new(store);
    let before = tree.query(&Lookup::ChildOf(p("Top"))).expect("children");

    let row = tree
        .insert(&Position::FirstChildOf(p("Top")))
        .expect("insert first child");
    assert_eq!(row.path.parent().expect("parent"), p("Top"));

    let after = tree.query(&Lookup::ChildOf(p("Top"))).expect("children");
    assert_eq!(after.len(), 3);
    assert_eq!(after[0], row);
    assert_eq!(&after[1..], &before[..]);
}

pub fn sibling_order<S: TransactionalStore>(store: S) {
    let mut tree = PathTree::new(store);
    let a = tree.insert(&Position::Root).expect("root a");
    let b = tree.insert(&Position::Root).expect("root b");
    let c = tree
        .insert(&Position::LeftSiblingOf(b.path.clone()))
        .expect("left of b");
    let d = tree
        .insert(&Position::RightSiblingOf(b.path.clone()))
        .expect("right of b");
    let roots = tree.query(&Lookup::Depth(Comparison::Eq, 1)).expect("roots");
    let ids: Vec<_> = roots.iter().map(|row| row.id).collect();
    assert_eq!(ids, [a.id, c.id, b.id, d.id]);

    let kids = tree
        .insert_many(&Position::LastChildOf(a.path.clone()), 3)
        .expect("insert many");
    assert!(kids.windows(2).all(|w| w[0].path < w[1].path));
    assert!(kids.iter().all(|k| k.path.parent().ok() == Some(a.path.clone())));
}

pub fn move_preserves_subtree<S: TransactionalStore>(mut store: S) {
    seed(
        &mut store,
        &[
            "Top",
            "Top.Science",
            "Top.Science.Astronomy",
            "Top.Science.Astronomy.Stars",
            "Top.Hobbies",
            "Top.Sciences",
        ],
    );
    let mut tree = PathTree::new(store);
    let subtree = tree
        .query(&Lookup::ContainedBy(vec![p("Top.Science")]))
        .expect("subtree");

    let new_path = tree
        .move_node(&p("Top.Science"), &Position::LastChildOf(p("Top.Hobbies")))
        .expect("move");
    assert_eq!(new_path.parent().expect("parent"), p("Top.Hobbies"));

    let moved = tree
        .query(&Lookup::ContainedBy(vec![new_path.clone()]))
        .expect("moved subtree");
    assert_eq!(moved.len(), subtree.len());
    for old in &subtree {
        let row = moved
            .iter()
            .find(|row| row.id == old.id)
            .unwrap_or_else(|| panic!("row {} lost in move", old.id));
        let suffix = old.path.slice(2, old.path.depth());
        assert_eq!(row.path, new_path.concat(&suffix).expect("concat"));
    }
    assert!(query(&mut tree, Lookup::ContainedBy(vec![p("Top.Science")])).is_empty());
    assert_eq!(query(&mut tree, Lookup::Exact(p("Top.Sciences"))), ["Top.Sciences"]);

    for position in [
        Position::LastChildOf(new_path.clone()),
        Position::FirstChildOf(new_path.concat(&p("Astronomy")).expect("concat")),
    ] {
        let err = tree.move_node(&p("Top.Hobbies"), &position).expect_err("cycle");
        assert!(matches!(err, Error::PositionConflict(_)), "{err}");
    }
}

pub fn planned_insert_conflict<S: TransactionalStore>(mut store: S) {
    seed(&mut store, &["X"]);
    let mut tree = PathTree::new(store);
    let position = Position::LastChildOf(p("X"));
    let first = tree.plan(&position, None, 1).expect("plan");
    let second = tree.plan(&position, None, 1).expect("plan");

    tree.insert_planned(&first).expect("first planned insert");
    let err = tree.insert_planned(&second).expect_err("stale plan");
    assert!(matches!(err, Error::ConcurrentModification(_)), "{err}");
    assert!(err.is_retryable());
    assert_eq!(query(&mut tree, Lookup::ChildOf(p("X"))).len(), 1);

    let fresh = tree.plan(&position, None, 1).expect("replan");
    tree.insert_planned(&fresh).expect("replanned insert");
    assert_eq!(query(&mut tree, Lookup::ChildOf(p("X"))).len(), 2);
}

pub fn renumber_on_exhaustion<S: TransactionalStore>(mut store: S) {
    seed(&mut store, &["r", "r_sibling"]);
    let config = TreeConfig {
        label_width: 1,
        gap: 1,
    };
    let mut tree = PathTree::with_config(store, &config).expect("tree");
    let mut ids = vec![tree.insert(&Position::LastChildOf(p("r"))).expect("first").id];
    for _ in 0..40 {
        let row = tree
            .insert(&Position::FirstChildOf(p("r")))
            .expect("prepend");
        ids.insert(0, row.id);
    }
    let order: Vec<_> = tree
        .query(&Lookup::ChildOf(p("r")))
        .expect("children")
        .iter()
        .map(|row| row.id)
        .collect();
    assert_eq!(order, ids);
    assert_eq!(query(&mut tree, Lookup::Exact(p("r_sibling"))), ["r_sibling"]);
}

pub fn delete_policies<S: TransactionalStore>(mut store: S) {
    seed(&mut store, &["a", "a.b", "a.b.c", "ab"]);
    let mut tree = PathTree::new(store);
    assert!(matches!(
        tree.delete(&p("a"), OnDelete::Protect),
        Err(Error::HasDescendants(_))
    ));
    assert_eq!(tree.delete(&p("a.b.c"), OnDelete::Protect).expect("leaf"), 1);
    assert_eq!(tree.delete(&p("a"), OnDelete::Cascade).expect("cascade"), 2);
    assert_eq!(paths(tree.store_mut()), ["ab"]);
    assert!(matches!(
        tree.delete(&p("a"), OnDelete::Cascade),
        Err(Error::TargetNotFound(_))
    ));
}

pub fn rollback_on_drop<S: TransactionalStore>(mut store: S) {
    seed(&mut store, &["a", "a.b"]);
    {
        let mut tx = store.begin().expect("begin");
        tx.insert(&p("c")).expect("insert");
        tx.update_paths(&[PrefixRewrite::new(p("a"), p("z"))])
            .expect("rewrite");
        assert_eq!(paths(&mut tx), ["c", "z", "z.b"]);
    }
    assert_eq!(paths(&mut store), ["a", "a.b"]);
}

pub fn duplicate_insert_conflicts<S: TransactionalStore>(mut store: S) {
    seed(&mut store, &["a"]);
    let mut tx = store.begin().expect("begin");
    let err = tx.insert(&p("a")).expect_err("duplicate");
    assert!(matches!(err, Error::ConcurrentModification(_)), "{err}");
}

pub fn batch_rewrites<S: TransactionalStore>(mut store: S) {
    seed(&mut store, &["p", "p.a", "p.a.k", "p.b", "p.c"]);
    let mut tx = store.begin().expect("begin");
    let changed = tx
        .update_paths(&[
            PrefixRewrite::new(p("p.a"), p("p.b")),
            PrefixRewrite::new(p("p.b"), p("p.a")),
        ])
        .expect("swap");
    assert_eq!(changed, 3);
    let err = tx
        .update_paths(&[PrefixRewrite::new(p("p.a"), p("p.c"))])
        .expect_err("collision");
    assert!(matches!(err, Error::ConcurrentModification(_)), "{err}");
    drop(tx);

    let mut tx = store.begin().expect("begin");
    tx.update_paths(&[
        PrefixRewrite::new(p("p"), p("q")),
        PrefixRewrite::new(p("p.a"), p("r")),
    ])
    .expect("nested rewrites");
    tx.commit().expect("commit");
    assert_eq!(paths(&mut store), ["q", "q.b", "q.c", "r", "r.k"]);
}

/// A rejected rewrite changes nothing, and the transaction keeps working and can commit.
pub fn failed_rewrite_keeps_transaction_usable<S: TransactionalStore>(mut store: S) {
    seed(&mut store, &["a", "a.x", "b", "c"]);
    let mut tx = store.begin().expect("begin");
    let err = tx
        .update_paths(&[PrefixRewrite::new(p("a"), p("b"))])
        .expect_err("collision");
    assert!(matches!(err, Error::ConcurrentModification(_)), "{err}");
    assert_eq!(paths(&mut tx), ["a", "a.x", "b", "c"]);

    tx.update_paths(&[PrefixRewrite::new(p("a"), p("d"))])
        .expect("rewrite after failure");
    tx.insert(&p("e")).expect("insert after failure");
    tx.commit().expect("commit");
    assert_eq!(paths(&mut store), ["b", "c", "d", "d.x", "e"]);
}

pub fn insert_tree_preorder<S: TransactionalStore>(mut store: S) {
    seed(&mut store, &["root"]);
    let mut tree = PathTree::new(store);
    let rows = tree
        .insert_tree(
            &Position::LastChildOf(p("root")),
            vec![
                TreeSpec::new("a", vec![TreeSpec::leaf("a1"), TreeSpec::leaf("a2")]),
                TreeSpec::leaf("b"),
            ],
        )
        .expect("insert tree");
    let names: Vec<_> = rows.iter().map(|(_, name)| *name).collect();
    assert_eq!(names, ["a", "a1", "a2", "b"]);
    let stored = texts(
        tree.query(&Lookup::DescendantOf(p("root")))
            .expect("descendants"),
    );
    let inserted: Vec<_> = rows.iter().map(|(row, _)| row.path.to_string()).collect();
    assert_eq!(stored, inserted);
}

pub fn projections<S: TransactionalStore>(mut store: S) {
    seed(&mut store, &["Top", "Top.Science", "Top.Science.Astronomy"]);
    let mut tree = PathTree::new(store);
    let project = |tree: &mut PathTree<S>, lookup: Lookup, name: &str| -> Vec<String> {
        tree.project(&lookup, &Projection::from_name(name).expect("projection"))
            .expect("project")
            .into_iter()
            .map(|(_, value)| value.to_string())
            .collect()
    };

    assert_eq!(
        project(&mut tree, Lookup::DescendantOf(p("Top")), "-1"),
        ["Science", "Astronomy"]
    );
    assert_eq!(
        project(&mut tree, Lookup::ContainedBy(vec![p("Top")]), "depth"),
        ["1", "2", "3"]
    );
    assert_eq!(
        project(&mut tree, Lookup::Exact(p("Top.Science.Astronomy")), "1_3"),
        ["Science.Astronomy"]
    );
    let depth = tree
        .project(&Lookup::Exact(p("Top")), &Projection::Depth)
        .expect("project");
    assert_eq!(depth[0].1, Projected::Depth(1));
    assert!(matches!(
        tree.project(&Lookup::Exact(p("Top")), &Projection::Index(1)),
        Err(Error::IndexOutOfRange { .. })
    ));
}
