#[cfg(feature = "serde")]
#[test]
fn paths_serialize_as_dotted_text() {
    use ltree_core::{Path, Placement, Position};

    let path = Path::parse("Top.Science").unwrap();
    let json = serde_json::to_string(&path).expect("serialize Path");
    assert_eq!(json, "\"Top.Science\"");
    let back: Path = serde_json::from_str(&json).expect("deserialize Path");
    assert_eq!(back, path);

    // Invalid labels are rejected on the way in, not coerced.
    assert!(serde_json::from_str::<Path>("\"Top.bad-label\"").is_err());

    let placement = Placement {
        position: Position::FirstChildOf(path.clone()),
        destinations: vec![Path::parse("Top.Science.V0000").unwrap()],
        shifts: Vec::new(),
    };
    let bytes = serde_json::to_vec(&placement).expect("serialize Placement");
    let roundtrip: Placement = serde_json::from_slice(&bytes).expect("deserialize Placement");
    assert_eq!(roundtrip, placement);
}

#[cfg(feature = "serde")]
#[test]
fn configs_fill_in_defaults() {
    use ltree_core::{StoreConfig, TreeConfig};

    let tree: TreeConfig = serde_json::from_str(r#"{"gap": 16}"#).unwrap();
    assert_eq!(tree.gap, 16);
    assert_eq!(tree.label_width, TreeConfig::default().label_width);

    let store: StoreConfig = serde_json::from_str(r#"{"table": "categories"}"#).unwrap();
    assert_eq!(store.table, "categories");
    assert_eq!(store.path_column, "path");
}
