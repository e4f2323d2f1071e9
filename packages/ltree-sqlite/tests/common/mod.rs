#[ctor::ctor]
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("ltree_sqlite=info".parse().unwrap())
        .add_directive("ltree_core=info".parse().unwrap());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
