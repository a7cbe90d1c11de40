use tracing_subscriber::EnvFilter;

/// `RUST_LOG` takes precedence; otherwise info for this crate and its deps.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,energy_simulator=info,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
