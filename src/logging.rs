use tracing_subscriber::EnvFilter;

/// `ISUM_LOG` wins over `RUST_LOG`; stdout stays reserved for command reports.
pub fn init() {
    let filter = std::env::var("ISUM_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
