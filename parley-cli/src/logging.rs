use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Logs go to stderr so they never interleave
/// with the chat transcript on stdout.
///
/// `RUST_LOG` wins over `verbose` when set.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}
