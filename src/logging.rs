use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. Output goes to stderr: stdout carries the
/// IPC protocol and must stay clean.
///
/// The filter comes from `SCORINGD_LOG`, then `RUST_LOG`, then `info`.
pub fn init() {
    let filter = EnvFilter::try_from_env("SCORINGD_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(false)
        .try_init();
}

#[cfg(test)]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
