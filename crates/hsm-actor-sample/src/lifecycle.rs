//! Logging setup for the demo binary and tests.

/// Initializes structured logging with environment-based filtering.
///
/// Set `RUST_LOG` to control verbosity:
/// - `RUST_LOG=info` shows agent lifecycle and state transitions
/// - `RUST_LOG=debug` adds per-call dispatch and timer activity
/// - `RUST_LOG=hsm_actor=trace` traces mailbox workers
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();
}
