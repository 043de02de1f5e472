use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize logging to stderr, keeping stdout free for command output.
///
/// Respects `RUST_LOG`; when unset, debug builds log this workspace at debug
/// level and release builds log at info.
pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_err() {
        // Safety: single-threaded at startup
        unsafe {
            if cfg!(debug_assertions) {
                std::env::set_var("RUST_LOG", "info,svampkarta=debug,svampkarta_lib=debug");
            } else {
                std::env::set_var("RUST_LOG", "info");
            }
        }
    }

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(fmt_layer).init();

    #[cfg(feature = "profiling")]
    tracing::info!("Logging initialized (profiling scopes enabled)");
}
