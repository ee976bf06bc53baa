//! Logging setup
//!
//! There is no binary in this workspace, so the subscriber installation lives
//! here for services and tests that embed these crates.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber. Honors `RUST_LOG`; repeated calls
/// are a no-op.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memos=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
