//! Tracing setup.

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

static TRACING: OnceCell<()> = OnceCell::new();

/// Install the global subscriber once. `RUST_LOG` overrides the configured
/// level. Later calls, and calls after another subscriber was installed by
/// the host, are no-ops.
pub fn init_tracing(logging: &LoggingConfig) {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&logging.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
