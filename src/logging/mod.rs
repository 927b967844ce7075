//! Logging Module
//!
//! Installs the process-wide tracing subscriber. Leak reports and strategy
//! failures are emitted as `tracing` events, so nothing shows up until a
//! subscriber is installed.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{KeepError, Result};

/// Install a compact stderr subscriber.
///
/// `RUST_LOG` takes precedence over `filter`. Fails (instead of panicking)
/// when a global subscriber is already set.
pub fn init_tracing(filter: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .map_err(|e| KeepError::Logging(format!("invalid filter `{}`: {}", filter, e)))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact(),
        )
        .try_init()
        .map_err(|e| KeepError::Logging(e.to_string()))
}
