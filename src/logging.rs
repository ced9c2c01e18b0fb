//! Logging setup.
//!
//! azkv only emits `tracing` events. Binaries embedding it can call
//! [`init`] to install a subscriber filtered by `AZKV_LOG`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::core::constants;

/// Output format for [`init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install a global subscriber.
///
/// `AZKV_LOG` takes precedence; otherwise `verbose` selects between
/// `azkv=debug` and `azkv=warn`. Returns `false` if a subscriber was
/// already installed.
pub fn init(verbose: bool, format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_env(constants::LOG_ENV_VAR).unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("azkv=debug")
        } else {
            EnvFilter::new("azkv=warn")
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).without_time())
            .try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };
    result.is_ok()
}
