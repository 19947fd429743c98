use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

use crate::util::env as env_util;

/// Output layout for the fmt subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

impl LogFormat {
    /// Reads `INVENTORY_LOG_FORMAT` (`full` | `compact`); anything else is `Full`.
    pub fn from_env() -> Self {
        match env_util::env_opt("INVENTORY_LOG_FORMAT")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("compact") => LogFormat::Compact,
            _ => LogFormat::Full,
        }
    }
}

/// Sets up the global tracing subscriber with a fmt formatter and env filter.
///
/// The caller provides a fallback filter string that is used when `RUST_LOG` is
/// not set. Both binaries share the same formatting rules.
pub fn init_tracing(default_filter: &str, format: LogFormat) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .with_file(true);

    let installed = match format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
