//! Structured logging setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
/// Calling it again after a subscriber is installed is a no-op.
pub fn init_tracing(cfg: &LoggingConfig) {
    let default_filter = format!("warn,sayr_mcp_agent={}", cfg.level);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .ok(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        let cfg = LoggingConfig::default();
        init_tracing(&cfg);
        init_tracing(&LoggingConfig {
            format: LogFormat::Json,
            ..cfg
        });
        tracing::info!("still logging");
    }
}
