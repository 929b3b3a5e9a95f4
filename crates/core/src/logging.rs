//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install a fmt subscriber for the process
///
/// `RUST_LOG` overrides the configured level. Returns `false` when a global
/// subscriber was already installed, in which case nothing changes.
pub fn init(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.target)
        .with_ansi(config.ansi)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!("Logging initialized (level {})", config.level);
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_ignored() {
        let config = LoggingConfig {
            ansi: false,
            ..Default::default()
        };
        init(&config);
        assert!(!init(&config));
    }
}
