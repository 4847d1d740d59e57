//! Diagnostic logging for the `revdoc` binary.
//!
//! Logs go to stderr with a compact timestamp so stdout carries only
//! answers. Levels come from `[logging]` in the config file:
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! revdoc_core = "debug"
//! ```
//!
//! `RUST_LOG` takes precedence when set:
//! ```bash
//! RUST_LOG=revdoc=info,revdoc_core=debug revdoc ask docs/ --query "..."
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Filter directives for `config`, ignoring `RUST_LOG`.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut modules: Vec<(&String, &String)> = config.modules.iter().collect();
    modules.sort();
    let mut directives = config.default.clone();
    for (module, level) in modules {
        directives.push_str(&format!(",{module}={level}"));
    }
    directives
}

/// Install the global subscriber. Only the first call has any effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_are_sorted() {
        let mut config = LoggingConfig::default();
        config.modules.insert("revdoc_core".to_string(), "debug".to_string());
        config.modules.insert("revdoc".to_string(), "info".to_string());
        assert_eq!(filter_directives(&config), "warn,revdoc=info,revdoc_core=debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        init_with_config(&config);
        init_with_config(&config);
    }
}
