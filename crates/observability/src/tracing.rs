//! Subscriber installation.

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    /// Directive used when `RUST_LOG` is unset or unparsable.
    pub default_filter: String,
    /// Route output through the libtest capture.
    pub test_writer: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            default_filter: "info".to_string(),
            test_writer: false,
        }
    }
}

impl LogSettings {
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(settings: &LogSettings) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.filter())
        .with_target(false);

    match (settings.format, settings.test_writer) {
        (LogFormat::Json, false) => builder
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .try_init()
            .is_ok(),
        (LogFormat::Json, true) => builder.json().with_test_writer().try_init().is_ok(),
        (LogFormat::Pretty, false) => builder.compact().try_init().is_ok(),
        (LogFormat::Pretty, true) => builder.compact().with_test_writer().try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let settings = LogSettings {
            format: LogFormat::Pretty,
            default_filter: "warn".to_string(),
            test_writer: true,
        };
        init(&settings);
        assert!(!init(&settings));
    }
}
