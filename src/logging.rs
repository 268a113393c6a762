//! Tracing setup for embedding drivers.
//!
//! The library only emits `tracing` events; whether anything listens is
//! the embedder's choice. [`EmitLogging`] reads a filter directive from
//! `JAVELIN_LOG` (same grammar as `RUST_LOG`, e.g. `javelin=debug`) and a
//! JSON toggle from `JAVELIN_LOG_JSON`, and claims the process-wide
//! subscriber at most once.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};

/// Subscriber configuration for drivers that embed the back end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmitLogging {
    /// Filter directive handed to the subscriber.
    pub directive: String,
    /// Emit newline-delimited JSON instead of the compact human form.
    pub json: bool,
}

impl Default for EmitLogging {
    fn default() -> Self {
        Self {
            directive: "javelin=info".into(),
            json: false,
        }
    }
}

impl EmitLogging {
    /// Read `JAVELIN_LOG` and `JAVELIN_LOG_JSON`, keeping the defaults
    /// where the environment is silent or blank.
    #[must_use]
    pub fn from_env() -> Self {
        let directive = env::var("JAVELIN_LOG").ok();
        let json = env::var("JAVELIN_LOG_JSON").ok();
        Self::from_parts(directive.as_deref(), json.as_deref())
    }

    fn from_parts(directive: Option<&str>, json: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(directive) = directive {
            let trimmed = directive.trim();
            if !trimmed.is_empty() {
                config.directive = trimmed.to_string();
            }
        }
        config.json = json.is_some_and(|flag| flag == "1" || flag.eq_ignore_ascii_case("true"));
        config
    }

    /// Install the process-wide subscriber. Returns `false` when this or
    /// an earlier call already claimed it, or when the embedding
    /// application installed its own subscriber first.
    pub fn install(&self) -> bool {
        use tracing_subscriber::{EnvFilter, fmt};

        static CLAIMED: AtomicBool = AtomicBool::new(false);
        if CLAIMED.swap(true, Ordering::SeqCst) {
            return false;
        }

        let filter = EnvFilter::try_new(&self.directive)
            .unwrap_or_else(|_| EnvFilter::new("javelin=info"));
        let builder = fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false);
        let installed = if self.json {
            tracing::subscriber::set_global_default(builder.json().finish())
        } else {
            tracing::subscriber::set_global_default(builder.compact().finish())
        };
        installed.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_scope_the_filter_to_this_crate() {
        let config = EmitLogging::default();
        assert_eq!(config.directive, "javelin=info");
        assert!(!config.json);
    }

    #[test]
    fn environment_overrides_directive_and_format() {
        let config = EmitLogging::from_parts(Some("javelin=trace"), Some("1"));
        assert_eq!(config.directive, "javelin=trace");
        assert!(config.json);

        let config = EmitLogging::from_parts(Some("javelin=trace"), Some("true"));
        assert!(config.json);
    }

    #[test]
    fn blank_directives_and_unknown_flags_keep_the_defaults() {
        let config = EmitLogging::from_parts(Some("   "), Some("no"));
        assert_eq!(config.directive, "javelin=info");
        assert!(!config.json);
    }
}
