//! Tracing setup for the `promote` binary.
//!
//! Unlike a service, `promote` prints its output document on stdout for the
//! calling workflow to capture, so every log line goes to stderr.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events are shown at the requested level.
const PROMOTE_TARGETS: [&str; 3] = ["promote", "promote_core", "promote_delivery"];

/// Filter used when `RUST_LOG` is unset: the promote crates at `level`,
/// everything else at `warn`.
pub fn default_filter(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(PROMOTE_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

/// Initialise the global tracing subscriber.
///
/// `json` switches to newline-delimited JSON lines; `level` is the
/// verbosity of the promote crates when `RUST_LOG` is not set. Only the
/// first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let json_layer = json.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
    });
    let text_layer =
        (!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_scopes_level_to_promote_crates() {
        assert_eq!(
            default_filter(Level::DEBUG),
            "warn,promote=debug,promote_core=debug,promote_delivery=debug"
        );
        assert!(EnvFilter::try_new(default_filter(Level::INFO)).is_ok());
    }

    #[test]
    fn repeated_init_is_harmless() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }
}
