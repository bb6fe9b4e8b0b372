use std::sync::Once;

use tracing::Level;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::registry;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Environment variables consulted, in order, for the log filter.
pub const LOG_FILTER_VARS: [&str; 2] = ["MUNA_LOG", "RUST_LOG"];

static PANIC_HOOK: Once = Once::new();

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to initialize telemetry subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Install a global subscriber logging to stderr.
///
/// The filter is read from `MUNA_LOG`, then `RUST_LOG`, then `default_level`. Panics are logged
/// before the previous panic hook runs. Fails without side effects if a global subscriber is
/// already set.
pub fn install(default_level: &str) -> Result<(), TelemetryError> {
    let directive = filter_directive(|name| std::env::var(name).ok(), default_level);
    let env_filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter_fn(|m| {
            // The HTTP stack logs every connection at `debug`, keep it to warnings.
            let noisy = m
                .module_path()
                .is_some_and(|path| path.starts_with("hyper") || path.starts_with("reqwest"));
            !noisy || *m.level() <= Level::WARN
        }));

    registry().with(env_filter).with(layer).try_init()?;
    install_panic_hook();
    Ok(())
}

fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!("PANIC => {info}");
            hook(info);
        }));
    });
}

fn filter_directive(lookup: impl Fn(&str) -> Option<String>, default_level: &str) -> String {
    LOG_FILTER_VARS
        .iter()
        .find_map(|name| lookup(name).filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| default_level.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn directive(vars: &[(&str, &str)]) -> String {
        let vars: HashMap<_, _> = vars.iter().copied().collect();
        filter_directive(|name| vars.get(name).map(|value| value.to_string()), "warn")
    }

    #[test]
    fn test_muna_log_wins() {
        assert_eq!(
            directive(&[("MUNA_LOG", "muna=debug"), ("RUST_LOG", "info")]),
            "muna=debug"
        );
    }

    #[test]
    fn test_second_install_fails_without_hooking_again() {
        install("warn").unwrap();
        assert!(PANIC_HOOK.is_completed());

        let err = install("debug").unwrap_err();

        assert!(matches!(err, TelemetryError::Init(_)));
    }

    #[test]
    fn test_falls_back_to_rust_log_then_default() {
        assert_eq!(directive(&[("MUNA_LOG", " "), ("RUST_LOG", "trace")]), "trace");
        assert_eq!(directive(&[]), "warn");
    }
}
