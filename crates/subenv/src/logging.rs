//! Tracing setup shared by the binaries and the Python worker entry point.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Level variable consulted when `RUST_LOG` is unset.
pub const LOG_ENV: &str = "SUBENV_LOG";

/// Install a stderr subscriber. Safe to call more than once; later calls are no-ops.
///
/// - `RUST_LOG` set: used verbatim
/// - otherwise `SUBENV_LOG` (`debug`, `info`, `warn`, `error`; default `info`)
/// - `LOG_FORMAT=json` switches to JSON lines
///
/// Always stderr: in a worker, stdout carries the protocol.
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = base_level(std::env::var(LOG_ENV).ok().as_deref());
        EnvFilter::new(format!(
            "subenv={level},subenv_worker={level},subenv::bridge::codec=off"
        ))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn base_level(value: Option<&str>) -> &'static str {
    match value {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing() {
        assert_eq!(base_level(None), "info");
        assert_eq!(base_level(Some("warning")), "warn");
        assert_eq!(base_level(Some("debug")), "debug");
        assert_eq!(base_level(Some("nonsense")), "info");
    }

    #[test]
    fn init_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
