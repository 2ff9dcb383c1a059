//! # Observability
//!
//! Tracing subscriber setup and Prometheus metrics.

pub mod metrics;

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
fn default_filter(debug: bool) -> &'static str {
    if debug {
        "squid_vault_auth=debug,tower_http=debug"
    } else {
        "squid_vault_auth=info"
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` always wins; otherwise `debug` selects the default level.
/// Calling it twice is harmless: the second install fails and is ignored.
pub fn init_tracing(debug: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(debug).into());
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        tracing::warn!("Tracing subscriber already initialized: {}", e);
    }
}

/// Same as [`init_tracing`] but writes to stderr
///
/// Used by `squidctl`, whose stdout carries the Squid helper protocol.
pub fn init_stderr_tracing(debug: bool, default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            format!("{default},squid_vault_auth=debug").into()
        } else {
            default.into()
        }
    });
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        tracing::warn!("Tracing subscriber already initialized: {}", e);
    }
}
