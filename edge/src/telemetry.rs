//! Structured JSON logging for the edge daemon.

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Installs a JSON-formatted tracing subscriber writing to stderr.
/// `RUST_LOG` overrides the configured default filter.
pub fn init_subscriber(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let formatter = fmt::layer().json().with_writer(std::io::stderr);

    let subscriber = Registry::default().with(filter).with(formatter);

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: tracing subscriber already installed");
    }
}
