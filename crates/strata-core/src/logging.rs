//! Failure logging for layer executors.
//!
//! Maps exception metadata onto `tracing` events. This module decides the
//! level, domain and message layout only; what happens to the layer
//! afterwards is the executor's business.

use std::error::Error;

use tracing::Level;

use crate::exception::{LayerException, LogDomain, Severity};
use crate::layer::LayerType;

/// Fixed message layout shared by every failure line: `[DOMAIN:Layer] message`.
pub fn render(domain: LogDomain, layer: LayerType, message: &dyn std::fmt::Display) -> String {
    format!("[{domain}:{layer}] {message}")
}

/// Level and domain a declared exception is logged under.
pub fn classify(err: &dyn LayerException) -> (Level, LogDomain) {
    let level = match err.severity() {
        Severity::Debug => Level::DEBUG,
        Severity::Info => Level::INFO,
        Severity::Warn => Level::WARN,
        Severity::Error => Level::ERROR,
    };
    (level, LogDomain::Layer)
}

/// Log a declared exception at its own severity.
///
/// ERROR lines also carry the full `source()` chain.
pub fn log_exception(err: &dyn LayerException, layer: LayerType) {
    let (level, domain) = classify(err);
    let line = render(domain, layer, &err);
    match level {
        Level::DEBUG => tracing::debug!(%domain, %layer, "{line}"),
        Level::INFO => tracing::info!(%domain, %layer, "{line}"),
        Level::WARN => tracing::warn!(%domain, %layer, "{line}"),
        _ => {
            let causes = cause_chain(err);
            tracing::error!(%domain, %layer, %causes, "{line}");
        }
    }
}

/// Log an unanticipated hook error: always ERROR, always RUNTIME.
pub fn log_unexpected(err: &anyhow::Error, layer: LayerType) {
    let domain = LogDomain::Runtime;
    let line = render(domain, layer, &format_args!("{err:#}"));
    tracing::error!(%domain, %layer, "{line}");
}

/// Log a panic raised inside a hook. Its failure type is unknown.
pub fn log_panic(message: &str, layer: LayerType) {
    let domain = LogDomain::Unknown;
    let line = render(domain, layer, &format_args!("hook panicked: {message}"));
    tracing::error!(%domain, %layer, "{line}");
}

/// `err: source: source ...`
fn cause_chain(err: &dyn LayerException) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
