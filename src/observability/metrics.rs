//! # Store Metrics
//!
//! Prometheus metrics for record store operations and operator authentication.

use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::LazyLock;

/// Global Prometheus metrics registry
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static STORE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "squid_store_operations_total",
            "Total number of record store operations by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create STORE_OPERATIONS_TOTAL metric - this should never happen")
});

static STORE_RECORDS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "squid_store_records",
        "Current number of user records in the store",
    )
    .expect("Failed to create STORE_RECORDS metric - this should never happen")
});

static AUTH_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "squid_auth_failures_total",
        "Total number of rejected operator credential checks",
    )
    .expect("Failed to create AUTH_FAILURES_TOTAL metric - this should never happen")
});

/// Register all metrics with the Prometheus registry
///
/// Repeated calls are no-ops.
///
/// # Errors
///
/// Returns an error if a collector conflicts with one already registered.
pub fn register_metrics() -> Result<()> {
    register(Box::new(STORE_OPERATIONS_TOTAL.clone()))?;
    register(Box::new(STORE_RECORDS.clone()))?;
    register(Box::new(AUTH_FAILURES_TOTAL.clone()))?;
    Ok(())
}

fn register(collector: Box<dyn prometheus::core::Collector>) -> Result<()> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub fn record_store_operation(operation: &str, outcome: &str) {
    STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

pub fn set_store_records(count: usize) {
    STORE_RECORDS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_auth_failures() {
    AUTH_FAILURES_TOTAL.inc();
}

/// Render the registry in the Prometheus text format
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn gather_text() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_store_operation() {
        let before = STORE_OPERATIONS_TOTAL
            .with_label_values(&["add", "success"])
            .get();
        record_store_operation("add", "success");
        let after = STORE_OPERATIONS_TOTAL
            .with_label_values(&["add", "success"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_auth_failures() {
        let before = AUTH_FAILURES_TOTAL.get();
        increment_auth_failures();
        assert_eq!(AUTH_FAILURES_TOTAL.get(), before + 1u64);
    }

    #[test]
    fn test_set_store_records() {
        set_store_records(3);
        assert_eq!(STORE_RECORDS.get(), 3);
    }

    #[test]
    fn test_register_is_idempotent() {
        register_metrics().unwrap();
        register_metrics().unwrap();
        record_store_operation("get", "success");
        let text = gather_text().unwrap();
        assert!(text.contains("squid_store_operations_total"));
        assert!(text.contains("squid_store_records"));
    }
}
