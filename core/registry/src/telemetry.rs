//! Telemetry for registry operations.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::CounterVec;
use prometheus::Opts;

/// Total number of operations performed against the registry.
pub static OPS_COUNT: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "kportal_registry_ops_count",
            "Total number of operations performed against the registry",
        ),
        &["op"],
    )
    .expect("failed to initialise OPS_COUNT counter")
});

/// Number of registry operations that resulted in error.
pub static OPS_ERR: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "kportal_registry_ops_error",
            "Number of registry operations that resulted in error",
        ),
        &["op"],
    )
    .expect("failed to initialise OPS_ERR counter")
});

/// Ensure metrics are registered only once.
static METRICS_REGISTERED: AtomicBool = AtomicBool::new(false);

/// The first time this method is called it will register the registry metrics.
pub fn register_metrics(reg: &prometheus::Registry) -> Result<()> {
    if METRICS_REGISTERED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }

    let collectors: [Box<dyn prometheus::core::Collector>; 2] =
        [Box::new(OPS_COUNT.clone()), Box::new(OPS_ERR.clone())];
    for collector in collectors {
        reg.register(collector)?;
    }
    Ok(())
}

/// Count an operation and its outcome.
pub(crate) fn observe<T>(op: &str, result: &Result<T>) {
    OPS_COUNT.with_label_values(&[op]).inc();
    if result.is_err() {
        OPS_ERR.with_label_values(&[op]).inc();
    }
}
