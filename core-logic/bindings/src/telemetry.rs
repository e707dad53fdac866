//! Telemetry for binding synchronisation.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::CounterVec;
use prometheus::Opts;

/// Number of grant and revoke operations by applied change.
pub static SYNC_COUNT: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "kportal_bindings_sync_count",
            "Number of grant and revoke operations by applied change",
        ),
        &["op", "applied"],
    )
    .expect("failed to initialise SYNC_COUNT counter")
});

/// Number of grant and revoke operations that failed.
pub static SYNC_ERR: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "kportal_bindings_sync_error",
            "Number of grant and revoke operations that failed",
        ),
        &["op"],
    )
    .expect("failed to initialise SYNC_ERR counter")
});

static METRICS_REGISTERED: AtomicBool = AtomicBool::new(false);

/// The first time this method is called it will register the synchronizer metrics.
pub fn register_metrics(reg: &prometheus::Registry) -> Result<()> {
    if METRICS_REGISTERED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }

    let collectors: [Box<dyn prometheus::core::Collector>; 2] =
        [Box::new(SYNC_COUNT.clone()), Box::new(SYNC_ERR.clone())];
    for collector in collectors {
        reg.register(collector)?;
    }
    Ok(())
}
