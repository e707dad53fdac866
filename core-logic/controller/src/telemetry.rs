//! Telemetry for the registry watch controller.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::Counter;
use prometheus::CounterVec;
use prometheus::Opts;

/// Number of registry events processed by event kind.
pub static EVENTS_COUNT: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "kportal_controller_events_count",
            "Number of registry events processed by event kind",
        ),
        &["kind"],
    )
    .expect("failed to initialise EVENTS_COUNT counter")
});

/// Number of registry events that could not be processed by event kind.
pub static EVENTS_ERR: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "kportal_controller_events_error",
            "Number of registry events that could not be processed by event kind",
        ),
        &["kind"],
    )
    .expect("failed to initialise EVENTS_ERR counter")
});

/// Number of times the registry subscription had to be re-established.
pub static RESTARTS_COUNT: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "kportal_controller_restarts_count",
        "Number of times the registry subscription had to be re-established",
    )
    .expect("failed to initialise RESTARTS_COUNT counter")
});

/// Number of full resync passes.
pub static RESYNC_COUNT: Lazy<Counter> = Lazy::new(|| {
    Counter::new("kportal_controller_resync_count", "Number of full resync passes")
        .expect("failed to initialise RESYNC_COUNT counter")
});

/// Number of full resync passes that failed.
pub static RESYNC_ERR: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "kportal_controller_resync_error",
        "Number of full resync passes that failed",
    )
    .expect("failed to initialise RESYNC_ERR counter")
});

static METRICS_REGISTERED: AtomicBool = AtomicBool::new(false);

/// The first time this method is called it will register the controller metrics.
pub fn register_metrics(reg: &prometheus::Registry) -> Result<()> {
    if METRICS_REGISTERED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }

    let collectors: [Box<dyn prometheus::core::Collector>; 5] = [
        Box::new(EVENTS_COUNT.clone()),
        Box::new(EVENTS_ERR.clone()),
        Box::new(RESTARTS_COUNT.clone()),
        Box::new(RESYNC_COUNT.clone()),
        Box::new(RESYNC_ERR.clone()),
    ];
    for collector in collectors {
        reg.register(collector)?;
    }
    Ok(())
}
