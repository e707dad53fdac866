//! Telemetry for access evaluation.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::CounterVec;
use prometheus::Opts;

/// Number of access evaluations by outcome.
pub static EVALUATE_COUNT: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "kportal_access_evaluate_count",
            "Number of access evaluations by outcome",
        ),
        &["check", "allowed"],
    )
    .expect("failed to initialise EVALUATE_COUNT counter")
});

/// Number of access evaluations denied because of errors.
pub static EVALUATE_ERR: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "kportal_access_evaluate_error",
            "Number of access evaluations denied because of errors",
        ),
        &["check"],
    )
    .expect("failed to initialise EVALUATE_ERR counter")
});

static METRICS_REGISTERED: AtomicBool = AtomicBool::new(false);

/// The first time this method is called it will register the evaluator metrics.
pub fn register_metrics(reg: &prometheus::Registry) -> Result<()> {
    if METRICS_REGISTERED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }

    let collectors: [Box<dyn prometheus::core::Collector>; 2] =
        [Box::new(EVALUATE_COUNT.clone()), Box::new(EVALUATE_ERR.clone())];
    for collector in collectors {
        reg.register(collector)?;
    }
    Ok(())
}

pub(crate) fn observe(check: &str, allowed: bool) {
    let allowed = if allowed { "true" } else { "false" };
    EVALUATE_COUNT.with_label_values(&[check, allowed]).inc();
}
