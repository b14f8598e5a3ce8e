//! Telemetry for the SQLite stores.
use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::Counter;
use prometheus::CounterVec;
use prometheus::HistogramTimer;
use prometheus::HistogramVec;
use prometheus::Opts;
use prometheus::Registry;

/// Number of operations executed against the SQLite DB.
pub static OPS_COUNT: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "portal_store_sqlite_ops_count",
            "Number of operations executed against the SQLite DB",
        ),
        &["op"],
    )
    .expect("failed to initialise OPS_COUNT counter")
});

/// Duration, in seconds, of operations executed against the SQLite DB.
pub static OPS_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "portal_store_sqlite_ops_duration",
            "Duration, in seconds, of operations executed against the SQLite DB",
        ),
        &["op"],
    )
    .expect("failed to initialise OPS_DURATION histogram")
});

/// Number of operations against the SQLite DB that failed.
pub static OPS_ERR: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "portal_store_sqlite_ops_error",
            "Number of operations against the SQLite DB that failed",
        ),
        &["op"],
    )
    .expect("failed to initialise OPS_ERR counter")
});

/// Count errors into a [`Counter`] as results are returned.
pub trait CountErrExt {
    /// Increment the counter if the result is an error.
    fn count_on_err(self, counter: Counter) -> Self;
}

impl<T, E> CountErrExt for std::result::Result<T, E> {
    fn count_on_err(self, counter: Counter) -> Self {
        if self.is_err() {
            counter.inc();
        }
        self
    }
}

/// Observe the execution of an operation.
///
/// Returns the error counter for the operation and a timer that observes the
/// operation duration when dropped.
pub fn observe_op(op: &str) -> (Counter, HistogramTimer) {
    OPS_COUNT.with_label_values(&[op]).inc();
    let err_count = OPS_ERR.with_label_values(&[op]);
    let timer = OPS_DURATION.with_label_values(&[op]).start_timer();
    (err_count, timer)
}

/// Register SQLite stores metrics with the given registry.
pub fn register_metrics(registry: &Registry) -> Result<()> {
    registry.register(Box::new(OPS_COUNT.clone()))?;
    registry.register(Box::new(OPS_DURATION.clone()))?;
    registry.register(Box::new(OPS_ERR.clone()))?;
    Ok(())
}
