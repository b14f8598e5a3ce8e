//! Remove expired sessions along with the credentials they own.
//!
//! Cleanup runs on a recurring schedule in the background, can be nudged by requests
//! when a run is overdue and runs one final time during graceful shutdown.
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use time::OffsetDateTime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use portal_context::Context;
use portal_injector::Injector;
use portal_store::delete::DeleteExpiredOAuthStates;
use portal_store::delete::DeleteSessionCredentials;
use portal_store::Sessions;
use portal_store::Store;

/// Remove expired sessions, their credentials and expired OAuth states.
#[derive(Clone)]
pub struct Cleanup {
    interval: Duration,
    last_run_ms: Arc<AtomicI64>,
    sessions: Sessions,
    store: Store,
}

impl Cleanup {
    pub fn new(injector: &Injector) -> Cleanup {
        Cleanup {
            interval: Duration::from_secs(injector.conf.sessions.cleanup_interval_sec),
            last_run_ms: Arc::new(AtomicI64::new(now_ms())),
            sessions: injector.sessions.clone(),
            store: injector.store.clone(),
        }
    }

    /// Spawn a cleanup in the background if the last run is older than the interval.
    ///
    /// At most one caller wins the right to run for each interval.
    pub fn nudge(&self, context: &Context) {
        if !self.claim() {
            return;
        }
        let cleanup = self.clone();
        let context = context.clone();
        tokio::spawn(async move {
            if let Err(error) = cleanup.run(&context).await {
                slog::warn!(
                    context.logger, "Opportunistic sessions cleanup failed";
                    "error" => format!("{:?}", error)
                );
            }
        });
    }

    /// Run a cleanup now and return the number of sessions removed.
    ///
    /// Cleanups are idempotent and can safely run concurrently.
    pub async fn run(&self, context: &Context) -> Result<usize> {
        self.last_run_ms.store(now_ms(), Ordering::SeqCst);
        let expired = self.sessions.cleanup(context).await?;
        for session_id in &expired {
            let op = DeleteSessionCredentials::from(session_id.as_str());
            self.store.delete(context, op).await?;
        }
        let op = DeleteExpiredOAuthStates(OffsetDateTime::now_utc());
        self.store.delete(context, op).await?;
        if !expired.is_empty() {
            slog::info!(
                context.logger, "Removed expired sessions";
                "count" => expired.len()
            );
        }
        Ok(expired.len())
    }

    /// Run cleanups on a fixed interval until the returned task is stopped.
    pub fn schedule(self, context: Context) -> CleanupTask {
        let (stop, mut stopped) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(self.interval);
            // The first tick completes immediately and startup has nothing to clean yet.
            ticks.tick().await;
            loop {
                tokio::select! {
                    _ = ticks.tick() => {
                        if let Err(error) = self.run(&context).await {
                            slog::warn!(
                                context.logger, "Scheduled sessions cleanup failed";
                                "error" => format!("{:?}", error)
                            );
                        }
                    }
                    _ = &mut stopped => break,
                }
            }

            slog::info!(context.logger, "Running final sessions cleanup");
            if let Err(error) = self.run(&context).await {
                slog::warn!(
                    context.logger, "Final sessions cleanup failed";
                    "error" => format!("{:?}", error)
                );
            }
        });
        CleanupTask { stop, task }
    }

    fn claim(&self) -> bool {
        let interval = i64::try_from(self.interval.as_millis()).unwrap_or(i64::MAX);
        let last = self.last_run_ms.load(Ordering::SeqCst);
        let now = now_ms();
        if now.saturating_sub(last) < interval {
            return false;
        }
        self.last_run_ms
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Handle to the recurring cleanup task.
pub struct CleanupTask {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CleanupTask {
    /// Stop the recurring task and wait for the final cleanup to complete.
    pub async fn stop(self) -> Result<()> {
        // The task may have already exited, in which case there is nothing to notify.
        let _ = self.stop.send(());
        self.task.await?;
        Ok(())
    }
}

fn now_ms() -> i64 {
    let now = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(now).unwrap_or(i64::MAX)
}
