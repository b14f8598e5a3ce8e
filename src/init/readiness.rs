//! Wait for process dependencies to become available during startup.
use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;

use portal_context::Context;

/// A dependency did not become available in time.
#[derive(Debug, thiserror::Error)]
#[error("{dependency} not ready after {timeout_ms}ms")]
pub struct NotReady {
    pub dependency: String,
    pub timeout_ms: u128,
}

/// Poll a readiness check on a fixed interval until it succeeds or the timeout elapses.
///
/// The check is attempted at least once, even with a zero timeout.
/// Each failed attempt is logged and there is no backoff between attempts.
pub async fn wait_until_ready<T, F, Fut>(
    context: &Context,
    dependency: &str,
    interval: Duration,
    timeout: Duration,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        let error = match check().await {
            Ok(value) => {
                slog::info!(
                    context.logger, "Dependency ready";
                    "dependency" => dependency,
                    "attempts" => attempt,
                );
                return Ok(value);
            }
            Err(error) => error,
        };
        slog::warn!(
            context.logger, "Dependency not ready yet";
            "dependency" => dependency,
            "attempt" => attempt,
            "error" => format!("{:#}", error),
        );

        let now = Instant::now();
        if now + interval > deadline {
            let error = error.context(NotReady {
                dependency: dependency.to_string(),
                timeout_ms: timeout.as_millis(),
            });
            return Err(error);
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use portal_context::Context;

    use super::wait_until_ready;
    use super::NotReady;

    #[tokio::test]
    async fn ready_on_first_attempt() {
        let context = Context::fixture();
        let value = wait_until_ready(
            &context,
            "test",
            Duration::from_millis(5),
            Duration::from_millis(50),
            || async { Ok(42) },
        )
        .await
        .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn ready_after_retries() {
        let context = Context::fixture();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let value = wait_until_ready(
            &context,
            "test",
            Duration::from_millis(1),
            Duration::from_millis(500),
            move || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < 3 {
                        anyhow::bail!("not yet");
                    }
                    Ok(attempt)
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timeout_reports_not_ready() {
        let context = Context::fixture();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let result: anyhow::Result<()> = wait_until_ready(
            &context,
            "store",
            Duration::from_millis(2),
            Duration::from_millis(10),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { anyhow::bail!("unavailable") }
            },
        )
        .await;
        let error = result.unwrap_err();
        let not_ready = error.downcast_ref::<NotReady>().unwrap();
        assert_eq!(not_ready.timeout_ms, 10);
        let attempts = attempts.load(Ordering::SeqCst);
        assert!(attempts >= 2, "expected retries, got {} attempts", attempts);
        assert!(attempts <= 6, "expected bounded retries, got {} attempts", attempts);
    }

    #[tokio::test]
    async fn zero_timeout_checks_once() {
        let context = Context::fixture();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let result: anyhow::Result<()> = wait_until_ready(
            &context,
            "store",
            Duration::from_millis(1),
            Duration::ZERO,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { anyhow::bail!("unavailable") }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
