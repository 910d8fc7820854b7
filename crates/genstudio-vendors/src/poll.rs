//! Cancellable status polling with bounded exponential backoff.

use genstudio_core::PollSettings;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{VendorError, VendorResult};

/// Backoff schedule for polling a vendor job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// Total time allowed before giving up with [`VendorError::Timeout`].
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy::from(&PollSettings::default())
    }
}

impl From<&PollSettings> for PollPolicy {
    fn from(settings: &PollSettings) -> Self {
        Self {
            initial_interval: Duration::from_millis(settings.initial_interval_ms),
            max_interval: Duration::from_millis(settings.max_interval_ms),
            multiplier: settings.backoff_multiplier,
            max_wait: Duration::from_secs(settings.max_wait_secs),
        }
    }
}

impl PollPolicy {
    /// Interval following `current`, capped at `max_interval`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let next = current.mul_f64(self.multiplier.max(1.0));
        next.min(self.max_interval)
    }
}

/// Outcome of one status check.
#[derive(Debug)]
pub enum PollStep<T> {
    Pending,
    Done(T),
}

/// Call `check` until it yields a result or an error.
///
/// Sleeps between checks per `policy`. Returns [`VendorError::Cancelled`] as
/// soon as `cancel` fires, including mid-request or mid-sleep, and
/// [`VendorError::Timeout`] once `max_wait` has elapsed without a result.
pub async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut check: F,
) -> VendorResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = VendorResult<PollStep<T>>>,
{
    let started = Instant::now();
    let mut interval = policy.initial_interval.min(policy.max_interval);
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(VendorError::Cancelled);
        }

        attempts += 1;
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(VendorError::Cancelled),
            step = check() => step?,
        };

        if let PollStep::Done(value) = step {
            tracing::debug!(attempts, elapsed_ms = started.elapsed().as_millis() as u64, "Poll finished");
            return Ok(value);
        }

        let elapsed = started.elapsed();
        if elapsed >= policy.max_wait {
            tracing::warn!(attempts, waited_secs = elapsed.as_secs(), "Polling timed out");
            return Err(VendorError::Timeout { waited: elapsed });
        }

        let pause = interval.min(policy.max_wait - elapsed);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(VendorError::Cancelled),
            _ = sleep(pause) => {}
        }
        interval = policy.next_interval(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy() -> PollPolicy {
        PollPolicy {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(4),
            multiplier: 2.0,
            max_wait: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_interval_is_capped() {
        let p = policy();
        let mut interval = p.initial_interval;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(interval.as_secs());
            interval = p.next_interval(interval);
        }
        assert_eq!(seen, vec![1, 2, 4, 4, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backs_off_until_done() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();
        let token = CancellationToken::new();

        let counter = calls.clone();
        let result = poll_until(&policy(), &token, || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 4 {
                    Ok(PollStep::Pending)
                } else {
                    Ok(PollStep::Done(n))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 4);
        // Slept 1s + 2s + 4s between the four checks
        assert_eq!(started.elapsed().as_secs(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_max_wait() {
        let token = CancellationToken::new();
        let err = poll_until::<(), _, _>(&policy(), &token, || async { Ok(PollStep::Pending) })
            .await
            .unwrap_err();

        match err {
            VendorError::Timeout { waited } => assert_eq!(waited.as_secs(), 30),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = poll_until::<(), _, _>(&policy(), &token, || async { Ok(PollStep::Pending) })
            .await
            .unwrap_err();

        assert!(matches!(err, VendorError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_check_error_stops_polling() {
        let token = CancellationToken::new();
        let err = poll_until::<(), _, _>(&policy(), &token, || async {
            Err(VendorError::Failed("nsfw content".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, VendorError::Failed(_)));
    }
}
