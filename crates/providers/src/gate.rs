//! Request gate and 429 backoff for the model runtime.
//!
//! The runtime serializes inference and answers 429 under concurrent load,
//! so every gateway sharing one endpoint shares one [`RequestGate`]. The gate
//! covers only request setup (send + response headers). Backoff sleeps happen
//! with the gate released, and a streaming body is read after the gate drops.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use deskpilot_core::error::GatewayError;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Escalating sleep schedule applied while the runtime answers 429.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    schedule: Vec<Duration>,
    max_attempts: u32,
}

impl BackoffPolicy {
    /// `schedule` is indexed by attempt; the last value repeats once exhausted.
    pub fn new(schedule: Vec<Duration>, max_attempts: u32) -> Self {
        Self {
            schedule,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_secs(schedule: &[u64], max_attempts: u32) -> Self {
        Self::new(
            schedule.iter().map(|s| Duration::from_secs(*s)).collect(),
            max_attempts,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Sleep before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.schedule.is_empty() {
            return Duration::ZERO;
        }
        let idx = (attempt.saturating_sub(1) as usize).min(self.schedule.len() - 1);
        self.schedule[idx]
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_secs(&[3, 8, 15, 25, 40], 5)
    }
}

/// Outcome of one gated setup attempt.
pub enum Setup<T> {
    /// The runtime accepted the request.
    Ready(T),
    /// The runtime answered 429; back off and try again.
    RateLimited,
}

/// Process-wide mutual exclusion over model request setup.
///
/// Cloning shares the same underlying lock.
#[derive(Debug, Clone, Default)]
pub struct RequestGate {
    lock: Arc<Mutex<()>>,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `setup` under the gate, retrying with backoff on 429.
    ///
    /// `setup` receives the 1-based attempt number. Errors it returns are
    /// surfaced immediately without retry. After `max_attempts` rate-limited
    /// answers this fails with [`GatewayError::RateLimited`].
    pub async fn acquire_with_backoff<T, F, Fut>(
        &self,
        policy: &BackoffPolicy,
        mut setup: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Setup<T>, GatewayError>>,
    {
        let max_attempts = policy.max_attempts();

        for attempt in 1..=max_attempts {
            let outcome = {
                let _guard = self.lock.lock().await;
                debug!(attempt, "Acquired model request gate");
                setup(attempt).await?
            };

            match outcome {
                Setup::Ready(value) => return Ok(value),
                Setup::RateLimited if attempt < max_attempts => {
                    let delay = policy.delay_after(attempt);
                    warn!(
                        attempt,
                        backoff_secs = delay.as_secs_f64(),
                        "Model runtime returned 429, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Setup::RateLimited => {}
            }
        }

        warn!(attempts = max_attempts, "Model runtime still rate limiting, giving up");
        Err(GatewayError::RateLimited {
            attempts: max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn delay_schedule_clamps_to_last_value() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(3));
        assert_eq!(policy.delay_after(5), Duration::from_secs(40));
        assert_eq!(policy.delay_after(9), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retries_are_bounded() {
        let gate = RequestGate::new();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = gate
            .acquire_with_backoff(&BackoffPolicy::default(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Setup::RateLimited) }
            })
            .await;

        assert!(matches!(result, Err(GatewayError::RateLimited { attempts: 5 })));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // 3 + 8 + 15 + 25 between the five attempts, none after the last
        assert_eq!(start.elapsed(), Duration::from_secs(51));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_rate_limit() {
        let gate = RequestGate::new();
        let calls = AtomicU32::new(0);

        let result = gate
            .acquire_with_backoff(&BackoffPolicy::default(), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Ok(Setup::RateLimited)
                    } else {
                        Ok(Setup::Ready("ok"))
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_surface_without_retry() {
        let gate = RequestGate::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = gate
            .acquire_with_backoff(&BackoffPolicy::default(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(GatewayError::Api {
                        status_code: 500,
                        message: "boom".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Api { status_code: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_setups_never_overlap() {
        let gate = RequestGate::new();
        let spans: Arc<std::sync::Mutex<Vec<(Instant, Instant)>>> = Arc::default();

        let run = |gate: RequestGate, spans: Arc<std::sync::Mutex<Vec<(Instant, Instant)>>>| async move {
            gate.acquire_with_backoff(&BackoffPolicy::default(), |_| {
                let spans = spans.clone();
                async move {
                    let enter = Instant::now();
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    spans.lock().unwrap().push((enter, Instant::now()));
                    Ok(Setup::Ready(()))
                }
            })
            .await
        };

        let (a, b) = tokio::join!(
            run(gate.clone(), spans.clone()),
            run(gate.clone(), spans.clone())
        );
        a.unwrap();
        b.unwrap();

        let mut spans = spans.lock().unwrap().clone();
        spans.sort_by_key(|(enter, _)| *enter);
        assert_eq!(spans.len(), 2);
        assert!(spans[0].1 <= spans[1].0, "setup phases overlapped: {spans:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn gate_is_released_while_backing_off() {
        let gate = RequestGate::new();
        let order: Arc<std::sync::Mutex<Vec<&'static str>>> = Arc::default();

        let limited = {
            let gate = gate.clone();
            let order = order.clone();
            async move {
                gate.acquire_with_backoff(&BackoffPolicy::default(), |attempt| {
                    let order = order.clone();
                    async move {
                        if attempt == 1 {
                            order.lock().unwrap().push("a:429");
                            Ok(Setup::RateLimited)
                        } else {
                            order.lock().unwrap().push("a:ok");
                            Ok(Setup::Ready(()))
                        }
                    }
                })
                .await
            }
        };

        let other = {
            let gate = gate.clone();
            let order = order.clone();
            async move {
                // Let the first caller take the gate and start backing off
                tokio::time::sleep(Duration::from_millis(10)).await;
                gate.acquire_with_backoff(&BackoffPolicy::default(), |_| {
                    let order = order.clone();
                    async move {
                        order.lock().unwrap().push("b:ok");
                        Ok(Setup::Ready(()))
                    }
                })
                .await
            }
        };

        let (a, b) = tokio::join!(limited, other);
        a.unwrap();
        b.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["a:429", "b:ok", "a:ok"]);
    }
}
