//! Retry timing shared by the redemption, refill and payout engines.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::debug;

/// Exponential backoff: `base * factor^attempt`, capped at `max`, with a
/// uniform jitter of `jitter` times the delay applied either way.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: u32,
    pub max: Duration,
    pub jitter: f64,
    /// Give up after this many attempts; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(15),
            factor: 2,
            max: Duration::from_secs(60 * 60),
            jitter: 0.1,
            max_attempts: None,
        }
    }
}

pub struct BackoffTimer {
    policy: BackoffPolicy,
    attempt: u32,
}

impl BackoffTimer {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn exhausted(&self) -> bool {
        matches!(self.policy.max_attempts, Some(max) if self.attempt >= max)
    }

    /// Delay for the next attempt, advancing the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let unclamped = self
            .policy
            .base
            .checked_mul(self.policy.factor.saturating_pow(self.attempt))
            .unwrap_or(self.policy.max);
        let delay = unclamped.min(self.policy.max);
        self.attempt += 1;

        if self.policy.jitter <= 0.0 {
            return delay;
        }
        let spread = delay.as_secs_f64() * self.policy.jitter;
        let jittered = delay.as_secs_f64() + rand::thread_rng().gen_range(-spread, spread);
        Duration::from_secs_f64(jittered.max(0.0))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Delay drawn from an exponential distribution with the given mean, clamped
/// to [1s, 4 * mean]. Spreads periodic work so clients do not synchronize.
pub fn geometric_jitter(mean: Duration) -> Duration {
    let uniform: f64 = rand::thread_rng().gen_range(f64::MIN_POSITIVE, 1.0);
    let delay = Duration::from_secs_f64(mean.as_secs_f64() * -uniform.ln());
    delay.clamp(Duration::from_secs(1), mean * 4)
}

/// Handle to a spawned background task; aborts the task when dropped.
pub struct ScheduledTask(JoinHandle<()>);

impl ScheduledTask {
    pub fn cancel(&self) {
        self.0.abort();
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run `fut` after `delay`.
pub fn schedule<F>(delay: Duration, fut: F) -> ScheduledTask
where
    F: Future<Output = ()> + Send + 'static,
{
    ScheduledTask(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        fut.await;
    }))
}

/// Drive `op` until it succeeds, fails non-retryably, or the policy's attempt
/// budget runs out. `is_retryable` decides per error.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &BackoffPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut timer = BackoffTimer::new(policy.clone());
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) if timer.exhausted() => return Err(e),
            Err(_) => {
                let delay = timer.next_delay();
                debug!(attempt = timer.attempt(), ?delay, "retrying after backoff");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
