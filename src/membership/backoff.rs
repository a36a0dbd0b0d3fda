use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::config::RetryConfig;
use crate::region::{RegionError, RegionResult};

/// Exponential backoff over a [`RetryConfig`].
///
/// The first attempt is free; each failed attempt asks for the next delay
/// until `max_attempts` attempts have been made.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    attempts: u32,
    nominal: Duration,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            config: config.clone(),
            attempts: 0,
            nominal: config.initial_delay(),
        }
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failed attempt and return how long to wait before the next
    /// one, or `None` once the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts >= self.config.max_attempts {
            return None;
        }

        let delay = self.nominal.min(self.config.max_delay());
        let scaled = self.nominal.as_secs_f64() * f64::from(self.config.backoff_factor);
        self.nominal = Duration::try_from_secs_f64(scaled)
            .map_or(self.config.max_delay(), |next| next.min(self.config.max_delay()));

        if self.config.jitter && !delay.is_zero() {
            let factor = rand::thread_rng().gen_range(0.5..=1.0);
            Some(delay.mul_f64(factor))
        } else {
            Some(delay)
        }
    }
}

/// Run a region call, retrying transient failures with backoff.
///
/// Permanent errors return immediately. When the attempt budget runs out
/// the last transient error is returned.
pub async fn retry_transient<T, F, Fut>(
    config: &RetryConfig,
    call: &'static str,
    mut op: F,
) -> RegionResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RegionResult<T>>,
{
    let mut backoff = Backoff::new(config);
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err @ RegionError::Permanent { .. }) => return Err(err),
            Err(err) => err,
        };

        let Some(delay) = backoff.next_delay() else {
            debug!(
                call,
                region = %err.region(),
                attempts = backoff.attempts(),
                "transient retries exhausted"
            );
            return Err(err);
        };

        debug!(
            call,
            region = %err.region(),
            attempt = backoff.attempts(),
            delay_ms = delay.as_millis() as u64,
            error = err.message(),
            "transient region error, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}
