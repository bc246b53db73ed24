//! Deadlines and bounded retry for layer calls.

use hearth_config::OrchestratorConfig;
use hearth_core::{LayerError, LayerKind, LayerResult};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Run `fut` under `timeout`, mapping expiry to [`LayerError::Timeout`].
pub async fn with_deadline<T, F>(layer: LayerKind, timeout: Duration, fut: F) -> LayerResult<T>
where
    F: Future<Output = LayerResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(LayerError::Timeout {
            layer,
            after_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Retry schedule for best-effort writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first.
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Deadline for each individual attempt.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            retries: config.write_retries,
            base_delay: config.retry_base_delay(),
            max_delay: config.retry_max_delay(),
            attempt_timeout: config.layer_timeout(),
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Call `op` until it succeeds or the retries are spent. Returns the last
    /// error.
    pub async fn run<T, F, Fut>(&self, layer: LayerKind, mut op: F) -> LayerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LayerResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match with_deadline(layer, self.attempt_timeout, op()).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retries => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        layer = %layer,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying layer write"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default())
    }
}
