use crate::error::{calculate_backoff, is_retryable, Result, RetryConfig};
use crate::publisher::ImagePublisher;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Retries retryable publisher failures with exponential backoff.
pub struct RetryingPublisher<P> {
    inner: P,
    config: RetryConfig,
}

impl<P: ImagePublisher> RetryingPublisher<P> {
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: ImagePublisher> ImagePublisher for RetryingPublisher<P> {
    async fn build_and_push(
        &self,
        context: &Path,
        image: &str,
        extra_args: &[String],
    ) -> Result<String> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match self.inner.build_and_push(context, image, extra_args).await {
                Ok(digest) => return Ok(digest),
                Err(e) if is_retryable(&e) && attempt + 1 < attempts => {
                    let backoff = calculate_backoff(attempt, &self.config);
                    tracing::warn!(
                        image,
                        attempt = attempt + 1,
                        backoff_ms = backoff,
                        error = %e,
                        "Publish failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
