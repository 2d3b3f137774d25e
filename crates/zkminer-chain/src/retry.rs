use crate::client::{ChainClient, ChainError, Result, SubmissionReceipt};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::warn;
use zkminer_types::{Header, Height};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub rpc_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_secs(5),
            rpc_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    fn backoff(&self, attempt: usize) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }
}

/// Wraps a client with per-call timeouts and exponential backoff on
/// transient header-query failures. Submissions get the timeout only.
pub struct RetryingClient {
    inner: Arc<dyn ChainClient>,
    config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn ChainClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.rpc_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Timeout(self.config.rpc_timeout.as_millis() as u64)),
        }
    }

    async fn retrying<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match self.with_timeout(call()).await {
                Err(e) if e.is_transient() && attempt + 1 < self.config.max_attempts => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        op,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Chain query failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl ChainClient for RetryingClient {
    async fn header_by_number(&self, height: Height) -> Result<Option<Header>> {
        self.retrying("header_by_number", || self.inner.header_by_number(height))
            .await
    }

    async fn latest_header(&self) -> Result<Header> {
        self.retrying("latest_header", || self.inner.latest_header()).await
    }

    fn subscribe_new_heads(&self) -> broadcast::Receiver<Header> {
        self.inner.subscribe_new_heads()
    }

    async fn submit_lottery(&self, payload: Vec<u8>) -> Result<SubmissionReceipt> {
        self.with_timeout(self.inner.submit_lottery(payload)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryChain;
    use zkminer_types::Address;

    fn fast_config(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(4),
            rpc_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.backoff(0), Duration::from_millis(200));
        assert_eq!(config.backoff(1), Duration::from_millis(400));
        assert_eq!(config.backoff(10), config.backoff_max);
    }

    #[tokio::test]
    async fn test_transient_failures_retried() {
        let chain = Arc::new(MemoryChain::new(Address::zero()));
        chain.fail_next_queries(2);
        let client = RetryingClient::new(chain.clone(), fast_config(3));

        assert!(client.header_by_number(0).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let chain = Arc::new(MemoryChain::new(Address::zero()));
        chain.fail_next_queries(5);
        let client = RetryingClient::new(chain.clone(), fast_config(2));

        let err = client.latest_header().await.unwrap_err();
        assert!(matches!(err, ChainError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_rejected_submission_not_retried() {
        let chain = Arc::new(MemoryChain::new(Address::zero()));
        chain.set_reject_submissions(true);
        let client = RetryingClient::new(chain.clone(), fast_config(3));

        assert!(client.submit_lottery(vec![1]).await.is_err());
        assert!(chain.submissions().await.is_empty());
    }
}
