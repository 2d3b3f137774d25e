use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use zkminer_types::{Hash, Header, Height};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Chain unreachable: {0}")]
    Unreachable(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("Chain has no blocks")]
    Empty,
}

impl ChainError {
    /// Transient failures are worth retrying; rejections are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Acknowledgement for a lottery submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub id: Hash,
    pub received_at: Height,
}

/// Read and submit access to the chain the miner watches.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Header at `height`, or `None` if the chain has not reached it yet.
    async fn header_by_number(&self, height: Height) -> Result<Option<Header>>;

    /// Current tip.
    async fn latest_header(&self) -> Result<Header>;

    /// Stream of new heads in height order.
    fn subscribe_new_heads(&self) -> broadcast::Receiver<Header>;

    /// Submit an encoded lottery ticket.
    async fn submit_lottery(&self, payload: Vec<u8>) -> Result<SubmissionReceipt>;
}
