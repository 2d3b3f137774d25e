pub mod client;
pub mod memory;
pub mod retry;

pub use client::{ChainClient, ChainError, Result, SubmissionReceipt};
pub use memory::MemoryChain;
pub use retry::{RetryConfig, RetryingClient};
