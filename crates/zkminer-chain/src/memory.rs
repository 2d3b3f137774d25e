use crate::client::{ChainClient, ChainError, Result, SubmissionReceipt};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use zkminer_types::{Address, Header, Height, ZERO_HASH};

const HEADS_CHANNEL_CAPACITY: usize = 256;

/// A submitted lottery payload as recorded by the in-memory chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub received_at: Height,
    pub payload: Vec<u8>,
}

/// In-memory chain for testing and development
pub struct MemoryChain {
    headers: Arc<RwLock<Vec<Header>>>,
    submissions: Arc<RwLock<Vec<Submission>>>,
    heads_tx: broadcast::Sender<Header>,
    coinbase: Address,
    failing_queries: AtomicUsize,
    reject_submissions: AtomicBool,
}

impl MemoryChain {
    /// Chain holding only a genesis block at height 0.
    pub fn new(coinbase: Address) -> Self {
        let (heads_tx, _) = broadcast::channel(HEADS_CHANNEL_CAPACITY);
        let genesis = Header::new(0, ZERO_HASH, coinbase, chrono::Utc::now().timestamp() as u64);
        Self {
            headers: Arc::new(RwLock::new(vec![genesis])),
            submissions: Arc::new(RwLock::new(Vec::new())),
            heads_tx,
            coinbase,
            failing_queries: AtomicUsize::new(0),
            reject_submissions: AtomicBool::new(false),
        }
    }

    /// Appends a block on top of the tip and announces it.
    pub async fn mine_block(&self) -> Header {
        let header = {
            let mut headers = self.headers.write().await;
            let parent = &headers[headers.len() - 1];
            let header = Header::new(
                parent.number + 1,
                parent.hash,
                self.coinbase,
                chrono::Utc::now().timestamp() as u64,
            );
            headers.push(header.clone());
            header
        };
        debug!(height = header.number, hash = %header.hash_hex(), "Block mined");
        // No subscribers is fine.
        let _ = self.heads_tx.send(header.clone());
        header
    }

    pub async fn mine_blocks(&self, count: u64) -> Header {
        let mut last = self.latest().await;
        for _ in 0..count {
            last = self.mine_block().await;
        }
        last
    }

    pub async fn height(&self) -> Height {
        self.latest().await.number
    }

    async fn latest(&self) -> Header {
        let headers = self.headers.read().await;
        headers[headers.len() - 1].clone()
    }

    pub async fn submissions(&self) -> Vec<Submission> {
        self.submissions.read().await.clone()
    }

    /// The next `count` header queries fail with `Unreachable`.
    pub fn fail_next_queries(&self, count: usize) {
        self.failing_queries.store(count, Ordering::SeqCst);
    }

    pub fn set_reject_submissions(&self, reject: bool) {
        self.reject_submissions.store(reject, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> Result<()> {
        let injected = self
            .failing_queries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(ChainError::Unreachable("injected failure".to_string())),
            Err(_) => Ok(()),
        }
    }

    /// Mines a block every `interval` until `shutdown` flips to true.
    pub fn spawn_producer(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let chain = Arc::clone(self);
        tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "⛏️  Devnet block producer started");
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        chain.mine_block().await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Devnet block producer stopped");
        })
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    async fn header_by_number(&self, height: Height) -> Result<Option<Header>> {
        self.take_injected_failure()?;
        let headers = self.headers.read().await;
        Ok(headers.get(height as usize).cloned())
    }

    async fn latest_header(&self) -> Result<Header> {
        self.take_injected_failure()?;
        Ok(self.latest().await)
    }

    fn subscribe_new_heads(&self) -> broadcast::Receiver<Header> {
        self.heads_tx.subscribe()
    }

    async fn submit_lottery(&self, payload: Vec<u8>) -> Result<SubmissionReceipt> {
        if self.reject_submissions.load(Ordering::SeqCst) {
            return Err(ChainError::SubmissionRejected("submissions disabled".to_string()));
        }
        let received_at = self.height().await;
        let id = *blake3::hash(&payload).as_bytes();
        self.submissions.write().await.push(Submission {
            received_at,
            payload,
        });
        Ok(SubmissionReceipt { id, received_at })
    }
}
