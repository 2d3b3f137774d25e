use crate::config::MinerConfig;
use crate::error::{MinerError, Result};
use crate::task::{Task, TaskStep};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use zkminer_chain::ChainClient;
use zkminer_types::{Address, Hash, Header, Height};

const INBOUND_CAPACITY: usize = 1024;

/// Worker intake channels keyed by miner address.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    intakes: Arc<RwLock<HashMap<Address, mpsc::Sender<Task>>>>,
}

impl WorkerRegistry {
    pub async fn register(&self, addr: Address, intake: mpsc::Sender<Task>) {
        self.intakes.write().await.insert(addr, intake);
    }

    pub async fn unregister(&self, addr: &Address) -> bool {
        self.intakes.write().await.remove(addr).is_some()
    }

    pub async fn intake(&self, addr: &Address) -> Option<mpsc::Sender<Task>> {
        self.intakes.read().await.get(addr).cloned()
    }

    pub async fn len(&self) -> usize {
        self.intakes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.intakes.read().await.is_empty()
    }

    async fn snapshot(&self) -> Vec<(Address, mpsc::Sender<Task>)> {
        self.intakes
            .read()
            .await
            .iter()
            .map(|(addr, tx)| (*addr, tx.clone()))
            .collect()
    }

    pub(crate) async fn clear(&self) {
        self.intakes.write().await.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannerStats {
    pub tip: Height,
    pub last_coinbase_height: Height,
    pub rounds_emitted: u64,
    pub pending_tasks: u64,
    pub tasks_released: u64,
    pub tickets_submitted: u64,
    pub submit_failures: u64,
    pub stale_dropped: u64,
}

#[derive(Default)]
struct ScannerState {
    coinbase_addr: Address,
    tip: AtomicU64,
    last_coinbase_height: AtomicU64,
    last_coinbase_hash: RwLock<Hash>,
    rounds_emitted: AtomicU64,
    pending_tasks: AtomicU64,
    tasks_released: AtomicU64,
    tickets_submitted: AtomicU64,
    submit_failures: AtomicU64,
    stale_dropped: AtomicU64,
}

/// Cheap handle workers use to query the chain and hand tasks back.
#[derive(Clone)]
pub struct ScannerHandle {
    chain: Arc<dyn ChainClient>,
    inbound: mpsc::Sender<Task>,
    state: Arc<ScannerState>,
}

impl ScannerHandle {
    /// Header at `height`, or `None` if the chain has not produced it.
    pub async fn get_header(&self, height: Height) -> Result<Option<Header>> {
        Ok(self.chain.header_by_number(height).await?)
    }

    /// Parks a waiting task or submits a solved one.
    pub async fn send(&self, task: Task) -> Result<()> {
        self.inbound
            .send(task)
            .await
            .map_err(|_| MinerError::ChannelClosed("scanner inbound"))
    }

    pub fn tip(&self) -> Height {
        self.state.tip.load(Ordering::SeqCst)
    }

    /// Address credited by the configured deployment.
    pub fn coinbase_addr(&self) -> Address {
        self.state.coinbase_addr
    }

    pub async fn last_coinbase(&self) -> (Height, Hash) {
        let hash = *self.state.last_coinbase_hash.read().await;
        (self.state.last_coinbase_height.load(Ordering::SeqCst), hash)
    }

    pub fn stats(&self) -> ScannerStats {
        let s = &self.state;
        ScannerStats {
            tip: s.tip.load(Ordering::SeqCst),
            last_coinbase_height: s.last_coinbase_height.load(Ordering::SeqCst),
            rounds_emitted: s.rounds_emitted.load(Ordering::SeqCst),
            pending_tasks: s.pending_tasks.load(Ordering::SeqCst),
            tasks_released: s.tasks_released.load(Ordering::SeqCst),
            tickets_submitted: s.tickets_submitted.load(Ordering::SeqCst),
            submit_failures: s.submit_failures.load(Ordering::SeqCst),
            stale_dropped: s.stale_dropped.load(Ordering::SeqCst),
        }
    }
}

/// Owns the chain-watch loop. The loop ends on [`Scanner::shutdown`] or when
/// the scanner is dropped.
pub struct Scanner {
    handle: ScannerHandle,
    shutdown_tx: watch::Sender<bool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl Scanner {
    /// Seeds the tip and current round from the chain, then starts the loop.
    pub async fn spawn(
        chain: Arc<dyn ChainClient>,
        config: &MinerConfig,
        registry: WorkerRegistry,
    ) -> Result<Self> {
        let interval = config.coinbase_interval;
        if interval == 0 {
            return Err(MinerError::InvalidConfiguration(
                "coinbase_interval must be positive".to_string(),
            ));
        }
        let heads = chain.subscribe_new_heads();
        let latest = chain.latest_header().await?;

        let coinbase_height = latest.number - latest.number % interval;
        let coinbase_hash = if coinbase_height == latest.number {
            latest.hash
        } else {
            chain
                .header_by_number(coinbase_height)
                .await?
                .map(|h| h.hash)
                .unwrap_or_default()
        };

        let state = Arc::new(ScannerState {
            coinbase_addr: config.coinbase_addr,
            ..Default::default()
        });
        state.tip.store(latest.number, Ordering::SeqCst);
        state
            .last_coinbase_height
            .store(coinbase_height, Ordering::SeqCst);
        *state.last_coinbase_hash.write().await = coinbase_hash;

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scanner_loop = ScannerLoop {
            chain: chain.clone(),
            interval,
            inbound: inbound_rx,
            heads,
            shutdown: shutdown_rx,
            pending: BTreeMap::new(),
            registry,
            state: state.clone(),
        };
        let join = tokio::spawn(scanner_loop.run());

        info!(
            tip = latest.number,
            last_coinbase = coinbase_height,
            coinbase_interval = interval,
            coinbase_addr = %config.coinbase_addr.short(),
            "🔭 Scanner started"
        );

        Ok(Self {
            handle: ScannerHandle {
                chain,
                inbound: inbound_tx,
                state,
            },
            shutdown_tx,
            join: Mutex::new(Some(join)),
        })
    }

    pub fn handle(&self) -> ScannerHandle {
        self.handle.clone()
    }

    /// Stops the loop and waits for it. Pending tasks are dropped.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(join) = self.join.lock().await.take() {
            if let Err(e) = join.await {
                error!(error = %e, "Scanner loop panicked");
            }
        }
    }
}

struct ScannerLoop {
    chain: Arc<dyn ChainClient>,
    interval: u64,
    inbound: mpsc::Receiver<Task>,
    heads: broadcast::Receiver<Header>,
    shutdown: watch::Receiver<bool>,
    pending: BTreeMap<Height, Vec<Task>>,
    registry: WorkerRegistry,
    state: Arc<ScannerState>,
}

impl ScannerLoop {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                Some(task) = self.inbound.recv() => {
                    let step = task.step();
                    let round = task.last_coinbase_height();
                    let miner = task.miner_addr();
                    if let Err(e) = self.on_task(task).await {
                        warn!(
                            miner = %miner.short(),
                            step = %step,
                            round,
                            error = %e,
                            "Task dropped by scanner"
                        );
                    }
                }
                head = self.heads.recv() => match head {
                    Ok(header) => self.on_head(header).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Head subscription lagged, catching up");
                        self.catch_up().await;
                    }
                    Err(RecvError::Closed) => {
                        error!("Head subscription closed");
                        break;
                    }
                },
            }
        }
        info!(pending = self.pending_count(), "Scanner stopped");
    }

    fn tip(&self) -> Height {
        self.state.tip.load(Ordering::SeqCst)
    }

    fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    fn sync_pending_gauge(&self) {
        self.state
            .pending_tasks
            .store(self.pending_count() as u64, Ordering::SeqCst);
    }

    async fn on_task(&mut self, task: Task) -> Result<()> {
        match task.step() {
            TaskStep::WaitChallengeBlock => self.park(task).await,
            TaskStep::Solved => self.submit(task),
            actual => Err(MinerError::InvalidStep {
                expected: TaskStep::WaitChallengeBlock,
                actual,
            }),
        }
    }

    /// Holds a waiting task until its challenge header exists. A header that
    /// arrived while the task was in flight is handed out immediately.
    async fn park(&mut self, task: Task) -> Result<()> {
        let target = task.challenge_height();
        if target <= self.tip() {
            match self.chain.header_by_number(target).await {
                Ok(Some(header)) => return self.release(task, &header).await,
                Ok(None) => {}
                Err(e) => warn!(height = target, error = %e, "Header lookup failed, parking"),
            }
        }
        debug!(
            miner = %task.miner_addr().short(),
            challenge_height = target,
            "⏸️  Task parked"
        );
        self.pending.entry(target).or_default().push(task);
        self.sync_pending_gauge();
        Ok(())
    }

    async fn on_head(&mut self, header: Header) {
        let tip = self.tip();
        if header.number <= tip {
            debug!(height = header.number, tip, "Ignoring stale head");
            return;
        }
        if header.number > tip + 1 {
            self.fill_gap(tip + 1, header.number).await;
        }
        self.process_head(header).await;
    }

    /// Replays heights in `[from, to)` that never arrived on the subscription.
    async fn fill_gap(&mut self, from: Height, to: Height) {
        for height in from..to {
            match self.chain.header_by_number(height).await {
                Ok(Some(header)) => self.process_head(header).await,
                Ok(None) => break,
                Err(e) => {
                    warn!(height, error = %e, "Gap fill failed");
                    break;
                }
            }
        }
    }

    async fn catch_up(&mut self) {
        match self.chain.latest_header().await {
            Ok(latest) if latest.number > self.tip() => {
                let from = self.tip() + 1;
                self.fill_gap(from, latest.number).await;
                self.process_head(latest).await;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Catch-up failed"),
        }
    }

    async fn process_head(&mut self, header: Header) {
        self.state.tip.fetch_max(header.number, Ordering::SeqCst);
        if header.number % self.interval == 0 {
            self.state
                .last_coinbase_height
                .store(header.number, Ordering::SeqCst);
            *self.state.last_coinbase_hash.write().await = header.hash;
            self.emit_round(&header).await;
        }
        self.release_ready(&header).await;
    }

    /// Hands every registered worker a fresh task for the round opened by `header`.
    async fn emit_round(&self, header: &Header) {
        let workers = self.registry.snapshot().await;
        info!(
            height = header.number,
            hash = %header.hash_hex(),
            workers = workers.len(),
            "🪙 Coinbase block, starting lottery round"
        );
        for (addr, intake) in workers {
            if intake.send(Task::new(header.number, header.hash)).await.is_err() {
                debug!(miner = %addr.short(), "Worker intake closed, round skipped");
            }
        }
        self.state.rounds_emitted.fetch_add(1, Ordering::SeqCst);
    }

    async fn release_ready(&mut self, tip_header: &Header) {
        let later = self.pending.split_off(&(tip_header.number + 1));
        let ready = std::mem::replace(&mut self.pending, later);

        for (height, tasks) in ready {
            let header = if height == tip_header.number {
                Ok(Some(tip_header.clone()))
            } else {
                self.chain.header_by_number(height).await
            };
            match header {
                Ok(Some(header)) => {
                    for task in tasks {
                        let miner = task.miner_addr();
                        if let Err(e) = self.release(task, &header).await {
                            warn!(miner = %miner.short(), height, error = %e, "Release failed");
                        }
                    }
                }
                Ok(None) | Err(_) => {
                    warn!(height, count = tasks.len(), "Challenge header unavailable, re-parking");
                    self.pending.entry(height).or_default().extend(tasks);
                }
            }
        }
        self.sync_pending_gauge();
    }

    async fn release(&self, mut task: Task, header: &Header) -> Result<()> {
        task.set_header(header)?;
        let miner = task.miner_addr();
        let intake = self
            .registry
            .intake(&miner)
            .await
            .ok_or(MinerError::UnknownWorker(miner))?;

        debug!(miner = %miner.short(), height = header.number, "▶️  Challenge block arrived");
        intake
            .send(task)
            .await
            .map_err(|_| MinerError::ChannelClosed("worker intake"))?;
        self.state.tasks_released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Submits a solved ticket in the background unless its round has ended.
    fn submit(&self, task: Task) -> Result<()> {
        let round = task.last_coinbase_height();
        let tip = self.tip();
        if tip >= round + self.interval {
            self.state.stale_dropped.fetch_add(1, Ordering::SeqCst);
            return Err(MinerError::StaleTicket { round, tip });
        }

        let payload = task.lottery().to_bytes()?;
        let miner = task.miner_addr();
        let challenge_height = task.challenge_height();
        let chain = self.chain.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            match chain.submit_lottery(payload).await {
                Ok(receipt) => {
                    state.tickets_submitted.fetch_add(1, Ordering::SeqCst);
                    info!(
                        miner = %miner.short(),
                        round,
                        challenge_height,
                        receipt = %hex::encode(&receipt.id[..8]),
                        "🎟️  Lottery ticket submitted"
                    );
                }
                Err(e) => {
                    state.submit_failures.fetch_add(1, Ordering::SeqCst);
                    error!(
                        miner = %miner.short(),
                        round,
                        challenge_height,
                        error = %e,
                        "❌ Lottery submission failed"
                    );
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::wait_until;
    use std::time::Duration;
    use zkminer_chain::MemoryChain;

    async fn setup(
        interval: u64,
    ) -> (Arc<MemoryChain>, Scanner, WorkerRegistry, mpsc::Receiver<Task>, Address) {
        let chain = Arc::new(MemoryChain::new(Address::zero()));
        let registry = WorkerRegistry::default();
        let config = MinerConfig {
            coinbase_interval: interval,
            coinbase_addr: Address::from_bytes([0xcb; 20]),
            ..Default::default()
        };
        let scanner = Scanner::spawn(chain.clone(), &config, registry.clone())
            .await
            .unwrap();
        let (tx, rx) = mpsc::channel(16);
        let addr = Address::from_bytes([7u8; 20]);
        registry.register(addr, tx).await;
        (chain, scanner, registry, rx, addr)
    }

    fn waiting_task(round: &Header, index: u64, miner: Address) -> Task {
        let mut task = Task::new(round.number, round.hash);
        task.miner_addr = miner;
        task.challenge_index = index;
        task.advance(TaskStep::WaitChallengeBlock).unwrap();
        task
    }

    #[tokio::test]
    async fn test_coinbase_emits_round() {
        let (chain, scanner, _registry, mut rx, _) = setup(5).await;
        chain.mine_blocks(5).await;

        let task = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.step(), TaskStep::Start);
        assert_eq!(task.last_coinbase_height(), 5);
        assert_eq!(
            task.last_coinbase_hash(),
            &chain.header_by_number(5).await.unwrap().unwrap().hash
        );
        assert_eq!(scanner.handle().stats().rounds_emitted, 1);
        scanner.shutdown().await;
    }

    #[tokio::test]
    async fn test_parked_task_released_on_header() {
        let (chain, scanner, _registry, mut rx, addr) = setup(5).await;
        let round = chain.mine_blocks(5).await;
        let _start = rx.recv().await.unwrap();

        let handle = scanner.handle();
        handle.send(waiting_task(&round, 2, addr)).await.unwrap();
        wait_until(|| handle.stats().pending_tasks == 1).await;

        chain.mine_block().await;
        assert_eq!(handle.stats().pending_tasks, 1);

        let challenge = chain.mine_block().await;
        let task = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.step(), TaskStep::GotChallengeBlock);
        assert_eq!(task.lottery().challenge_header_hash, challenge.hash);
        assert_eq!(handle.stats().pending_tasks, 0);
        scanner.shutdown().await;
    }

    #[tokio::test]
    async fn test_existing_header_released_immediately() {
        let (chain, scanner, _registry, mut rx, addr) = setup(5).await;
        let round = chain.mine_blocks(5).await;
        let _start = rx.recv().await.unwrap();
        chain.mine_blocks(2).await;
        wait_until(|| scanner.handle().stats().tip == 7).await;

        scanner.handle().send(waiting_task(&round, 1, addr)).await.unwrap();
        let task = rx.recv().await.unwrap();
        assert_eq!(task.step(), TaskStep::GotChallengeBlock);
        assert_eq!(task.challenge_height(), 6);
        scanner.shutdown().await;
    }

    #[tokio::test]
    async fn test_tracks_round_and_coinbase_addr() {
        let (chain, scanner, _registry, mut rx, _) = setup(5).await;
        let handle = scanner.handle();
        assert_eq!(handle.coinbase_addr(), Address::from_bytes([0xcb; 20]));
        let genesis = chain.header_by_number(0).await.unwrap().unwrap();
        assert_eq!(handle.last_coinbase().await, (0, genesis.hash));

        let round = chain.mine_blocks(5).await;
        let _start = rx.recv().await.unwrap();
        assert_eq!(handle.last_coinbase().await, (5, round.hash));

        chain.mine_blocks(2).await;
        wait_until(|| handle.tip() == 7).await;
        assert_eq!(handle.last_coinbase().await, (5, round.hash));
        scanner.shutdown().await;
    }

    #[tokio::test]
    async fn test_get_header_never_waits() {
        let (chain, scanner, _registry, _rx, _) = setup(5).await;
        let mined = chain.mine_blocks(3).await;

        let handle = scanner.handle();
        assert_eq!(handle.get_header(3).await.unwrap(), Some(mined));
        assert_eq!(handle.get_header(4).await.unwrap(), None);
        scanner.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_task_is_protocol_error() {
        let (_chain, scanner, _registry, _rx, _) = setup(5).await;
        scanner.handle().send(Task::new(0, [0u8; 32])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scanner.handle().stats().pending_tasks, 0);
        scanner.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (_chain, scanner, registry, _rx, _) = setup(5).await;
        scanner.shutdown().await;
        scanner.shutdown().await;
        assert_eq!(registry.len().await, 1);
    }
}
