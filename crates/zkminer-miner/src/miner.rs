use crate::config::MinerConfig;
use crate::error::{MinerError, Result};
use crate::scanner::{Scanner, ScannerHandle, WorkerRegistry};
use crate::worker::Worker;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use zkminer_chain::ChainClient;
use zkminer_crypto::Keypair;
use zkminer_problem::{compile_circuit, EligibilityProver, Groth16Prover, ProvingKey};
use zkminer_types::Address;

/// Owns the scanner and every worker, and wires their channels.
pub struct Miner {
    config: MinerConfig,
    prover: Arc<dyn EligibilityProver>,
    scanner: Scanner,
    registry: WorkerRegistry,
    workers: RwLock<HashMap<Address, Worker>>,
    running: AtomicBool,
    closed: AtomicBool,
}

impl Miner {
    /// Loads the proving key from `pk_path` and builds a Groth16-backed miner
    /// with one worker per configured key.
    pub async fn new(config: MinerConfig, chain: Arc<dyn ChainClient>) -> Result<Self> {
        config.validate()?;
        let proving_key = ProvingKey::load_from_file(&config.pk_path)?;
        let compiled = compile_circuit()?;
        info!(
            pk_path = %config.pk_path.display(),
            constraints = compiled.num_constraints(),
            "🔑 Proving key loaded"
        );
        let prover = Arc::new(Groth16Prover::new(compiled, proving_key));
        Self::with_prover(config, chain, prover).await
    }

    pub async fn with_prover(
        config: MinerConfig,
        chain: Arc<dyn ChainClient>,
        prover: Arc<dyn EligibilityProver>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = WorkerRegistry::default();
        let scanner = Scanner::spawn(chain, &config, registry.clone()).await?;
        let keys = config.miner_keys.clone();

        let miner = Self {
            config,
            prover,
            scanner,
            registry,
            workers: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        };
        for key in keys {
            miner.new_worker(key).await?;
        }
        Ok(miner)
    }

    /// Adds a worker for `keypair`. It joins from the next coinbase round and
    /// is started right away if the miner is running.
    pub async fn new_worker(&self, keypair: Keypair) -> Result<Address> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MinerError::MinerClosed);
        }
        let addr = keypair.address();
        let mut workers = self.workers.write().await;
        if workers.contains_key(&addr) {
            return Err(MinerError::DuplicateWorker(addr));
        }
        if workers.len() >= self.config.max_worker_cnt {
            return Err(MinerError::WorkerLimitReached(self.config.max_worker_cnt));
        }

        let worker = Worker::spawn(
            keypair,
            &self.config,
            self.scanner.handle(),
            self.prover.clone(),
        )?;
        if self.running.load(Ordering::SeqCst) {
            worker.start()?;
        }
        self.registry.register(addr, worker.intake()).await;
        workers.insert(addr, worker);

        info!(miner = %addr, workers = workers.len(), "👷 Worker registered");
        Ok(addr)
    }

    /// Closes the worker for `addr` and stops routing rounds to it.
    pub async fn remove_worker(&self, addr: &Address) -> Result<()> {
        let worker = self
            .workers
            .write()
            .await
            .remove(addr)
            .ok_or(MinerError::UnknownWorker(*addr))?;
        self.registry.unregister(addr).await;
        worker.close();
        worker.join().await;
        info!(miner = %addr, "Worker removed");
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MinerError::MinerClosed);
        }
        self.running.store(true, Ordering::SeqCst);
        let workers = self.workers.read().await;
        for worker in workers.values() {
            worker.start()?;
        }
        info!(workers = workers.len(), "⛏️  Miner started");
        Ok(())
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        for worker in self.workers.read().await.values() {
            worker.stop();
        }
        info!("Miner stopped");
    }

    /// Closes every worker and the scanner. Only the first call has effect.
    pub async fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        self.registry.clear().await;

        let workers: Vec<Worker> = self.workers.write().await.drain().map(|(_, w)| w).collect();
        for worker in &workers {
            worker.close();
        }
        for worker in &workers {
            worker.join().await;
        }
        self.scanner.shutdown().await;
        info!(workers = workers.len(), "Miner closed");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    pub fn scanner(&self) -> ScannerHandle {
        self.scanner.handle()
    }

    pub async fn worker(&self, addr: &Address) -> Result<Worker> {
        self.workers
            .read()
            .await
            .get(addr)
            .cloned()
            .ok_or(MinerError::UnknownWorker(*addr))
    }

    pub async fn worker_addresses(&self) -> Vec<Address> {
        let mut addrs: Vec<Address> = self.workers.read().await.keys().copied().collect();
        addrs.sort();
        addrs
    }
}
