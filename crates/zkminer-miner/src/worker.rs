//! Per-key lottery worker.
//!
//! Each worker runs one dispatch loop that never blocks: START tasks are
//! admitted only if a task slot is free right now, GOT_CHALLENGE_BLOCK tasks
//! belong to an already admitted round and wait for a slot inside their own
//! handler. Proving runs on the blocking pool.

use crate::config::MinerConfig;
use crate::error::{MinerError, Result};
use crate::lottery::eligibility_preimage;
use crate::scanner::ScannerHandle;
use crate::task::{Task, TaskStep};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{mpsc, watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use zkminer_crypto::{keccak256, Keypair};
use zkminer_problem::EligibilityProver;
use zkminer_types::{Address, Header, PublicKey};
use zkminer_vrf::{challenge_range, select_challenge_index, VrfPublicKey, VrfSecretKey};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub rounds_started: u64,
    pub tasks_parked: u64,
    pub proofs_solved: u64,
    pub failures: u64,
    pub rejected: u64,
    pub dropped: u64,
    pub working_task_cnt: usize,
}

#[derive(Default)]
struct Counters {
    rounds_started: AtomicU64,
    tasks_parked: AtomicU64,
    proofs_solved: AtomicU64,
    failures: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
}

struct WorkerInner {
    keypair: Keypair,
    vrf_key: VrfSecretKey,
    address: Address,
    coinbase_interval: u64,
    submit_advance: u64,
    scanner: ScannerHandle,
    prover: Arc<dyn EligibilityProver>,
    permits: Arc<Semaphore>,
    running: AtomicBool,
    closed: AtomicBool,
    working_task_cnt: AtomicUsize,
    counters: Counters,
    intake_tx: mpsc::Sender<Task>,
    exit_tx: watch::Sender<bool>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Cloning yields another handle to the same worker. The dispatch loop only
/// holds a weak reference, so dropping the last handle also ends the loop.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

/// Holds a task slot; releasing it decrements `working_task_cnt`.
struct TaskSlot {
    _permit: OwnedSemaphorePermit,
    worker: Worker,
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.worker
            .inner
            .working_task_cnt
            .fetch_sub(1, Ordering::SeqCst);
    }
}

impl Worker {
    /// Builds the worker and starts its dispatch loop. The worker begins
    /// stopped: tasks are dropped until [`Worker::start`].
    pub fn spawn(
        keypair: Keypair,
        config: &MinerConfig,
        scanner: ScannerHandle,
        prover: Arc<dyn EligibilityProver>,
    ) -> Result<Self> {
        challenge_range(config.coinbase_interval, config.submit_advance)?;
        let vrf_key = VrfSecretKey::from_keypair(&keypair)?;
        let (intake_tx, intake_rx) = mpsc::channel(config.intake_capacity.max(1));
        let (exit_tx, exit_rx) = watch::channel(false);

        let worker = Self {
            inner: Arc::new(WorkerInner {
                address: keypair.address(),
                keypair,
                vrf_key,
                coinbase_interval: config.coinbase_interval,
                submit_advance: config.submit_advance,
                scanner,
                prover,
                permits: Arc::new(Semaphore::new(config.max_task_cnt)),
                running: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                working_task_cnt: AtomicUsize::new(0),
                counters: Counters::default(),
                intake_tx,
                exit_tx,
                loop_handle: Mutex::new(None),
            }),
        };

        let handle = tokio::spawn(Self::run(
            Arc::downgrade(&worker.inner),
            worker.inner.address,
            intake_rx,
            exit_rx,
        ));
        if let Ok(mut slot) = worker.inner.loop_handle.try_lock() {
            *slot = Some(handle);
        }
        Ok(worker)
    }

    pub fn address(&self) -> Address {
        self.inner.address
    }

    pub fn public_key(&self) -> &PublicKey {
        self.inner.keypair.public_key()
    }

    pub fn vrf_public_key(&self) -> VrfPublicKey {
        self.inner.vrf_key.public()
    }

    /// Sender side of the intake channel.
    pub fn intake(&self) -> mpsc::Sender<Task> {
        self.inner.intake_tx.clone()
    }

    pub fn start(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(MinerError::WorkerClosed(self.inner.address));
        }
        if !self.inner.running.swap(true, Ordering::SeqCst) {
            info!(miner = %self.inner.address.short(), "▶️  Worker started");
        }
        Ok(())
    }

    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            info!(miner = %self.inner.address.short(), "⏹️  Worker stopped");
        }
    }

    /// Stops the worker and ends its loop. Only the first call has effect.
    pub fn close(&self) {
        if self
            .inner
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.inner.running.store(false, Ordering::SeqCst);
        let _ = self.inner.exit_tx.send(true);
        info!(miner = %self.inner.address.short(), "Worker closed");
    }

    /// Waits for the dispatch loop to finish after [`Worker::close`].
    pub async fn join(&self) {
        if let Some(handle) = self.inner.loop_handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!(miner = %self.inner.address.short(), error = %e, "Worker loop panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn working_task_cnt(&self) -> usize {
        self.inner.working_task_cnt.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> WorkerStats {
        let c = &self.inner.counters;
        WorkerStats {
            rounds_started: c.rounds_started.load(Ordering::SeqCst),
            tasks_parked: c.tasks_parked.load(Ordering::SeqCst),
            proofs_solved: c.proofs_solved.load(Ordering::SeqCst),
            failures: c.failures.load(Ordering::SeqCst),
            rejected: c.rejected.load(Ordering::SeqCst),
            dropped: c.dropped.load(Ordering::SeqCst),
            working_task_cnt: self.working_task_cnt(),
        }
    }

    async fn run(
        inner: Weak<WorkerInner>,
        address: Address,
        mut intake: mpsc::Receiver<Task>,
        mut exit: watch::Receiver<bool>,
    ) {
        debug!(miner = %address.short(), "Worker loop running");
        loop {
            tokio::select! {
                biased;
                // Also fires when the last handle drops the sender
                _ = exit.changed() => break,
                task = intake.recv() => {
                    let (Some(task), Some(inner)) = (task, inner.upgrade()) else {
                        break;
                    };
                    let worker = Worker { inner };
                    let step = task.step();
                    let round = task.last_coinbase_height();
                    if let Err(e) = worker.dispatch(task) {
                        worker.inner.counters.rejected.fetch_add(1, Ordering::SeqCst);
                        warn!(
                            miner = %address.short(),
                            step = %step,
                            round,
                            error = %e,
                            "Task rejected"
                        );
                    }
                }
            }
        }
        if let Some(inner) = inner.upgrade() {
            inner.running.store(false, Ordering::SeqCst);
        }
        debug!(miner = %address.short(), "Worker loop exited");
    }

    fn occupy(&self, permit: OwnedSemaphorePermit) -> TaskSlot {
        self.inner.working_task_cnt.fetch_add(1, Ordering::SeqCst);
        TaskSlot {
            _permit: permit,
            worker: self.clone(),
        }
    }

    /// Routes one intake task to a handler without waiting on it.
    fn dispatch(&self, task: Task) -> Result<()> {
        if !self.is_running() {
            self.inner.counters.dropped.fetch_add(1, Ordering::SeqCst);
            debug!(
                miner = %self.inner.address.short(),
                step = %task.step(),
                round = task.last_coinbase_height(),
                "Worker stopped, task dropped"
            );
            return Ok(());
        }

        match task.step() {
            TaskStep::Start => {
                let round = task.last_coinbase_height();
                let permit = self
                    .inner
                    .permits
                    .clone()
                    .try_acquire_owned()
                    .map_err(|_| MinerError::TaskRejected {
                        round,
                        reason: "all task slots busy".to_string(),
                    })?;
                let slot = self.occupy(permit);
                let worker = self.clone();
                tokio::spawn(async move {
                    let _slot = slot;
                    if let Err(e) = worker.handle_start_task(task).await {
                        worker.record_failure(TaskStep::Start, round, &e);
                    }
                });
                Ok(())
            }
            TaskStep::GotChallengeBlock => {
                let worker = self.clone();
                tokio::spawn(async move {
                    let round = task.last_coinbase_height();
                    let Ok(permit) = worker.inner.permits.clone().acquire_owned().await else {
                        return;
                    };
                    let _slot = worker.occupy(permit);
                    if let Err(e) = worker.handle_challenged_task(task).await {
                        worker.record_failure(TaskStep::GotChallengeBlock, round, &e);
                    }
                });
                Ok(())
            }
            actual => Err(MinerError::InvalidStep {
                expected: TaskStep::Start,
                actual,
            }),
        }
    }

    fn record_failure(&self, step: TaskStep, round: u64, e: &MinerError) {
        self.inner.counters.failures.fetch_add(1, Ordering::SeqCst);
        error!(
            miner = %self.inner.address.short(),
            step = %step,
            round,
            error = %e,
            "❌ Lottery task failed"
        );
    }

    /// Opens a round: evaluates the VRF, picks the challenge height and either
    /// proceeds with the header or parks the task with the scanner.
    pub async fn handle_start_task(&self, mut task: Task) -> Result<()> {
        task.expect_step(TaskStep::Start)?;
        let range = challenge_range(self.inner.coinbase_interval, self.inner.submit_advance)?;

        let output = zkminer_vrf::evaluate(&self.inner.vrf_key, task.last_coinbase_hash())?;
        let index = select_challenge_index(&output.index, range)?;

        task.miner_addr = self.inner.address;
        task.lottery.miner_addr = self.inner.address;
        task.lottery.vrf_index = output.index.to_vec();
        task.lottery.vrf_proof = output.proof;
        task.challenge_index = index;
        task.advance(TaskStep::WaitChallengeBlock)?;
        self.inner.counters.rounds_started.fetch_add(1, Ordering::SeqCst);

        let challenge_height = task.challenge_height();
        info!(
            miner = %self.inner.address.short(),
            round = task.last_coinbase_height(),
            challenge_index = index,
            challenge_height,
            "🎲 VRF evaluated"
        );

        match self.inner.scanner.get_header(challenge_height).await {
            Ok(Some(header)) => self.handle_task_after_challenge(&header, task).await,
            Ok(None) => self.handle_task_before_challenge(task).await,
            Err(e) => {
                warn!(
                    miner = %self.inner.address.short(),
                    challenge_height,
                    error = %e,
                    "Challenge header lookup failed, parking task"
                );
                self.handle_task_before_challenge(task).await
            }
        }
    }

    async fn handle_task_before_challenge(&self, task: Task) -> Result<()> {
        self.inner.counters.tasks_parked.fetch_add(1, Ordering::SeqCst);
        self.inner.scanner.send(task).await
    }

    /// Binds the challenge header and goes straight to solving.
    pub async fn handle_task_after_challenge(&self, header: &Header, mut task: Task) -> Result<()> {
        task.set_header(header)?;
        self.handle_challenged_task(task).await
    }

    /// Solves on the blocking pool, then forwards the ticket for submission.
    pub async fn handle_challenged_task(&self, task: Task) -> Result<()> {
        task.expect_step(TaskStep::GotChallengeBlock)?;
        let worker = self.clone();
        let (task, solved) = tokio::task::spawn_blocking(move || {
            let mut task = task;
            let solved = worker.solve_problem(&mut task);
            (task, solved)
        })
        .await
        .map_err(|e| MinerError::ZkpProof(format!("prover thread failed: {e}")))?;
        solved?;

        self.inner.scanner.send(task).await
    }

    /// Proves eligibility for the bound challenge and signs the ticket. On
    /// error the task keeps its step.
    pub fn solve_problem(&self, task: &mut Task) -> Result<()> {
        task.expect_step(TaskStep::GotChallengeBlock)?;
        let start = Instant::now();

        let preimage = eligibility_preimage(&task.miner_addr, &task.lottery.challenge_header_hash);
        let proof = self
            .inner
            .prover
            .prove(&preimage)
            .map_err(|e| MinerError::ZkpProof(e.to_string()))?;
        if proof.mimc_hash.is_empty() || proof.zkp_proof.is_empty() {
            return Err(MinerError::ZkpProof("prover returned empty output".to_string()));
        }

        task.lottery.mimc_hash = proof.mimc_hash;
        task.lottery.zkp_proof = proof.zkp_proof;
        self.sign_lottery(task)?;
        task.advance(TaskStep::Solved)?;
        self.inner.counters.proofs_solved.fetch_add(1, Ordering::SeqCst);

        info!(
            miner = %self.inner.address.short(),
            round = task.last_coinbase_height(),
            challenge_height = task.challenge_height(),
            duration_ms = start.elapsed().as_millis() as u64,
            "🔐 Eligibility proof solved"
        );
        Ok(())
    }

    /// Signs keccak256 of the ticket's signable bytes.
    pub fn sign_lottery(&self, task: &mut Task) -> Result<()> {
        let bytes = task.lottery.signable_bytes()?;
        let signature = self.inner.keypair.sign_digest(&keccak256(&[&bytes]))?;
        task.lottery.signature = signature.clone();
        task.signature = signature;
        Ok(())
    }
}
