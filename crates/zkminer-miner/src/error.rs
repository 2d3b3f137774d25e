use crate::task::TaskStep;
use thiserror::Error;
use zkminer_chain::ChainError;
use zkminer_crypto::CryptoError;
use zkminer_problem::ProblemError;
use zkminer_types::{Address, Height};
use zkminer_vrf::VrfError;

pub type Result<T> = std::result::Result<T, MinerError>;

#[derive(Debug, Error)]
pub enum MinerError {
    #[error("Invalid task step: expected {expected}, got {actual}")]
    InvalidStep { expected: TaskStep, actual: TaskStep },

    #[error("ZKP proof failed: {0}")]
    ZkpProof(String),

    #[error("VRF error: {0}")]
    Vrf(#[from] VrfError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Signing error: {0}")]
    Signing(#[from] CryptoError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Proving key error: {0}")]
    ProvingKey(#[from] ProblemError),

    #[error("Worker {0} is closed")]
    WorkerClosed(Address),

    #[error("Miner is closed")]
    MinerClosed,

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Unknown worker: {0}")]
    UnknownWorker(Address),

    #[error("Worker {0} already registered")]
    DuplicateWorker(Address),

    #[error("Worker limit reached: {0}")]
    WorkerLimitReached(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Task for round {round} rejected: {reason}")]
    TaskRejected { round: Height, reason: String },

    #[error("Ticket for round {round} is stale at tip {tip}")]
    StaleTicket { round: Height, tip: Height },

    #[error("Invalid ticket: {0}")]
    InvalidTicket(String),
}
