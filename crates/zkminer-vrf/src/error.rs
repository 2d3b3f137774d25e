use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VrfError {
    #[error("Invalid VRF secret key: {0}")]
    InvalidSecretKey(String),

    #[error("Invalid VRF public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid VRF proof: {0}")]
    InvalidProof(String),

    #[error("Challenge range must be positive (interval {interval}, advance {advance})")]
    EmptyChallengeRange { interval: u64, advance: u64 },
}

pub type Result<T> = std::result::Result<T, VrfError>;
