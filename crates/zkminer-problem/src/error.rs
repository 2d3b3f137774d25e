use ark_relations::r1cs::SynthesisError;
use ark_serialize::SerializationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProblemError {
    #[error("Preimage too long: {0} bytes (max 32)")]
    PreimageTooLong(usize),

    #[error("Constraint synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Unsatisfied constraint system")]
    Unsatisfied,

    #[error("Key serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Key file error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProblemError>;
