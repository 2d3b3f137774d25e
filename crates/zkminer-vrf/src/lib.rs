pub mod challenge;
pub mod engine;
pub mod error;

pub use challenge::{challenge_range, select_challenge_index};
pub use engine::{
    evaluate, verify, VrfOutput, VrfPublicKey, VrfSecretKey, VRF_OUTPUT_LENGTH, VRF_PROOF_LENGTH,
};
pub use error::{Result, VrfError};
