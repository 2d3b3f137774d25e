/*!
# zkminer-problem

The eligibility problem behind every lottery ticket: a miner proves it knows
a preimage `p` such that `MiMC(p) = h` for a public `h`, without revealing
`p` inside the proof itself.

- [`mimc`]: MiMC-7 over the BN254 scalar field, natively and as an R1CS gadget
- [`circuit`]: the constraint system and its compiled form
- [`keys`]: Groth16 proving/verifying keys with byte and file encodings
- [`prover`]: proof generation and verification

Keys come from a circuit-specific trusted setup ([`setup_zkp`]); every call
draws fresh randomness, so two setups never produce interchangeable keys.
*/

pub mod circuit;
pub mod error;
pub mod keys;
pub mod mimc;
pub mod prover;

pub use circuit::{compile_circuit, CompiledCircuit, EligibilityCircuit};
pub use error::{ProblemError, Result};
pub use keys::{setup_zkp, ProvingKey, VerifyingKey};
pub use mimc::{mimc_hash, MimcParams, MIMC_ROUNDS};
pub use prover::{verify, EligibilityProof, EligibilityProver, Groth16Prover};

/// Largest preimage accepted by the circuit, in bytes.
pub const MAX_PREIMAGE_LENGTH: usize = 32;
/// Width of the public MiMC hash encoding.
pub const HASH_LENGTH: usize = 32;
