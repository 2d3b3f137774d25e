//! MiMC-7 in Miyaguchi-Preneel mode with a zero initial state, the same
//! construction used for Ethereum-style MiMC hashes over BN254.
//!
//! For a single field element `m`: `H(m) = E_0(m) + m`, where `E_k` runs
//! [`MIMC_ROUNDS`] rounds of `x <- (x + k + c_i)^7` and adds `k` at the end.
//! Round constants are `c_0 = keccak256("seed")`, `c_{i+1} = keccak256(c_i)`,
//! each reduced into the field.

use crate::error::{ProblemError, Result};
use crate::{HASH_LENGTH, MAX_PREIMAGE_LENGTH};
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::fields::FieldVar;
use ark_relations::r1cs::SynthesisError;
use sha3::{Digest, Keccak256};
use std::sync::{Arc, OnceLock};

pub const MIMC_ROUNDS: usize = 91;
const MIMC_SEED: &[u8] = b"seed";

#[derive(Debug, Clone)]
pub struct MimcParams {
    constants: Vec<Fr>,
}

impl MimcParams {
    pub fn new(seed: &[u8], rounds: usize) -> Self {
        let mut constants = Vec::with_capacity(rounds);
        let mut digest: [u8; 32] = Keccak256::digest(seed).into();
        for _ in 0..rounds {
            constants.push(Fr::from_be_bytes_mod_order(&digest));
            digest = Keccak256::digest(digest).into();
        }
        Self { constants }
    }

    /// Parameters shared by the circuit, the prover and the verifier.
    pub fn shared() -> Arc<MimcParams> {
        static PARAMS: OnceLock<Arc<MimcParams>> = OnceLock::new();
        PARAMS
            .get_or_init(|| Arc::new(MimcParams::new(MIMC_SEED, MIMC_ROUNDS)))
            .clone()
    }

    pub fn rounds(&self) -> usize {
        self.constants.len()
    }

    pub fn hash(&self, message: Fr) -> Fr {
        let mut x = message;
        for c in &self.constants {
            let t = x + c;
            let t2 = t * t;
            let t4 = t2 * t2;
            x = t4 * t2 * t;
        }
        x + message
    }

    /// In-circuit counterpart of [`MimcParams::hash`]: four constraints per round.
    pub fn hash_var(&self, message: &FpVar<Fr>) -> std::result::Result<FpVar<Fr>, SynthesisError> {
        let mut x = message.clone();
        for c in &self.constants {
            let t = &x + FpVar::constant(*c);
            let t2 = t.square()?;
            let t4 = t2.square()?;
            x = &(&t4 * &t2) * &t;
        }
        Ok(x + message)
    }
}

/// Reads a preimage of at most 32 bytes as a big-endian field element.
pub fn preimage_to_field(preimage: &[u8]) -> Result<Fr> {
    if preimage.len() > MAX_PREIMAGE_LENGTH {
        return Err(ProblemError::PreimageTooLong(preimage.len()));
    }
    Ok(Fr::from_be_bytes_mod_order(preimage))
}

pub fn field_to_bytes(value: &Fr) -> [u8; HASH_LENGTH] {
    let bytes = value.into_bigint().to_bytes_be();
    let mut out = [0u8; HASH_LENGTH];
    out[HASH_LENGTH - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// Parses a canonical 32-byte big-endian encoding. Values at or above the
/// field modulus are rejected rather than reduced.
pub fn field_from_bytes(bytes: &[u8]) -> Option<Fr> {
    if bytes.len() != HASH_LENGTH {
        return None;
    }
    let value = Fr::from_be_bytes_mod_order(bytes);
    (field_to_bytes(&value)[..] == bytes[..]).then_some(value)
}

/// Native MiMC hash of a preimage, in its 32-byte public encoding.
pub fn mimc_hash(preimage: &[u8]) -> Result<[u8; HASH_LENGTH]> {
    let message = preimage_to_field(preimage)?;
    Ok(field_to_bytes(&MimcParams::shared().hash(message)))
}
