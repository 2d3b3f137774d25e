//! schnorrkel VRF over the last coinbase hash.
//!
//! Evaluation is deterministic for a given (secret, seed): the proof nonce is
//! drawn from a ChaCha20 stream keyed by keccak256(secret || seed) instead of
//! the thread RNG, so re-evaluating yields byte-identical proofs.

use crate::error::{Result, VrfError};
use merlin::Transcript;
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use schnorrkel::context::attach_rng;
use schnorrkel::keys::{ExpansionMode, Keypair as SrKeypair, MiniSecretKey, PublicKey as SrPublicKey};
use schnorrkel::signing_context;
use schnorrkel::vrf::{VRFPreOut, VRFProof};
use std::fmt;
use tracing::debug;
use zkminer_crypto::{keccak256, Keypair};

const VRF_SIGNING_CONTEXT: &[u8] = b"zkminer.lottery.vrf";
const VRF_OUTPUT_CONTEXT: &[u8] = b"zkminer.lottery.index";
const VRF_EXTRA_LABEL: &[u8] = b"VRF";

pub const VRF_OUTPUT_LENGTH: usize = 32;
pub const VRF_PREOUT_LENGTH: usize = 32;
/// Serialized proof: pre-output followed by the DLEQ proof.
pub const VRF_PROOF_LENGTH: usize = VRF_PREOUT_LENGTH + schnorrkel::vrf::VRF_PROOF_LENGTH;

#[derive(Clone)]
pub struct VrfSecretKey {
    seed: [u8; 32],
    keypair: SrKeypair,
}

impl VrfSecretKey {
    pub fn from_seed(seed: [u8; 32]) -> Result<Self> {
        let mini = MiniSecretKey::from_bytes(&seed)
            .map_err(|e| VrfError::InvalidSecretKey(e.to_string()))?;
        Ok(Self {
            seed,
            keypair: mini.expand_to_keypair(ExpansionMode::Ed25519),
        })
    }

    /// Derives the VRF key from the miner's signing secret.
    pub fn from_keypair(keypair: &Keypair) -> Result<Self> {
        Self::from_seed(keypair.to_bytes())
    }

    pub fn public(&self) -> VrfPublicKey {
        VrfPublicKey {
            inner: self.keypair.public,
        }
    }
}

impl fmt::Debug for VrfSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VrfSecretKey")
            .field("public", &self.public())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VrfPublicKey {
    inner: SrPublicKey,
}

impl VrfPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        SrPublicKey::from_bytes(bytes)
            .map(|inner| Self { inner })
            .map_err(|e| VrfError::InvalidPublicKey(e.to_string()))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl fmt::Debug for VrfPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VrfPublicKey({}...)", &self.to_hex()[..8])
    }
}

/// Pseudorandom output plus the proof that it belongs to the key and seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrfOutput {
    pub index: [u8; VRF_OUTPUT_LENGTH],
    pub proof: Vec<u8>,
}

pub fn evaluate(secret: &VrfSecretKey, seed: &[u8]) -> Result<VrfOutput> {
    let ctx = signing_context(VRF_SIGNING_CONTEXT);
    let nonce_seed = keccak256(&[&secret.seed, seed]);
    let extra = attach_rng(
        Transcript::new(VRF_EXTRA_LABEL),
        ChaCha20Rng::from_seed(nonce_seed),
    );

    let (inout, proof, _) = secret.keypair.vrf_sign_extra(ctx.bytes(seed), extra);
    let index: [u8; VRF_OUTPUT_LENGTH] = inout.make_bytes(VRF_OUTPUT_CONTEXT);

    let mut encoded = Vec::with_capacity(VRF_PROOF_LENGTH);
    encoded.extend_from_slice(&inout.to_preout().to_bytes());
    encoded.extend_from_slice(&proof.to_bytes());

    debug!(
        seed = %hex::encode(seed),
        index = %hex::encode(index),
        "VRF evaluated"
    );

    Ok(VrfOutput {
        index,
        proof: encoded,
    })
}

/// True iff `index` is the VRF output of `public` on `seed` and `proof` attests it.
pub fn verify(public: &VrfPublicKey, seed: &[u8], index: &[u8], proof: &[u8]) -> bool {
    if proof.len() != VRF_PROOF_LENGTH || index.len() != VRF_OUTPUT_LENGTH {
        return false;
    }
    let (preout_bytes, proof_bytes) = proof.split_at(VRF_PREOUT_LENGTH);

    let Ok(preout) = VRFPreOut::from_bytes(preout_bytes) else {
        return false;
    };
    let Ok(proof) = VRFProof::from_bytes(proof_bytes) else {
        return false;
    };

    let ctx = signing_context(VRF_SIGNING_CONTEXT);
    match public.inner.vrf_verify(ctx.bytes(seed), &preout, &proof) {
        Ok((inout, _)) => {
            let expected: [u8; VRF_OUTPUT_LENGTH] = inout.make_bytes(VRF_OUTPUT_CONTEXT);
            expected[..] == index[..]
        }
        Err(_) => false,
    }
}
