use crate::circuit::CompiledCircuit;
use crate::error::{ProblemError, Result};
use crate::keys::{ProvingKey, VerifyingKey};
use crate::mimc::{field_from_bytes, field_to_bytes, preimage_to_field, MimcParams};
use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, Proof};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use rand::rngs::OsRng;
use std::time::Instant;
use tracing::{debug, warn};

/// Public hash and serialized proof for one preimage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityProof {
    pub mimc_hash: Vec<u8>,
    pub zkp_proof: Vec<u8>,
}

/// Produces eligibility proofs. Implementations must be callable from
/// many blocking threads at once.
pub trait EligibilityProver: Send + Sync {
    fn prove(&self, preimage: &[u8]) -> Result<EligibilityProof>;
}

#[derive(Debug, Clone)]
pub struct Groth16Prover {
    compiled: CompiledCircuit,
    proving_key: ProvingKey,
}

impl Groth16Prover {
    pub fn new(compiled: CompiledCircuit, proving_key: ProvingKey) -> Self {
        Self {
            compiled,
            proving_key,
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.proving_key.verifying_key()
    }
}

impl EligibilityProver for Groth16Prover {
    fn prove(&self, preimage: &[u8]) -> Result<EligibilityProof> {
        let start = Instant::now();
        let message = preimage_to_field(preimage)?;
        let circuit = self.compiled.with_witness(message);
        let hash = circuit.hash.ok_or(ProblemError::Unsatisfied)?;

        let proof =
            <Groth16<Bn254> as SNARK<Fr>>::prove(&self.proving_key.0, circuit, &mut OsRng)?;

        let mut zkp_proof = Vec::with_capacity(proof.compressed_size());
        proof.serialize_compressed(&mut zkp_proof)?;

        debug!(
            proof_len = zkp_proof.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Eligibility proof generated"
        );

        Ok(EligibilityProof {
            mimc_hash: field_to_bytes(&hash).to_vec(),
            zkp_proof,
        })
    }
}

/// Checks that `proof` attests knowledge of `preimage` hashing to `public_hash`.
///
/// The preimage is recomputed natively first, so a valid proof paired with
/// the wrong preimage is still rejected.
pub fn verify(vk: &VerifyingKey, preimage: &[u8], public_hash: &[u8], proof: &[u8]) -> bool {
    let Ok(message) = preimage_to_field(preimage) else {
        return false;
    };
    let Some(hash) = field_from_bytes(public_hash) else {
        return false;
    };
    if MimcParams::shared().hash(message) != hash {
        return false;
    }

    let Ok(proof) = Proof::<Bn254>::deserialize_compressed(proof) else {
        return false;
    };
    match <Groth16<Bn254> as SNARK<Fr>>::verify(&vk.0, &[hash], &proof) {
        Ok(valid) => valid,
        Err(e) => {
            warn!(error = %e, "Groth16 verification errored");
            false
        }
    }
}
