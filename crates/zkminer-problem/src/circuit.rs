use crate::error::Result;
use crate::mimc::MimcParams;
use ark_bn254::Fr;
use ark_r1cs_std::alloc::AllocVar;
use ark_r1cs_std::eq::EqGadget;
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::ns;
use ark_relations::r1cs::{
    ConstraintSynthesizer, ConstraintSystem, ConstraintSystemRef, SynthesisError, SynthesisMode,
};
use std::sync::Arc;
use tracing::debug;

/// `MiMC(preimage) == hash`, with the preimage private and the hash public.
#[derive(Clone)]
pub struct EligibilityCircuit {
    params: Arc<MimcParams>,
    pub preimage: Option<Fr>,
    pub hash: Option<Fr>,
}

impl EligibilityCircuit {
    /// Shape-only instance used for setup.
    pub fn blank(params: Arc<MimcParams>) -> Self {
        Self {
            params,
            preimage: None,
            hash: None,
        }
    }

    pub fn with_witness(params: Arc<MimcParams>, preimage: Fr) -> Self {
        let hash = params.hash(preimage);
        Self {
            params,
            preimage: Some(preimage),
            hash: Some(hash),
        }
    }
}

impl ConstraintSynthesizer<Fr> for EligibilityCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> std::result::Result<(), SynthesisError> {
        let hash = FpVar::new_input(ns!(cs, "hash"), || {
            self.hash.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let preimage = FpVar::new_witness(ns!(cs, "preimage"), || {
            self.preimage.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let computed = self.params.hash_var(&preimage)?;
        computed.enforce_equal(&hash)
    }
}

/// The eligibility circuit with its parameters fixed and its shape measured.
#[derive(Debug, Clone)]
pub struct CompiledCircuit {
    params: Arc<MimcParams>,
    num_constraints: usize,
    num_public_inputs: usize,
}

impl CompiledCircuit {
    pub fn params(&self) -> &Arc<MimcParams> {
        &self.params
    }

    pub fn num_constraints(&self) -> usize {
        self.num_constraints
    }

    /// Public inputs, excluding the constant-one wire.
    pub fn num_public_inputs(&self) -> usize {
        self.num_public_inputs
    }

    pub fn blank(&self) -> EligibilityCircuit {
        EligibilityCircuit::blank(self.params.clone())
    }

    pub fn with_witness(&self, preimage: Fr) -> EligibilityCircuit {
        EligibilityCircuit::with_witness(self.params.clone(), preimage)
    }
}

pub fn compile_circuit() -> Result<CompiledCircuit> {
    let params = MimcParams::shared();
    let cs = ConstraintSystem::<Fr>::new_ref();
    cs.set_mode(SynthesisMode::Setup);
    EligibilityCircuit::blank(params.clone()).generate_constraints(cs.clone())?;
    cs.finalize();

    let compiled = CompiledCircuit {
        params,
        num_constraints: cs.num_constraints(),
        num_public_inputs: cs.num_instance_variables() - 1,
    };
    debug!(
        constraints = compiled.num_constraints,
        public_inputs = compiled.num_public_inputs,
        "Eligibility circuit compiled"
    );
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mimc::MIMC_ROUNDS;

    #[test]
    fn test_compiled_shape() {
        let compiled = compile_circuit().unwrap();
        assert_eq!(compiled.num_public_inputs(), 1);
        assert_eq!(compiled.num_constraints(), 4 * MIMC_ROUNDS + 1);
    }

    #[test]
    fn test_witness_satisfies_circuit() {
        let compiled = compile_circuit().unwrap();
        let cs = ConstraintSystem::<Fr>::new_ref();
        compiled
            .with_witness(Fr::from(99u64))
            .generate_constraints(cs.clone())
            .unwrap();
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_wrong_hash_unsatisfied() {
        let compiled = compile_circuit().unwrap();
        let mut circuit = compiled.with_witness(Fr::from(99u64));
        circuit.hash = Some(Fr::from(1u64));

        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }
}
