use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use zkminer_problem::{mimc_hash, EligibilityProof, EligibilityProver, ProblemError};

/// Polls `cond` every 10 ms, panicking after five seconds.
pub async fn wait_until(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Prover that hashes natively and fakes the proof bytes.
#[derive(Default)]
pub struct StubProver {
    pub calls: AtomicUsize,
    pub fail: bool,
    pub empty_proof: bool,
}

impl EligibilityProver for StubProver {
    fn prove(&self, preimage: &[u8]) -> Result<EligibilityProof, ProblemError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProblemError::Unsatisfied);
        }
        let hash = mimc_hash(preimage)?;
        let zkp_proof = if self.empty_proof {
            Vec::new()
        } else {
            [b"stub-proof".as_slice(), preimage].concat()
        };
        Ok(EligibilityProof {
            mimc_hash: hash.to_vec(),
            zkp_proof,
        })
    }
}
