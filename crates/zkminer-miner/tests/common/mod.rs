#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use zkminer_chain::{ChainClient, MemoryChain};
use zkminer_crypto::Keypair;
use zkminer_miner::{LotteryTicket, Miner, MinerConfig};
use zkminer_problem::{mimc_hash, EligibilityProof, EligibilityProver, ProblemError};
use zkminer_types::{Address, Hash};
use zkminer_vrf::{evaluate, select_challenge_index, VrfSecretKey};

pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_for_submissions(chain: &MemoryChain, count: usize) -> Vec<LotteryTicket> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        let subs = chain.submissions().await;
        if subs.len() >= count {
            return subs
                .iter()
                .map(|s| LotteryTicket::from_bytes(&s.payload).unwrap())
                .collect();
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {count} submissions, got {}",
            subs.len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Deterministic key whose VRF on `seed` selects `want` in `[0, range)`.
pub fn key_with_index(seed: &Hash, range: u64, want: u64) -> Keypair {
    (1u8..=255)
        .map(|i| Keypair::from_bytes(&[i; 32]).unwrap())
        .find(|key| {
            let vrf = VrfSecretKey::from_keypair(key).unwrap();
            let out = evaluate(&vrf, seed).unwrap();
            select_challenge_index(&out.index, range).unwrap() == want
        })
        .unwrap()
}

/// Hashes natively and returns placeholder proof bytes.
#[derive(Default)]
pub struct StubProver {
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
}

impl EligibilityProver for StubProver {
    fn prove(&self, preimage: &[u8]) -> Result<EligibilityProof, ProblemError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        Ok(EligibilityProof {
            mimc_hash: mimc_hash(preimage)?.to_vec(),
            zkp_proof: [b"stub".as_slice(), preimage].concat(),
        })
    }
}

pub fn test_config() -> MinerConfig {
    MinerConfig::default()
}

pub async fn stub_miner(
    config: MinerConfig,
    prover: StubProver,
) -> (Arc<MemoryChain>, Miner) {
    let chain = Arc::new(MemoryChain::new(Address::zero()));
    let miner = Miner::with_prover(config, chain.clone(), Arc::new(prover))
        .await
        .unwrap();
    (chain, miner)
}

pub async fn header_hash(chain: &MemoryChain, height: u64) -> Hash {
    chain.header_by_number(height).await.unwrap().unwrap().hash
}
