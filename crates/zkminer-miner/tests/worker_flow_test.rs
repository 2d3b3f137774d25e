//! Worker pipeline scenarios driven through a miner on an in-memory chain

mod common;

use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use zkminer_chain::MemoryChain;
use zkminer_miner::{eligibility_preimage, Miner, MinerConfig, Task};
use zkminer_problem::mimc_hash;
use zkminer_types::Address;
use zkminer_vrf::select_challenge_index;

async fn miner_at_height(height: u64, config: MinerConfig) -> (Arc<MemoryChain>, Miner) {
    let chain = Arc::new(MemoryChain::new(Address::zero()));
    chain.mine_blocks(height).await;
    let miner = Miner::with_prover(config, chain.clone(), Arc::new(StubProver::default()))
        .await
        .unwrap();
    (chain, miner)
}

#[tokio::test]
async fn test_challenge_already_on_chain() {
    let (chain, miner) = miner_at_height(102, test_config()).await;
    let round_hash = header_hash(&chain, 100).await;
    let key = key_with_index(&round_hash, 3, 2);
    let addr = miner.new_worker(key).await.unwrap();
    miner.start().await.unwrap();

    let worker = miner.worker(&addr).await.unwrap();
    worker.handle_start_task(Task::new(100, round_hash)).await.unwrap();

    let tickets = wait_for_submissions(&chain, 1).await;
    assert_eq!(tickets[0].miner_addr, addr);
    assert_eq!(tickets[0].challenge_header_hash, header_hash(&chain, 102).await);
    assert_eq!(worker.stats().tasks_parked, 0);
    miner.close().await;
}

#[tokio::test]
async fn test_wait_then_got_challenge_block() {
    let (chain, miner) = miner_at_height(100, test_config()).await;
    let round_hash = header_hash(&chain, 100).await;
    let key = key_with_index(&round_hash, 3, 2);
    let addr = miner.new_worker(key).await.unwrap();
    miner.start().await.unwrap();

    let worker = miner.worker(&addr).await.unwrap();
    worker.handle_start_task(Task::new(100, round_hash)).await.unwrap();

    let scanner = miner.scanner();
    wait_until("task parked", || scanner.stats().pending_tasks == 1).await;
    assert_eq!(worker.stats().tasks_parked, 1);

    chain.mine_block().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(scanner.stats().pending_tasks, 1);
    assert!(chain.submissions().await.is_empty());

    let challenge = chain.mine_block().await;
    let tickets = wait_for_submissions(&chain, 1).await;
    assert_eq!(tickets[0].challenge_header_hash, challenge.hash);
    assert_eq!(scanner.stats().pending_tasks, 0);
    miner.close().await;
}

#[tokio::test]
async fn test_round_tickets_follow_challenge_window() {
    let config = test_config();
    let (chain, miner) = stub_miner(config, StubProver::default()).await;
    for i in 1..=3u8 {
        miner
            .new_worker(zkminer_crypto::Keypair::from_bytes(&[i; 32]).unwrap())
            .await
            .unwrap();
    }
    miner.start().await.unwrap();

    let round = chain.mine_blocks(5).await;
    chain.mine_blocks(2).await;
    let tickets = wait_for_submissions(&chain, 3).await;

    for ticket in &tickets {
        assert!(ticket.is_complete());
        let index = select_challenge_index(&ticket.vrf_index, 3).unwrap();
        assert!(index < 3);
        let expected = header_hash(&chain, round.number + index).await;
        assert_eq!(ticket.challenge_header_hash, expected);

        let preimage = eligibility_preimage(&ticket.miner_addr, &ticket.challenge_header_hash);
        assert_eq!(ticket.mimc_hash, mimc_hash(&preimage).unwrap().to_vec());
    }
    miner.close().await;
}

#[tokio::test]
async fn test_stopped_worker_drops_round() {
    let (chain, miner) = stub_miner(test_config(), StubProver::default()).await;
    let addr = miner
        .new_worker(zkminer_crypto::Keypair::generate())
        .await
        .unwrap();
    miner.start().await.unwrap();
    let worker = miner.worker(&addr).await.unwrap();
    worker.stop();

    chain.mine_blocks(5).await;
    wait_until("round dropped", || worker.stats().dropped == 1).await;
    chain.mine_blocks(2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(worker.stats().rounds_started, 0);
    assert!(chain.submissions().await.is_empty());
    miner.close().await;
}

#[tokio::test]
async fn test_stop_while_parked_drops_released_task() {
    let chain = Arc::new(MemoryChain::new(Address::zero()));
    chain.mine_blocks(100).await;
    let prover = Arc::new(StubProver::default());
    let miner = Miner::with_prover(test_config(), chain.clone(), prover.clone())
        .await
        .unwrap();
    let round_hash = header_hash(&chain, 100).await;
    let addr = miner
        .new_worker(key_with_index(&round_hash, 3, 2))
        .await
        .unwrap();
    miner.start().await.unwrap();

    let worker = miner.worker(&addr).await.unwrap();
    worker.handle_start_task(Task::new(100, round_hash)).await.unwrap();
    let scanner = miner.scanner();
    wait_until("task parked", || scanner.stats().pending_tasks == 1).await;

    worker.stop();
    chain.mine_blocks(2).await;

    // Still routed back to the worker, which drops it unhandled
    wait_until("task released", || scanner.stats().tasks_released == 1).await;
    wait_until("task dropped", || worker.stats().dropped == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(scanner.stats().pending_tasks, 0);
    assert_eq!(worker.stats().proofs_solved, 0);
    assert_eq!(worker.working_task_cnt(), 0);
    assert_eq!(prover.calls.load(Ordering::SeqCst), 0);
    assert!(chain.submissions().await.is_empty());
    miner.close().await;
}

#[tokio::test]
async fn test_admission_rejects_when_slots_busy() {
    let config = MinerConfig {
        max_task_cnt: 1,
        ..test_config()
    };
    let prover = StubProver {
        delay: Some(Duration::from_millis(300)),
        ..Default::default()
    };
    let chain = Arc::new(MemoryChain::new(Address::zero()));
    chain.mine_blocks(10).await;
    let miner = Miner::with_prover(config, chain.clone(), Arc::new(prover))
        .await
        .unwrap();
    let addr = miner
        .new_worker(zkminer_crypto::Keypair::generate())
        .await
        .unwrap();
    miner.start().await.unwrap();

    let worker = miner.worker(&addr).await.unwrap();
    let round_hash = header_hash(&chain, 5).await;
    worker.intake().send(Task::new(5, round_hash)).await.unwrap();
    worker.intake().send(Task::new(5, round_hash)).await.unwrap();

    wait_until("second start rejected", || worker.stats().rejected == 1).await;
    assert!(worker.working_task_cnt() <= 1);

    // Round 5 ends at height 10, so the admitted ticket is stale.
    let scanner = miner.scanner();
    wait_until("stale ticket dropped", || scanner.stats().stale_dropped == 1).await;
    assert_eq!(worker.stats().rounds_started, 1);
    assert_eq!(worker.working_task_cnt(), 0);
    assert!(chain.submissions().await.is_empty());
    miner.close().await;
}

#[tokio::test]
async fn test_failed_submission_is_counted() {
    let (chain, miner) = miner_at_height(102, test_config()).await;
    chain.set_reject_submissions(true);
    let round_hash = header_hash(&chain, 100).await;
    let addr = miner
        .new_worker(key_with_index(&round_hash, 3, 0))
        .await
        .unwrap();
    miner.start().await.unwrap();

    let worker = miner.worker(&addr).await.unwrap();
    worker.handle_start_task(Task::new(100, round_hash)).await.unwrap();

    let scanner = miner.scanner();
    wait_until("submission failure", || scanner.stats().submit_failures == 1).await;
    assert_eq!(worker.stats().proofs_solved, 1);
    miner.close().await;
}
