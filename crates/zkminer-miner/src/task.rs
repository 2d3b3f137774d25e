use crate::error::{MinerError, Result};
use crate::lottery::LotteryTicket;
use serde::{Deserialize, Serialize};
use std::fmt;
use zkminer_types::{Address, Hash, Header, Height, Signature};

/// Position of a task in the lottery pipeline. Steps only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskStep {
    Start = 0,
    WaitChallengeBlock = 1,
    GotChallengeBlock = 2,
    Solved = 3,
}

impl fmt::Display for TaskStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStep::Start => "START",
            TaskStep::WaitChallengeBlock => "WAIT_CHALLENGE_BLOCK",
            TaskStep::GotChallengeBlock => "GOT_CHALLENGE_BLOCK",
            TaskStep::Solved => "SOLVED",
        };
        f.write_str(name)
    }
}

/// One miner's attempt at one lottery round.
///
/// Not `Clone`: a task is owned by exactly one component at a time and moves
/// between them over channels.
#[derive(Debug)]
pub struct Task {
    step: TaskStep,
    last_coinbase_height: Height,
    last_coinbase_hash: Hash,
    pub(crate) challenge_index: u64,
    pub(crate) miner_addr: Address,
    pub(crate) lottery: LotteryTicket,
    pub(crate) signature: Signature,
}

impl Task {
    pub fn new(last_coinbase_height: Height, last_coinbase_hash: Hash) -> Self {
        Self {
            step: TaskStep::Start,
            last_coinbase_height,
            last_coinbase_hash,
            challenge_index: 0,
            miner_addr: Address::zero(),
            lottery: LotteryTicket::default(),
            signature: Signature::empty(),
        }
    }

    pub fn step(&self) -> TaskStep {
        self.step
    }

    pub fn last_coinbase_height(&self) -> Height {
        self.last_coinbase_height
    }

    pub fn last_coinbase_hash(&self) -> &Hash {
        &self.last_coinbase_hash
    }

    pub fn challenge_index(&self) -> u64 {
        self.challenge_index
    }

    /// Height whose header serves as this round's challenge.
    pub fn challenge_height(&self) -> Height {
        self.last_coinbase_height + self.challenge_index
    }

    pub fn miner_addr(&self) -> Address {
        self.miner_addr
    }

    pub fn lottery(&self) -> &LotteryTicket {
        &self.lottery
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub(crate) fn expect_step(&self, expected: TaskStep) -> Result<()> {
        if self.step != expected {
            return Err(MinerError::InvalidStep {
                expected,
                actual: self.step,
            });
        }
        Ok(())
    }

    /// Moves to `next`, which must be strictly later than the current step.
    pub(crate) fn advance(&mut self, next: TaskStep) -> Result<()> {
        if next <= self.step {
            return Err(MinerError::InvalidStep {
                expected: next,
                actual: self.step,
            });
        }
        self.step = next;
        Ok(())
    }

    /// Binds the challenge header to a waiting task.
    pub(crate) fn set_header(&mut self, header: &Header) -> Result<()> {
        self.expect_step(TaskStep::WaitChallengeBlock)?;
        if header.number != self.challenge_height() {
            return Err(MinerError::InvalidTicket(format!(
                "header {} does not match challenge height {}",
                header.number,
                self.challenge_height()
            )));
        }
        self.lottery.challenge_header_hash = header.hash;
        self.advance(TaskStep::GotChallengeBlock)
    }
}
