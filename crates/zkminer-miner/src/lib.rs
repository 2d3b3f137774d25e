/*!
# zkminer-miner

Off-chain side of a VRF lottery. Every `coinbase_interval` blocks each miner
key gets one [`Task`]. The task walks a strict pipeline:

```text
START --vrf--> WAIT_CHALLENGE_BLOCK --header--> GOT_CHALLENGE_BLOCK --zk proof--> SOLVED
```

1. A [`Worker`] evaluates its VRF on the last coinbase hash. The output picks
   a challenge height within the round.
2. If that header is not on chain yet the task is parked with the
   [`Scanner`], which hands it back once the header arrives.
3. The worker proves knowledge of `keccak256(miner_addr || challenge_hash)`
   under MiMC, signs the resulting [`LotteryTicket`] and forwards it.
4. The scanner submits the ticket unless the round is already over.

Tasks move between components by value over channels; at any moment exactly
one component owns a given task. The [`Miner`] wires workers, scanner and
the chain client together.
*/

mod codec;
pub mod config;
pub mod error;
pub mod lottery;
pub mod miner;
pub mod scanner;
pub mod task;
pub mod worker;

pub use config::MinerConfig;
pub use error::{MinerError, Result};
pub use lottery::{eligibility_preimage, LotteryTicket, TicketContext};
pub use miner::Miner;
pub use scanner::{Scanner, ScannerHandle, ScannerStats, WorkerRegistry};
pub use task::{Task, TaskStep};
pub use worker::{Worker, WorkerStats};

#[cfg(test)]
pub(crate) mod test_support;
