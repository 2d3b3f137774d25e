use crate::keys::Address;
use crate::{Hash, Height};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Block header as observed by the miner. Only the fields the lottery needs
/// are carried: height, hash linkage, coinbase and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub number: Height,
    pub hash: Hash,
    pub parent_hash: Hash,
    pub coinbase: Address,
    pub timestamp: u64,
}

impl Header {
    /// Builds a header and seals it with its computed hash.
    pub fn new(number: Height, parent_hash: Hash, coinbase: Address, timestamp: u64) -> Self {
        let mut header = Self {
            number,
            hash: [0u8; 32],
            parent_hash,
            coinbase,
            timestamp,
        };
        header.hash = header.compute_hash();
        header
    }

    /// keccak256(number_be || parent_hash || coinbase || timestamp_be)
    pub fn compute_hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(self.number.to_be_bytes());
        hasher.update(self.parent_hash);
        hasher.update(self.coinbase.as_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        hasher.finalize().into()
    }

    pub fn is_sealed(&self) -> bool {
        self.hash == self.compute_hash()
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}
