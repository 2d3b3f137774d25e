use crate::error::{MinerError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use zkminer_crypto::Keypair;
use zkminer_types::Address;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Upper bound on concurrently registered workers.
    pub max_worker_cnt: usize,
    /// Per-worker cap on handlers holding a task slot.
    pub max_task_cnt: usize,
    /// Blocks per lottery round.
    pub coinbase_interval: u64,
    /// Trailing blocks of a round reserved for ticket submission.
    pub submit_advance: u64,
    pub coinbase_addr: Address,
    pub ws_urls: Vec<String>,
    pub rpc_timeout_ms: u64,
    pub pk_path: PathBuf,
    /// Buffered tasks per worker intake channel.
    pub intake_capacity: usize,
    /// Filled from the key section at startup, never serialized.
    #[serde(skip)]
    pub miner_keys: Vec<Keypair>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            max_worker_cnt: 10,
            max_task_cnt: 10,
            coinbase_interval: 5,
            submit_advance: 2,
            coinbase_addr: Address::zero(),
            ws_urls: Vec::new(),
            rpc_timeout_ms: 60_000,
            pk_path: PathBuf::from("./data/lottery.pk"),
            intake_capacity: 64,
            miner_keys: Vec::new(),
        }
    }
}

impl MinerConfig {
    /// Fills in the deployment-specific fields.
    pub fn customize(
        mut self,
        miner_keys: Vec<Keypair>,
        coinbase_addr: Address,
        ws_urls: Vec<String>,
        pk_path: impl Into<PathBuf>,
    ) -> Self {
        self.miner_keys = miner_keys;
        self.coinbase_addr = coinbase_addr;
        self.ws_urls = ws_urls;
        self.pk_path = pk_path.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.coinbase_interval == 0 {
            return Err(MinerError::InvalidConfiguration(
                "coinbase_interval must be positive".to_string(),
            ));
        }
        if self.submit_advance >= self.coinbase_interval {
            return Err(MinerError::InvalidConfiguration(format!(
                "submit_advance ({}) must be less than coinbase_interval ({})",
                self.submit_advance, self.coinbase_interval
            )));
        }
        if self.max_task_cnt == 0 {
            return Err(MinerError::InvalidConfiguration(
                "max_task_cnt must be at least 1".to_string(),
            ));
        }
        if self.max_worker_cnt == 0 {
            return Err(MinerError::InvalidConfiguration(
                "max_worker_cnt must be at least 1".to_string(),
            ));
        }
        if self.intake_capacity == 0 {
            return Err(MinerError::InvalidConfiguration(
                "intake_capacity must be at least 1".to_string(),
            ));
        }
        if self.miner_keys.len() > self.max_worker_cnt {
            return Err(MinerError::InvalidConfiguration(format!(
                "{} miner keys exceed max_worker_cnt ({})",
                self.miner_keys.len(),
                self.max_worker_cnt
            )));
        }
        Ok(())
    }

    /// Width of the window a challenge index may fall in.
    pub fn challenge_range(&self) -> u64 {
        self.coinbase_interval.saturating_sub(self.submit_advance)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = MinerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.challenge_range(), 3);
        assert_eq!(config.rpc_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_submit_advance_must_fit_interval() {
        let config = MinerConfig {
            submit_advance: 5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MinerError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_too_many_keys_rejected() {
        let keys = (0..3).map(|_| Keypair::generate()).collect();
        let config = MinerConfig {
            max_worker_cnt: 2,
            ..Default::default()
        }
        .customize(keys, Address::zero(), vec![], "pk");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_customize_sets_deployment_fields() {
        let key = Keypair::generate();
        let config = MinerConfig::default().customize(
            vec![key.clone()],
            Address::from_bytes([1u8; 20]),
            vec!["ws://127.0.0.1:8546".to_string()],
            "/tmp/lottery.pk",
        );
        assert_eq!(config.miner_keys[0].address(), key.address());
        assert_eq!(config.ws_urls.len(), 1);
        assert_eq!(config.pk_path, PathBuf::from("/tmp/lottery.pk"));
    }

    #[test]
    fn test_toml_skips_keys() {
        let config = MinerConfig::default().customize(
            vec![Keypair::generate()],
            Address::zero(),
            vec![],
            "pk",
        );
        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("miner_keys"));

        let back: MinerConfig = toml::from_str("coinbase_interval = 8\n").unwrap();
        assert_eq!(back.coinbase_interval, 8);
        assert_eq!(back.submit_advance, 2);
        assert!(back.miner_keys.is_empty());
    }
}
