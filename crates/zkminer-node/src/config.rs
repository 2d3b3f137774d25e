use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use zkminer_crypto::Keypair;
use zkminer_miner::MinerConfig;
use zkminer_types::Address;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub miner: MinerConfig,
    pub chain: ChainSettings,
    pub logging: LoggingConfig,
    pub keys: KeysConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    /// Run against the in-process chain with a local block producer.
    pub devnet: bool,
    pub block_time_ms: u64,
    pub max_attempts: usize,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            devnet: true,
            block_time_ms: 2_000,
            max_attempts: 3,
            backoff_base_ms: 200,
            backoff_max_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// One of `pretty`, `compact` or `json`.
    pub format: String,
    pub file_output: Option<PathBuf>,
    pub module_filters: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_output: None,
            module_filters: BTreeMap::new(),
        }
    }
}

/// Miner identities. Secrets are hex-encoded 32-byte seeds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub secrets: Vec<String>,
    pub key_files: Vec<PathBuf>,
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        // Env overrides are applied by main so the precedence stays in one place
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `ZKMINER_*` environment variable overrides. Values that fail to
    /// parse are ignored.
    pub fn apply_env_overrides(&mut self) {
        // Miner
        if let Ok(addr) = env::var("ZKMINER_COINBASE_ADDR") {
            if let Ok(addr) = Address::from_hex(&addr) {
                self.miner.coinbase_addr = addr;
            }
        }
        if let Ok(urls) = env::var("ZKMINER_WS_URLS") {
            if !urls.is_empty() {
                self.miner.ws_urls = split_list(&urls);
            }
        }
        if let Ok(path) = env::var("ZKMINER_PK_PATH") {
            if !path.is_empty() {
                self.miner.pk_path = PathBuf::from(path);
            }
        }
        if let Ok(ms) = env::var("ZKMINER_RPC_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                self.miner.rpc_timeout_ms = ms;
            }
        }
        if let Ok(max) = env::var("ZKMINER_MAX_WORKERS") {
            if let Ok(max) = max.parse() {
                self.miner.max_worker_cnt = max;
            }
        }
        if let Ok(max) = env::var("ZKMINER_MAX_TASKS") {
            if let Ok(max) = max.parse() {
                self.miner.max_task_cnt = max;
            }
        }
        if let Ok(interval) = env::var("ZKMINER_COINBASE_INTERVAL") {
            if let Ok(interval) = interval.parse() {
                self.miner.coinbase_interval = interval;
            }
        }
        if let Ok(advance) = env::var("ZKMINER_SUBMIT_ADVANCE") {
            if let Ok(advance) = advance.parse() {
                self.miner.submit_advance = advance;
            }
        }

        // Chain
        if let Ok(devnet) = env::var("ZKMINER_DEVNET") {
            self.chain.devnet = matches!(devnet.as_str(), "1" | "true" | "yes");
        }
        if let Ok(ms) = env::var("ZKMINER_BLOCK_TIME_MS") {
            if let Ok(ms) = ms.parse() {
                self.chain.block_time_ms = ms;
            }
        }

        // Logging
        if let Ok(level) = env::var("ZKMINER_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
        if let Ok(format) = env::var("ZKMINER_LOG_FORMAT") {
            if !format.is_empty() {
                self.logging.format = format;
            }
        }

        // Keys
        if let Ok(secrets) = env::var("ZKMINER_MINER_KEYS") {
            if !secrets.is_empty() {
                self.keys.secrets = split_list(&secrets);
            }
        }
    }

    /// Decodes every configured secret and key file, in that order.
    pub fn load_keys(&self) -> Result<Vec<Keypair>> {
        let mut keys = Vec::with_capacity(self.keys.secrets.len() + self.keys.key_files.len());
        for (i, secret) in self.keys.secrets.iter().enumerate() {
            let key = Keypair::from_hex(secret)
                .with_context(|| format!("decoding miner secret #{}", i))?;
            keys.push(key);
        }
        for path in &self.keys.key_files {
            let key = Keypair::load_from_file(path)
                .with_context(|| format!("loading key file {}", path.display()))?;
            keys.push(key);
        }
        Ok(keys)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn test_env_overrides() {
        let coinbase = Address::from_bytes([0xab; 20]);
        env::set_var("ZKMINER_COINBASE_ADDR", coinbase.to_hex());
        env::set_var("ZKMINER_WS_URLS", "ws://a:8546, ws://b:8546");
        env::set_var("ZKMINER_MAX_TASKS", "4");
        env::set_var("ZKMINER_COINBASE_INTERVAL", "8");
        env::set_var("ZKMINER_DEVNET", "false");
        env::set_var("ZKMINER_BLOCK_TIME_MS", "not-a-number");
        env::set_var("ZKMINER_LOG_FORMAT", "json");

        let mut config = NodeConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.miner.coinbase_addr, coinbase);
        assert_eq!(config.miner.ws_urls, vec!["ws://a:8546", "ws://b:8546"]);
        assert_eq!(config.miner.max_task_cnt, 4);
        assert_eq!(config.miner.coinbase_interval, 8);
        assert!(!config.chain.devnet);
        assert_eq!(config.chain.block_time_ms, 2_000);
        assert_eq!(config.logging.format, "json");

        env::remove_var("ZKMINER_COINBASE_ADDR");
        env::remove_var("ZKMINER_WS_URLS");
        env::remove_var("ZKMINER_MAX_TASKS");
        env::remove_var("ZKMINER_COINBASE_INTERVAL");
        env::remove_var("ZKMINER_DEVNET");
        env::remove_var("ZKMINER_BLOCK_TIME_MS");
        env::remove_var("ZKMINER_LOG_FORMAT");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("zkminer.toml");

        let mut config = NodeConfig::default();
        config.miner.coinbase_addr = Address::from_bytes([7u8; 20]);
        config.miner.submit_advance = 1;
        config
            .logging
            .module_filters
            .insert("zkminer_chain".to_string(), "warn".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = NodeConfig::from_file(&path).unwrap();
        assert_eq!(loaded.miner.coinbase_addr, config.miner.coinbase_addr);
        assert_eq!(loaded.miner.submit_advance, 1);
        assert_eq!(
            loaded.logging.module_filters.get("zkminer_chain").map(String::as_str),
            Some("warn")
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zkminer.toml");
        std::fs::write(&path, "[miner]\ncoinbase_interval = 12\n").unwrap();

        let config = NodeConfig::from_file(&path).unwrap();
        assert_eq!(config.miner.coinbase_interval, 12);
        assert_eq!(config.miner.submit_advance, 2);
        assert!(config.chain.devnet);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_keys() {
        let dir = tempdir().unwrap();
        let file_key = Keypair::generate();
        let key_path = dir.path().join("miner.key");
        file_key.save_to_file(&key_path).unwrap();
        let inline_key = Keypair::generate();

        let mut config = NodeConfig::default();
        config.keys.secrets = vec![format!("0x{}", inline_key.to_hex())];
        config.keys.key_files = vec![key_path];

        let keys = config.load_keys().unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].address(), inline_key.address());
        assert_eq!(keys[1].address(), file_key.address());

        config.keys.secrets = vec!["zz".to_string()];
        assert!(config.load_keys().is_err());
    }
}
