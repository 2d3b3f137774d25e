use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zkminer_chain::{ChainClient, MemoryChain, RetryConfig, RetryingClient};
use zkminer_crypto::Keypair;
use zkminer_miner::Miner;
use zkminer_problem::{compile_circuit, setup_zkp};
use zkminer_types::Address;

mod config;
mod logging;

const DEFAULT_CONFIG_PATH: &str = "./zkminer.toml";

#[derive(Parser)]
#[command(name = "zkminer")]
#[command(about = "VRF lottery miner with zk eligibility proofs", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start mining
    Start {
        /// Run against the in-process chain
        #[arg(long)]
        devnet: bool,

        /// Devnet block interval in milliseconds
        #[arg(long)]
        block_time_ms: Option<u64>,

        /// Groth16 proving key
        #[arg(long)]
        pk_path: Option<PathBuf>,

        /// Address credited by the devnet block producer
        #[arg(long)]
        coinbase_addr: Option<String>,

        /// Miner secret key file (can be repeated)
        #[arg(short, long = "key")]
        keys: Vec<PathBuf>,
    },

    /// Generate a new miner key
    Keygen {
        /// Output file for the hex-encoded secret
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the Groth16 setup and write `<out>.pk` and `<out>.vk`
    Setup {
        #[arg(short, long, default_value = "./data/lottery")]
        out: PathBuf,
    },

    /// Write a configuration file with default values
    Init {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        output: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<config::NodeConfig> {
    match path {
        Some(path) => config::NodeConfig::from_file(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            config::NodeConfig::from_file(Path::new(DEFAULT_CONFIG_PATH))
        }
        None => Ok(config::NodeConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (ignore if it doesn't)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Priority order: CLI args > ENV vars > Config file > Defaults
    let mut config = load_config(cli.config.as_deref())?;
    config.apply_env_overrides();

    if let Err(e) = logging::init_logging(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
        let log_level = match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                std::env::var("RUST_LOG").unwrap_or_else(|_| format!("zkminer={}", log_level)),
            ))
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    }

    match cli.command {
        Commands::Start {
            devnet,
            block_time_ms,
            pk_path,
            coinbase_addr,
            keys,
        } => {
            if devnet {
                config.chain.devnet = true;
            }
            if let Some(ms) = block_time_ms {
                config.chain.block_time_ms = ms;
            }
            if let Some(path) = pk_path {
                config.miner.pk_path = path;
            }
            if let Some(addr) = coinbase_addr {
                config.miner.coinbase_addr =
                    Address::from_hex(&addr).context("invalid --coinbase-addr")?;
            }
            config.keys.key_files.extend(keys);
            run_miner(config).await
        }

        Commands::Keygen { output } => {
            info!("🔐 Generating new miner key");
            let keypair = Keypair::generate();

            if let Some(path) = output {
                keypair
                    .save_to_file(&path)
                    .with_context(|| format!("writing key to {}", path.display()))?;
                info!(path = ?path, "✅ Key saved");
            } else {
                println!("Secret key: {}", keypair.to_hex());
            }
            println!("Public key: {}", keypair.public_key().to_hex());
            println!("Address:    {}", keypair.address());
            Ok(())
        }

        Commands::Setup { out } => {
            let started = Instant::now();
            let compiled = compile_circuit().context("compiling eligibility circuit")?;
            let (pk, vk) = setup_zkp(&compiled).context("running Groth16 setup")?;

            let pk_path = out.with_extension("pk");
            let vk_path = out.with_extension("vk");
            let pk_len = pk
                .save_to_file(&pk_path)
                .with_context(|| format!("writing {}", pk_path.display()))?;
            let vk_len = vk
                .save_to_file(&vk_path)
                .with_context(|| format!("writing {}", vk_path.display()))?;

            info!(
                constraints = compiled.num_constraints(),
                pk = %pk_path.display(),
                pk_bytes = pk_len,
                vk = %vk_path.display(),
                vk_bytes = vk_len,
                duration_ms = started.elapsed().as_millis() as u64,
                "✅ Setup keys written"
            );
            Ok(())
        }

        Commands::Init { output } => {
            config::NodeConfig::default().save_to_file(&output)?;
            info!(path = ?output, "✅ Configuration saved");
            Ok(())
        }
    }
}

async fn run_miner(config: config::NodeConfig) -> Result<()> {
    if !config.chain.devnet {
        bail!(
            "no RPC transport is available for {:?}; start with --devnet",
            config.miner.ws_urls
        );
    }

    let mut keys = config.load_keys()?;
    if keys.is_empty() {
        warn!("⚠️ No miner keys configured, using a throwaway key");
        keys.push(Keypair::generate());
    }
    let mut miner_config = config.miner.clone();
    miner_config.miner_keys = keys;

    let chain = Arc::new(MemoryChain::new(miner_config.coinbase_addr));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let producer = chain.spawn_producer(
        Duration::from_millis(config.chain.block_time_ms),
        shutdown_rx,
    );

    let retry = RetryConfig {
        max_attempts: config.chain.max_attempts,
        backoff_base: Duration::from_millis(config.chain.backoff_base_ms),
        backoff_max: Duration::from_millis(config.chain.backoff_max_ms),
        rpc_timeout: miner_config.rpc_timeout(),
    };
    let client: Arc<dyn ChainClient> = Arc::new(RetryingClient::new(chain.clone(), retry));

    info!(
        coinbase_interval = miner_config.coinbase_interval,
        submit_advance = miner_config.submit_advance,
        max_task_cnt = miner_config.max_task_cnt,
        block_time_ms = config.chain.block_time_ms,
        pk_path = %miner_config.pk_path.display(),
        "⛏️  Starting zkminer"
    );

    let miner = match Miner::new(miner_config, client).await {
        Ok(miner) => miner,
        Err(e) => {
            let _ = shutdown_tx.send(true);
            let _ = producer.await;
            return Err(e).context("building miner (run `zkminer setup` to create a proving key)");
        }
    };
    miner.start().await?;
    for addr in miner.worker_addresses().await {
        info!(miner = %addr, "✅ Worker ready");
    }

    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutting down gracefully");

    miner.close().await;
    let _ = shutdown_tx.send(true);
    let _ = producer.await;

    let stats = miner.scanner().stats();
    info!(
        height = chain.height().await,
        submissions = chain.submissions().await.len(),
        stats = ?stats,
        "📊 Miner stopped"
    );
    Ok(())
}
