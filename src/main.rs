//! Oracle Guard CLI
//!
//! One-shot validated price reads against live chains, printed as JSON.
//!
//! Usage:
//!   oracle-guard --rpc 42161=https://arb1.arbitrum.io/rpc price ETH/USD --chain 42161 --pool 0xC696...
//!   oracle-guard quote 2010.5 ETH/USD --chain 1 --require-oracle
//!   oracle-guard sequencer --chain 10
//!   oracle-guard pairs --chain 8453
//!
//! Environment Variables:
//!   ORACLE_GUARD_CONFIG - Path to TOML config file
//!   ORACLE_GUARD_RPC_<CHAIN_ID> - RPC endpoint per chain
//!   ORACLE_GUARD_* - Threshold/heartbeat overrides (see OracleGuardConfig::apply_env)
//!   RUST_LOG - Log filter (default: oracle_guard=info)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oracle_guard::chain::{ChainId, JsonRpcChainReader, RpcEndpoints, SystemClock};
use oracle_guard::oracle::{OracleGuard, OracleGuardConfig};

/// Exit code for a rejected quote or a closed trading gate.
const EXIT_REJECTED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "oracle-guard")]
#[command(about = "Sequencer-gated, oracle + TWAP cross-checked price validation")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, env = "ORACLE_GUARD_CONFIG")]
    config: Option<PathBuf>,

    /// RPC endpoint as CHAIN=URL (repeatable)
    #[arg(long = "rpc", value_name = "CHAIN=URL")]
    rpc: Vec<String>,

    /// Per-read deadline in milliseconds (overrides config)
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validated price for a pair
    Price {
        /// Pair symbol, e.g. ETH/USD
        pair: String,

        #[arg(long)]
        chain: ChainId,

        /// Pool used for the TWAP cross-check
        #[arg(long)]
        pool: Option<String>,
    },

    /// Check an external quote against the validated price
    Quote {
        price: Decimal,

        pair: String,

        #[arg(long)]
        chain: ChainId,

        #[arg(long)]
        pool: Option<String>,

        /// Reject instead of bypassing when the oracle cannot validate
        #[arg(long)]
        require_oracle: bool,
    },

    /// L2 sequencer status
    Sequencer {
        #[arg(long)]
        chain: ChainId,
    },

    /// Pairs with a configured feed on a chain
    Pairs {
        #[arg(long)]
        chain: ChainId,
    },
}

#[derive(Serialize)]
struct PairsOutput {
    chain_id: ChainId,
    pairs: Vec<String>,
    has_sequencer_feed: bool,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
    hard_gate: bool,
}

fn init_tracing() {
    // stdout carries the JSON result, logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oracle_guard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<OracleGuardConfig> {
    let config = match &cli.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            OracleGuardConfig::from_toml_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => OracleGuardConfig::default(),
    };
    let config = config.apply_env();
    Ok(match cli.read_timeout_ms {
        Some(ms) => config.with_read_timeout_ms(ms),
        None => config,
    })
}

fn load_endpoints(cli: &Cli) -> Result<RpcEndpoints> {
    let mut endpoints = RpcEndpoints::from_env();
    for entry in &cli.rpc {
        let (chain_id, url) = RpcEndpoints::parse_entry(entry)?;
        endpoints.insert(chain_id, url);
    }
    if endpoints.is_empty() {
        warn!("No RPC endpoints configured; pass --rpc CHAIN=URL or set ORACLE_GUARD_RPC_<CHAIN>");
    }
    Ok(endpoints)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let endpoints = load_endpoints(&cli)?;

    // The HTTP client deadline backs up the per-read deadline when one is set.
    let http_timeout = config.read_timeout_ms.map(Duration::from_millis);
    let reader = Arc::new(JsonRpcChainReader::new(endpoints, http_timeout)?);
    let guard = OracleGuard::new(config, reader, Arc::new(SystemClock))
        .context("Invalid oracle guard configuration")?;

    let outcome = match &cli.command {
        Commands::Price { pair, chain, pool } => guard
            .get_validated_price(pair, *chain, pool.as_deref())
            .await
            .map(|price| print_json(&price)),
        Commands::Quote {
            price,
            pair,
            chain,
            pool,
            require_oracle,
        } => {
            let verdict = guard
                .validate_quote(*price, pair, *chain, pool.as_deref(), *require_oracle)
                .await;
            print_json(&verdict)?;
            return Ok(if verdict.accepted {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_REJECTED)
            });
        }
        Commands::Sequencer { chain } => guard
            .check_sequencer(*chain)
            .await
            .map(|status| print_json(&status)),
        Commands::Pairs { chain } => Ok(print_json(&PairsOutput {
            chain_id: *chain,
            pairs: guard.list_pairs(*chain),
            has_sequencer_feed: guard.has_sequencer_feed(*chain),
        })),
    };

    match outcome {
        Ok(printed) => {
            printed?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            print_json(&ErrorOutput {
                error: e.to_string(),
                hard_gate: e.is_hard_gate(),
            })?;
            Ok(ExitCode::from(if e.is_hard_gate() { EXIT_REJECTED } else { 1 }))
        }
    }
}
