//! Read-only chain data access.
//!
//! The oracle guard never talks to a node directly. Every read goes through the
//! [`ChainReader`] trait so the guard can be driven by a JSON-RPC endpoint in
//! production ([`rpc::JsonRpcChainReader`]) or by an in-memory fake in tests.
//!
//! Three contract shapes are consumed:
//! - AggregatorV3-style price feeds: `latestRoundData()` and `decimals()`
//! - L2 sequencer uptime feeds: same `latestRoundData()` shape, `answer` is a liveness flag
//! - Concentrated-liquidity pools: `observe(uint32[])` and the current tick from `slot0()`

pub mod abi;
pub mod rpc;

use serde::{Deserialize, Serialize};

pub use rpc::{JsonRpcChainReader, RpcEndpoints};

/// Chain identifier (EIP-155).
pub type ChainId = u64;

/// Raw `latestRoundData()` result.
///
/// Fields are kept at their on-chain widths (uint80 round ids, int256 answer
/// narrowed to i128) so validation happens on exactly what the contract returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundData {
    pub round_id: u128,
    pub answer: i128,
    pub started_at: u64,
    pub updated_at: u64,
    pub answered_in_round: u128,
}

/// Failures raised by a [`ChainReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainReadError {
    /// The pool does not hold enough observations to cover the requested window.
    InsufficientHistory { pool: String, seconds_ago: u32 },
    /// No endpoint is configured for this chain.
    UnsupportedChain(ChainId),
    /// Transport or node-side failure (includes non-history reverts).
    Rpc(String),
    /// The call succeeded but the return data could not be decoded.
    Decode(String),
}

impl std::fmt::Display for ChainReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientHistory { pool, seconds_ago } => write!(
                f,
                "pool {} has insufficient observation history for {}s window",
                pool, seconds_ago
            ),
            Self::UnsupportedChain(chain_id) => {
                write!(f, "no RPC endpoint configured for chain {}", chain_id)
            }
            Self::Rpc(msg) => write!(f, "RPC error: {}", msg),
            Self::Decode(msg) => write!(f, "decode error: {}", msg),
        }
    }
}

impl std::error::Error for ChainReadError {}

/// Read-only access to the contracts the guard depends on.
#[async_trait::async_trait]
pub trait ChainReader: Send + Sync {
    /// `latestRoundData()` on a price or sequencer-uptime feed.
    async fn latest_round_data(
        &self,
        chain_id: ChainId,
        feed: &str,
    ) -> Result<RoundData, ChainReadError>;

    /// `decimals()` on a price feed.
    async fn decimals(&self, chain_id: ChainId, feed: &str) -> Result<u8, ChainReadError>;

    /// `observe(secondsAgos)` on a pool, returning the tick cumulatives in request order.
    async fn observe(
        &self,
        chain_id: ChainId,
        pool: &str,
        seconds_agos: [u32; 2],
    ) -> Result<[i64; 2], ChainReadError>;

    /// Current pool tick (spot price).
    async fn current_tick(&self, chain_id: ChainId, pool: &str) -> Result<i32, ChainReadError>;
}

/// Wall-clock source in unix seconds.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// [`Clock`] pinned to a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_secs(&self) -> u64 {
        self.0
    }
}
