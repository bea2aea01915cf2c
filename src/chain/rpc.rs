//! JSON-RPC `eth_call` implementation of [`ChainReader`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::abi;
use super::{ChainId, ChainReadError, ChainReader, RoundData};

/// Revert reason Uniswap V3 pools return when `observe` reaches past the oldest observation.
const INSUFFICIENT_HISTORY_REASON: &str = "OLD";

/// Per-chain RPC endpoint table.
#[derive(Debug, Clone, Default)]
pub struct RpcEndpoints {
    urls: HashMap<ChainId, String>,
}

impl RpcEndpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, chain_id: ChainId, url: impl Into<String>) -> Self {
        self.insert(chain_id, url);
        self
    }

    pub fn insert(&mut self, chain_id: ChainId, url: impl Into<String>) {
        self.urls.insert(chain_id, url.into());
    }

    pub fn get(&self, chain_id: ChainId) -> Option<&str> {
        self.urls.get(&chain_id).map(String::as_str)
    }

    /// Parse a `CHAIN=URL` pair (e.g. `42161=https://arb1.example`).
    pub fn parse_entry(entry: &str) -> Result<(ChainId, String)> {
        let (chain, url) = entry
            .split_once('=')
            .with_context(|| format!("expected CHAIN=URL, got '{}'", entry))?;
        let chain_id = chain
            .trim()
            .parse::<ChainId>()
            .with_context(|| format!("invalid chain id '{}'", chain))?;
        Ok((chain_id, url.trim().to_string()))
    }

    /// Collect `ORACLE_GUARD_RPC_<CHAIN_ID>` variables from the environment.
    pub fn from_env() -> Self {
        let mut endpoints = Self::new();
        for (key, value) in std::env::vars() {
            let Some(suffix) = key.strip_prefix("ORACLE_GUARD_RPC_") else {
                continue;
            };
            match suffix.parse::<ChainId>() {
                Ok(chain_id) if !value.is_empty() => endpoints.insert(chain_id, value),
                _ => warn!(key = %key, "ignoring malformed RPC endpoint variable"),
            }
        }
        endpoints
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<String>,
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl JsonRpcErrorObject {
    /// Revert reason, preferring the decoded `Error(string)` payload over the message text.
    fn revert_reason(&self) -> Option<String> {
        let from_data = self
            .data
            .as_ref()
            .and_then(|d| d.as_str())
            .and_then(|d| abi::decode_hex(d).ok())
            .and_then(|bytes| abi::decode_revert_reason(&bytes));
        from_data.or_else(|| {
            self.message
                .strip_prefix("execution reverted:")
                .map(|r| r.trim().to_string())
        })
    }
}

/// [`ChainReader`] that issues `eth_call` requests against per-chain endpoints.
pub struct JsonRpcChainReader {
    client: reqwest::Client,
    endpoints: RpcEndpoints,
}

impl JsonRpcChainReader {
    /// `request_timeout` bounds each HTTP round trip; `None` leaves reqwest's default.
    pub fn new(endpoints: RpcEndpoints, request_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("failed to build HTTP client")?;
        Ok(Self { client, endpoints })
    }

    async fn eth_call(
        &self,
        chain_id: ChainId,
        to: &str,
        data: String,
    ) -> Result<Vec<u8>, ChainReadError> {
        let url = self
            .endpoints
            .get(chain_id)
            .ok_or(ChainReadError::UnsupportedChain(chain_id))?;

        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_call",
            "params": [{
                "to": to,
                "data": data
            }, "latest"],
            "id": 1
        });

        let response = self
            .post(url, &payload)
            .await
            .map_err(|e| ChainReadError::Rpc(format!("{:#}", e)))?;

        if let Some(err) = response.error {
            debug!(chain_id, to, code = err.code, message = %err.message, "eth_call failed");
            return Err(match err.revert_reason() {
                Some(reason) => ChainReadError::Rpc(format!("execution reverted: {}", reason)),
                None => ChainReadError::Rpc(format!("code {}: {}", err.code, err.message)),
            });
        }

        let result = response
            .result
            .ok_or_else(|| ChainReadError::Rpc("no result in RPC response".to_string()))?;
        abi::decode_hex(&result).map_err(ChainReadError::Decode)
    }

    async fn post(&self, url: &str, payload: &serde_json::Value) -> Result<JsonRpcResponse> {
        self.client
            .post(url)
            .json(payload)
            .send()
            .await
            .context("RPC request failed")?
            .json()
            .await
            .context("failed to parse RPC response")
    }
}

#[async_trait::async_trait]
impl ChainReader for JsonRpcChainReader {
    async fn latest_round_data(
        &self,
        chain_id: ChainId,
        feed: &str,
    ) -> Result<RoundData, ChainReadError> {
        let bytes = self
            .eth_call(chain_id, feed, abi::encode_call(abi::LATEST_ROUND_DATA))
            .await?;
        decode_round_data(&bytes).map_err(ChainReadError::Decode)
    }

    async fn decimals(&self, chain_id: ChainId, feed: &str) -> Result<u8, ChainReadError> {
        let bytes = self
            .eth_call(chain_id, feed, abi::encode_call(abi::DECIMALS))
            .await?;
        let value = abi::word_as_u64(&bytes, 0).map_err(ChainReadError::Decode)?;
        u8::try_from(value).map_err(|_| ChainReadError::Decode(format!("decimals {} out of range", value)))
    }

    async fn observe(
        &self,
        chain_id: ChainId,
        pool: &str,
        seconds_agos: [u32; 2],
    ) -> Result<[i64; 2], ChainReadError> {
        let bytes = match self
            .eth_call(chain_id, pool, abi::encode_observe(&seconds_agos))
            .await
        {
            Err(ChainReadError::Rpc(msg)) if is_insufficient_history(&msg) => {
                return Err(ChainReadError::InsufficientHistory {
                    pool: pool.to_string(),
                    seconds_ago: seconds_agos[0],
                })
            }
            other => other?,
        };
        decode_tick_cumulatives(&bytes).map_err(ChainReadError::Decode)
    }

    async fn current_tick(&self, chain_id: ChainId, pool: &str) -> Result<i32, ChainReadError> {
        let bytes = self
            .eth_call(chain_id, pool, abi::encode_call(abi::SLOT0))
            .await?;
        // slot0: (sqrtPriceX96, tick, ...)
        let tick = abi::word_as_i128(&bytes, 1).map_err(ChainReadError::Decode)?;
        i32::try_from(tick).map_err(|_| ChainReadError::Decode(format!("tick {} out of range", tick)))
    }
}

fn is_insufficient_history(msg: &str) -> bool {
    msg.strip_prefix("execution reverted:")
        .map(|reason| reason.trim() == INSUFFICIENT_HISTORY_REASON)
        .unwrap_or(false)
}

/// Decode `(uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound)`.
fn decode_round_data(bytes: &[u8]) -> Result<RoundData, String> {
    Ok(RoundData {
        round_id: abi::word_as_u128(bytes, 0)?,
        answer: abi::word_as_i128(bytes, 1)?,
        started_at: abi::word_as_u64(bytes, 2)?,
        updated_at: abi::word_as_u64(bytes, 3)?,
        answered_in_round: abi::word_as_u128(bytes, 4)?,
    })
}

/// Decode the `int56[] tickCumulatives` half of an `observe` result.
fn decode_tick_cumulatives(bytes: &[u8]) -> Result<[i64; 2], String> {
    let values = abi::signed_array(bytes, 0)?;
    let [a, b] = values.as_slice() else {
        return Err(format!("expected 2 tick cumulatives, got {}", values.len()));
    };
    let narrow = |v: i128| i64::try_from(v).map_err(|_| format!("tick cumulative {} out of range", v));
    Ok([narrow(*a)?, narrow(*b)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_round_data() {
        let blob = [
            format!("{:064x}", 0x1_0000_0000_0000_1234u128),
            format!("{:064x}", 200_012_345_678i128),
            format!("{:064x}", 1_700_000_000u64),
            format!("{:064x}", 1_700_000_060u64),
            format!("{:064x}", 0x1_0000_0000_0000_1234u128),
        ]
        .concat();
        let bytes = abi::decode_hex(&blob).unwrap();
        let round = decode_round_data(&bytes).unwrap();
        assert_eq!(round.answer, 200_012_345_678);
        assert_eq!(round.updated_at, 1_700_000_060);
        assert_eq!(round.round_id, round.answered_in_round);
    }

    #[test]
    fn test_decode_round_data_truncated() {
        let bytes = vec![0u8; 64];
        assert!(decode_round_data(&bytes).is_err());
    }

    #[test]
    fn test_insufficient_history_detection() {
        assert!(is_insufficient_history("execution reverted: OLD"));
        assert!(!is_insufficient_history("execution reverted: LOK"));
        assert!(!is_insufficient_history("code -32000: header not found"));
    }

    #[test]
    fn test_revert_reason_from_message() {
        let err = JsonRpcErrorObject {
            code: 3,
            message: "execution reverted: OLD".to_string(),
            data: None,
        };
        assert_eq!(err.revert_reason().as_deref(), Some("OLD"));
    }

    #[test]
    fn test_parse_endpoint_entry() {
        let (chain, url) = RpcEndpoints::parse_entry("42161=https://arb1.example").unwrap();
        assert_eq!(chain, 42161);
        assert_eq!(url, "https://arb1.example");
        assert!(RpcEndpoints::parse_entry("arbitrum").is_err());
        assert!(RpcEndpoints::parse_entry("x=https://a").is_err());
    }

    #[tokio::test]
    async fn test_unknown_chain_is_unsupported() {
        let reader = JsonRpcChainReader::new(RpcEndpoints::new(), None).unwrap();
        let err = reader.decimals(1, "0xfeed").await.unwrap_err();
        assert_eq!(err, ChainReadError::UnsupportedChain(1));
    }
}
