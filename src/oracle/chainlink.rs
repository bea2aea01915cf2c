//! Round-based price feed reader (AggregatorV3Interface).
//!
//! Checks applied to every `latestRoundData()` answer:
//! - **Round completeness**: `answeredInRound >= roundId`, otherwise the round is mid-update
//! - **Positivity**: `answer > 0`
//! - **Staleness**: `now - updatedAt > heartbeat(pair)` marks the reading stale; this is
//!   not fatal here, the reconciler downgrades confidence instead

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use super::error::{OracleGuardError, Result};
use super::read::{bounded_read, ReadTarget};
use super::registry::{FeedRegistry, HeartbeatRegistry};
use super::types::{PriceObservation, SourceKind};
use crate::chain::{ChainId, ChainReader, Clock, RoundData};

pub struct ChainlinkPriceReader {
    chain: Arc<dyn ChainReader>,
    feeds: Arc<FeedRegistry>,
    heartbeats: Arc<HeartbeatRegistry>,
    clock: Arc<dyn Clock>,
    read_timeout_ms: Option<u64>,
}

impl ChainlinkPriceReader {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        feeds: Arc<FeedRegistry>,
        heartbeats: Arc<HeartbeatRegistry>,
        clock: Arc<dyn Clock>,
        read_timeout_ms: Option<u64>,
    ) -> Self {
        Self {
            chain,
            feeds,
            heartbeats,
            clock,
            read_timeout_ms,
        }
    }

    /// Fetch and validate the latest answer for `pair` on `chain_id`.
    pub async fn fetch_price(&self, pair: &str, chain_id: ChainId) -> Result<PriceObservation> {
        let feed = self
            .feeds
            .resolve_feed(chain_id, pair)
            .ok_or_else(|| OracleGuardError::UnsupportedPair {
                pair: pair.to_string(),
                chain_id,
            })?;

        let (round, decimals) = tokio::join!(
            bounded_read(
                self.read_timeout_ms,
                ReadTarget {
                    operation: "latestRoundData",
                    target: &feed,
                    chain_id,
                },
                self.chain.latest_round_data(chain_id, &feed),
            ),
            bounded_read(
                self.read_timeout_ms,
                ReadTarget {
                    operation: "decimals",
                    target: &feed,
                    chain_id,
                },
                self.chain.decimals(chain_id, &feed),
            ),
        );
        let round = round?;
        let decimals = decimals?;

        let heartbeat = self.heartbeats.heartbeat(pair);
        let observation = validate_round(pair, chain_id, &round, decimals, heartbeat, self.clock.now_secs())?;

        debug!(
            chain_id,
            pair,
            price = %observation.price,
            age_secs = observation.age_secs,
            heartbeat,
            is_stale = observation.is_stale,
            "oracle price read"
        );
        Ok(observation)
    }
}

/// Apply completeness, positivity and staleness checks to a raw round.
pub fn validate_round(
    pair: &str,
    chain_id: ChainId,
    round: &RoundData,
    decimals: u8,
    heartbeat_secs: u64,
    now_secs: u64,
) -> Result<PriceObservation> {
    if round.answered_in_round < round.round_id {
        return Err(OracleGuardError::IncompleteRound {
            pair: pair.to_string(),
            chain_id,
            round_id: round.round_id,
            answered_in_round: round.answered_in_round,
        });
    }

    if round.answer <= 0 {
        return Err(OracleGuardError::InvalidPrice {
            pair: pair.to_string(),
            chain_id,
            detail: format!("non-positive answer {}", round.answer),
        });
    }

    let price = Decimal::try_from_i128_with_scale(round.answer, u32::from(decimals)).map_err(|e| {
        OracleGuardError::InvalidPrice {
            pair: pair.to_string(),
            chain_id,
            detail: format!("answer {} with {} decimals: {}", round.answer, decimals, e),
        }
    })?;

    let age_secs = now_secs.saturating_sub(round.updated_at);

    Ok(PriceObservation {
        price,
        age_secs,
        is_stale: age_secs > heartbeat_secs,
        source: SourceKind::Oracle,
        round_id: Some(round.round_id.to_string()),
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const NOW: u64 = 1_700_000_000;

    fn round(answer: i128, updated_at: u64) -> RoundData {
        RoundData {
            round_id: 110_680_464_442_257_320_000,
            answer,
            started_at: updated_at,
            updated_at,
            answered_in_round: 110_680_464_442_257_320_000,
        }
    }

    #[test]
    fn test_valid_round_converts_decimals() {
        let obs = validate_round("ETH/USD", 1, &round(200_012_345_678, NOW - 60), 8, 3600, NOW).unwrap();
        assert_eq!(obs.price, dec!(2000.12345678));
        assert_eq!(obs.age_secs, 60);
        assert!(!obs.is_stale);
        assert_eq!(obs.source, SourceKind::Oracle);
        assert_eq!(obs.round_id.as_deref(), Some("110680464442257320000"));
    }

    #[test]
    fn test_incomplete_round() {
        let mut r = round(200_000_000_000, NOW);
        r.answered_in_round = r.round_id - 1;
        let err = validate_round("ETH/USD", 1, &r, 8, 3600, NOW).unwrap_err();
        assert!(matches!(err, OracleGuardError::IncompleteRound { .. }));
    }

    #[test]
    fn test_answered_in_later_round_is_complete() {
        let mut r = round(200_000_000_000, NOW);
        r.answered_in_round = r.round_id + 1;
        assert!(validate_round("ETH/USD", 1, &r, 8, 3600, NOW).is_ok());
    }

    #[test]
    fn test_non_positive_answer() {
        for answer in [0, -1] {
            let err = validate_round("ETH/USD", 1, &round(answer, NOW), 8, 3600, NOW).unwrap_err();
            assert!(matches!(err, OracleGuardError::InvalidPrice { .. }));
        }
    }

    #[test]
    fn test_staleness_boundary() {
        // age == heartbeat is still fresh
        let fresh = validate_round("ETH/USD", 1, &round(1, NOW - 3600), 8, 3600, NOW).unwrap();
        assert!(!fresh.is_stale);
        let stale = validate_round("ETH/USD", 1, &round(1, NOW - 3601), 8, 3600, NOW).unwrap();
        assert!(stale.is_stale);
        assert_eq!(stale.age_secs, 3601);
    }

    #[test]
    fn test_future_timestamp_has_zero_age() {
        let obs = validate_round("ETH/USD", 1, &round(1, NOW + 30), 8, 3600, NOW).unwrap();
        assert_eq!(obs.age_secs, 0);
    }

    #[test]
    fn test_unrepresentable_scale() {
        let err = validate_round("ETH/USD", 1, &round(1, NOW), 40, 3600, NOW).unwrap_err();
        assert!(matches!(err, OracleGuardError::InvalidPrice { .. }));
    }
}
