//! Oracle guard failure taxonomy.

use rust_decimal::Decimal;

use crate::chain::{ChainId, ChainReadError};

/// Every failure the guard can surface.
///
/// Lower layers (readers, sequencer checker) always return these; only the
/// reconciler decides which ones are absorbed into warnings.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleGuardError {
    /// No feed configured for the pair on this chain.
    UnsupportedPair { pair: String, chain_id: ChainId },
    /// `answeredInRound < roundId`: the round is still being aggregated.
    IncompleteRound {
        pair: String,
        chain_id: ChainId,
        round_id: u128,
        answered_in_round: u128,
    },
    /// Non-positive or unrepresentable price.
    InvalidPrice {
        pair: String,
        chain_id: ChainId,
        detail: String,
    },
    /// L2 sequencer reports down; nothing downstream may price.
    SequencerDown {
        chain_id: ChainId,
        since: Option<u64>,
    },
    /// Neither the oracle nor the TWAP produced a usable price.
    AllOraclesFailed {
        pair: String,
        chain_id: ChainId,
        failures: Vec<String>,
    },
    /// Oracle and TWAP disagree beyond the reject threshold.
    DeviationExceeded {
        pair: String,
        chain_id: ChainId,
        oracle_price: Decimal,
        twap_price: Decimal,
        deviation: Decimal,
        threshold: Decimal,
    },
    /// A quote was rejected (see [`QuoteVerdict::into_result`](super::QuoteVerdict::into_result)).
    OracleValidationFailed { quoted_price: Decimal, reason: String },
    /// The chain-data collaborator failed.
    ChainRead {
        operation: &'static str,
        target: String,
        chain_id: ChainId,
        source: ChainReadError,
    },
    /// A collaborator read exceeded the configured deadline.
    Timeout {
        operation: &'static str,
        target: String,
        chain_id: ChainId,
        after_ms: u64,
    },
    InvalidConfig(String),
}

impl OracleGuardError {
    /// Whether the oracle guard must treat this as a trade-blocking gate.
    pub fn is_hard_gate(&self) -> bool {
        matches!(
            self,
            Self::SequencerDown { .. } | Self::DeviationExceeded { .. }
        )
    }
}

impl std::fmt::Display for OracleGuardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedPair { pair, chain_id } => {
                write!(f, "no price feed configured for {} on chain {}", pair, chain_id)
            }
            Self::IncompleteRound {
                pair,
                chain_id,
                round_id,
                answered_in_round,
            } => write!(
                f,
                "incomplete round for {} on chain {}: answeredInRound {} < roundId {}",
                pair, chain_id, answered_in_round, round_id
            ),
            Self::InvalidPrice {
                pair,
                chain_id,
                detail,
            } => write!(f, "invalid price for {} on chain {}: {}", pair, chain_id, detail),
            Self::SequencerDown { chain_id, since } => match since {
                Some(ts) => write!(
                    f,
                    "sequencer on chain {} is down since {}; do not execute trades",
                    chain_id, ts
                ),
                None => write!(
                    f,
                    "sequencer on chain {} is down; do not execute trades",
                    chain_id
                ),
            },
            Self::AllOraclesFailed {
                pair,
                chain_id,
                failures,
            } => write!(
                f,
                "all price sources failed for {} on chain {}: {}",
                pair,
                chain_id,
                failures.join("; ")
            ),
            Self::DeviationExceeded {
                pair,
                chain_id,
                oracle_price,
                twap_price,
                deviation,
                threshold,
            } => write!(
                f,
                "price deviation {}% for {} on chain {} exceeds {}% threshold (oracle {}, twap {}); possible manipulation",
                pct(*deviation),
                pair,
                chain_id,
                pct(*threshold),
                oracle_price,
                twap_price
            ),
            Self::OracleValidationFailed {
                quoted_price,
                reason,
            } => write!(f, "quote {} failed oracle validation: {}", quoted_price, reason),
            Self::ChainRead {
                operation,
                target,
                chain_id,
                source,
            } => write!(
                f,
                "{} on {} (chain {}) failed: {}",
                operation, target, chain_id, source
            ),
            Self::Timeout {
                operation,
                target,
                chain_id,
                after_ms,
            } => write!(
                f,
                "{} on {} (chain {}) timed out after {}ms",
                operation, target, chain_id, after_ms
            ),
            Self::InvalidConfig(msg) => write!(f, "invalid oracle guard configuration: {}", msg),
        }
    }
}

impl std::error::Error for OracleGuardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ChainRead { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Render a ratio as a percentage with two decimals (0.05 -> "5.00").
pub fn pct(ratio: Decimal) -> String {
    format!("{:.2}", (ratio * Decimal::ONE_HUNDRED).round_dp(2))
}

/// Convenience result type for oracle guard operations.
pub type Result<T> = std::result::Result<T, OracleGuardError>;
