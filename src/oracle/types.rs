//! Per-call result types.
//!
//! None of these are persisted or cached: each is built fresh by the call that
//! returns it and owned by the caller afterwards.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::OracleGuardError;

/// Where a price observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    /// Round-based on-chain price feed.
    Oracle,
    /// Time-weighted average over pool tick cumulatives.
    Twap,
    /// Instantaneous pool tick (TWAP fallback).
    Spot,
}

/// A single source reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub price: Decimal,
    pub age_secs: u64,
    pub is_stale: bool,
    pub source: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_id: Option<String>,
    /// Source-level caveats (e.g. TWAP degraded to spot).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Qualitative trust label for a validated price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// L2 sequencer liveness at the time of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerStatus {
    pub is_up: bool,
    /// True when the chain has no sequencer feed (L1 or unconfigured L2).
    pub is_l1: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_since: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secs_since_up: Option<u64>,
    /// When the current outage began, if down.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down_since: Option<u64>,
    /// Only meaningful when `is_up`.
    pub grace_period_active: bool,
    pub grace_period_remaining_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SequencerStatus {
    /// Status for chains without a sequencer feed.
    pub fn l1() -> Self {
        Self {
            is_up: true,
            is_l1: true,
            up_since: None,
            secs_since_up: None,
            down_since: None,
            grace_period_active: false,
            grace_period_remaining_secs: 0,
            message: None,
        }
    }
}

/// The two optional source readings behind a [`ValidatedPrice`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle: Option<PriceObservation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twap: Option<PriceObservation>,
}

/// A reconciled price that downstream decisions may rely on.
///
/// Only ever constructed with a strictly positive `price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedPrice {
    pub pair: String,
    pub chain_id: u64,
    pub price: Decimal,
    pub confidence: ConfidenceTier,
    pub sources: PriceSources,
    /// Oracle/TWAP deviation, when both sources answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviation: Option<Decimal>,
    pub warnings: Vec<String>,
    pub sequencer: SequencerStatus,
}

/// Outcome of checking an external quote against the reconciled price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteVerdict {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviation: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle_price: Option<Decimal>,
    pub quoted_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<ConfidenceTier>,
    pub warnings: Vec<String>,
    pub bypassed_validation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl QuoteVerdict {
    /// Turn a rejection into [`OracleGuardError::OracleValidationFailed`].
    pub fn into_result(self) -> Result<Self, OracleGuardError> {
        if self.accepted {
            return Ok(self);
        }
        Err(OracleGuardError::OracleValidationFailed {
            quoted_price: self.quoted_price,
            reason: self
                .rejection_reason
                .unwrap_or_else(|| "quote rejected".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_confidence_ordering() {
        assert!(ConfidenceTier::High > ConfidenceTier::Medium);
        assert!(ConfidenceTier::Medium > ConfidenceTier::Low);
    }

    #[test]
    fn test_source_kind_serializes_upper() {
        let json = serde_json::to_string(&SourceKind::Spot).unwrap();
        assert_eq!(json, "\"SPOT\"");
    }

    #[test]
    fn test_rejected_verdict_into_result() {
        let verdict = QuoteVerdict {
            accepted: false,
            deviation: Some(dec!(0.1)),
            oracle_price: Some(dec!(2000)),
            quoted_price: dec!(2200),
            confidence: None,
            warnings: vec![],
            bypassed_validation: false,
            rejection_reason: Some("too far".to_string()),
        };
        match verdict.into_result() {
            Err(OracleGuardError::OracleValidationFailed { reason, quoted_price }) => {
                assert_eq!(reason, "too far");
                assert_eq!(quoted_price, dec!(2200));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
