//! Dual-source price reconciliation.
//!
//! Order of operations for every request:
//! 1. Sequencer gate: a down sequencer fails the request before any price read
//! 2. Oracle and TWAP reads, concurrently; each failure becomes a warning
//! 3. Deviation policy and confidence tier over whatever succeeded
//!
//! | oracle | twap | price  | confidence                   |
//! |--------|------|--------|------------------------------|
//! | ok     | ok   | oracle | HIGH, MEDIUM if oracle stale |
//! | ok     | -    | oracle | MEDIUM, LOW if oracle stale  |
//! | -      | ok   | twap   | LOW                          |
//! | -      | -    | fails with `AllOraclesFailed`         |

use rust_decimal::Decimal;
use tracing::{info, warn};

use super::chainlink::ChainlinkPriceReader;
use super::error::{pct, OracleGuardError, Result};
use super::events::{EventBus, GuardEvent};
use super::sequencer::SequencerHealthChecker;
use super::twap::TwapPriceReader;
use super::types::{ConfidenceTier, PriceObservation, PriceSources, SequencerStatus, ValidatedPrice};
use crate::chain::ChainId;

/// Warn / reject tolerance band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviationPolicy {
    pub warn_threshold: Decimal,
    pub reject_threshold: Decimal,
}

/// Where a deviation falls in the tolerance band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviationBand {
    Within,
    Warn,
    Reject,
}

impl DeviationPolicy {
    pub fn classify(&self, deviation: Decimal) -> DeviationBand {
        if deviation > self.reject_threshold {
            DeviationBand::Reject
        } else if deviation > self.warn_threshold {
            DeviationBand::Warn
        } else {
            DeviationBand::Within
        }
    }
}

/// `|reference - other| / reference`. `None` for a non-positive reference.
pub fn deviation(reference: Decimal, other: Decimal) -> Option<Decimal> {
    if reference <= Decimal::ZERO {
        return None;
    }
    (reference - other).abs().checked_div(reference)
}

pub struct PriceReconciler {
    chainlink: ChainlinkPriceReader,
    twap: TwapPriceReader,
    sequencer: SequencerHealthChecker,
    policy: DeviationPolicy,
    twap_period_secs: u32,
    events: EventBus,
}

impl PriceReconciler {
    pub fn new(
        chainlink: ChainlinkPriceReader,
        twap: TwapPriceReader,
        sequencer: SequencerHealthChecker,
        policy: DeviationPolicy,
        twap_period_secs: u32,
        events: EventBus,
    ) -> Self {
        Self {
            chainlink,
            twap,
            sequencer,
            policy,
            twap_period_secs,
            events,
        }
    }

    pub fn policy(&self) -> DeviationPolicy {
        self.policy
    }

    pub fn sequencer(&self) -> &SequencerHealthChecker {
        &self.sequencer
    }

    pub fn chainlink(&self) -> &ChainlinkPriceReader {
        &self.chainlink
    }

    pub fn twap(&self) -> &TwapPriceReader {
        &self.twap
    }

    pub fn twap_period_secs(&self) -> u32 {
        self.twap_period_secs
    }

    pub async fn get_validated_price(
        &self,
        pair: &str,
        chain_id: ChainId,
        twap_pool: Option<&str>,
    ) -> Result<ValidatedPrice> {
        let sequencer = self.sequencer.check_sequencer(chain_id).await?;
        if !sequencer.is_up {
            self.events.emit(GuardEvent::SequencerDown {
                chain_id,
                since: sequencer.down_since,
            });
            return Err(OracleGuardError::SequencerDown {
                chain_id,
                since: sequencer.down_since,
            });
        }

        let oracle_read = self.chainlink.fetch_price(pair, chain_id);
        let twap_read = async {
            match twap_pool {
                Some(pool) => Some(self.twap.fetch_twap(chain_id, pool, self.twap_period_secs).await),
                None => None,
            }
        };
        let (oracle, twap) = tokio::join!(oracle_read, twap_read);

        let outcome = reconcile(pair, chain_id, sequencer, oracle, twap, &self.policy);
        match &outcome {
            Ok(validated) => info!(
                chain_id,
                pair,
                price = %validated.price,
                confidence = %validated.confidence,
                warnings = validated.warnings.len(),
                "validated price"
            ),
            Err(OracleGuardError::DeviationExceeded {
                oracle_price,
                twap_price,
                deviation,
                ..
            }) => {
                warn!(chain_id, pair, %oracle_price, %twap_price, %deviation, "price deviation rejected");
                self.events.emit(GuardEvent::DeviationRejected {
                    chain_id,
                    pair: pair.to_string(),
                    oracle_price: *oracle_price,
                    twap_price: *twap_price,
                    deviation: *deviation,
                });
            }
            Err(e) => warn!(chain_id, pair, error = %e, "price validation failed"),
        }
        outcome
    }
}

/// Combine source outcomes into a validated price. Pure; no I/O.
///
/// `twap` is `None` when no pool was supplied.
pub fn reconcile(
    pair: &str,
    chain_id: ChainId,
    sequencer: SequencerStatus,
    oracle: Result<PriceObservation>,
    twap: Option<Result<PriceObservation>>,
    policy: &DeviationPolicy,
) -> Result<ValidatedPrice> {
    if !sequencer.is_up {
        return Err(OracleGuardError::SequencerDown {
            chain_id,
            since: sequencer.down_since,
        });
    }

    let mut warnings = Vec::new();
    let mut failures = Vec::new();

    if sequencer.grace_period_active {
        warnings.push(format!(
            "Sequencer recovered {}s ago; prices may be volatile during grace period ({}s remaining)",
            sequencer.secs_since_up.unwrap_or_default(),
            sequencer.grace_period_remaining_secs
        ));
    }

    let oracle = match oracle {
        Ok(obs) => Some(obs),
        Err(e) => {
            warnings.push(format!("Oracle read failed: {}", e));
            failures.push(format!("oracle: {}", e));
            None
        }
    };

    let twap = match twap {
        Some(Ok(obs)) => {
            warnings.extend(obs.warnings.iter().cloned());
            Some(obs)
        }
        Some(Err(e)) => {
            warnings.push(format!("TWAP read failed: {}", e));
            failures.push(format!("twap: {}", e));
            None
        }
        None => {
            failures.push("twap: no pool supplied".to_string());
            None
        }
    };

    if let Some(obs) = &oracle {
        if obs.is_stale {
            warnings.push(format!("Oracle price is stale ({}s since last update)", obs.age_secs));
        }
    }

    let (price, confidence, deviation_value) = match (&oracle, &twap) {
        (Some(o), Some(t)) => {
            let dev = deviation(o.price, t.price).ok_or_else(|| OracleGuardError::InvalidPrice {
                pair: pair.to_string(),
                chain_id,
                detail: format!("oracle price {} cannot anchor a deviation", o.price),
            })?;
            match policy.classify(dev) {
                DeviationBand::Reject => {
                    return Err(OracleGuardError::DeviationExceeded {
                        pair: pair.to_string(),
                        chain_id,
                        oracle_price: o.price,
                        twap_price: t.price,
                        deviation: dev,
                        threshold: policy.reject_threshold,
                    })
                }
                DeviationBand::Warn => warnings.push(format!(
                    "Price deviation {}% between oracle ({}) and TWAP ({}) exceeds {}% warning threshold",
                    pct(dev),
                    o.price,
                    t.price,
                    pct(policy.warn_threshold)
                )),
                DeviationBand::Within => {}
            }
            let confidence = if o.is_stale {
                ConfidenceTier::Medium
            } else {
                ConfidenceTier::High
            };
            (o.price, confidence, Some(dev))
        }
        (Some(o), None) => {
            warnings.push("Price from single oracle source; no TWAP confirmation".to_string());
            let confidence = if o.is_stale {
                ConfidenceTier::Low
            } else {
                ConfidenceTier::Medium
            };
            (o.price, confidence, None)
        }
        (None, Some(t)) => {
            warnings.push("TWAP-only price; oracle unavailable".to_string());
            (t.price, ConfidenceTier::Low, None)
        }
        (None, None) => {
            return Err(OracleGuardError::AllOraclesFailed {
                pair: pair.to_string(),
                chain_id,
                failures,
            })
        }
    };

    if price <= Decimal::ZERO {
        return Err(OracleGuardError::InvalidPrice {
            pair: pair.to_string(),
            chain_id,
            detail: format!("reconciled price {} is not positive", price),
        });
    }

    Ok(ValidatedPrice {
        pair: pair.to_string(),
        chain_id,
        price,
        confidence,
        sources: PriceSources { oracle, twap },
        deviation: deviation_value,
        warnings,
        sequencer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::types::SourceKind;
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal_macros::dec;

    const POLICY: DeviationPolicy = DeviationPolicy {
        warn_threshold: Decimal::from_parts(2, 0, 0, false, 2),
        reject_threshold: Decimal::from_parts(5, 0, 0, false, 2),
    };

    fn obs(price: Decimal, source: SourceKind, is_stale: bool) -> PriceObservation {
        PriceObservation {
            price,
            age_secs: if is_stale { 7200 } else { 30 },
            is_stale,
            source,
            round_id: None,
            warnings: Vec::new(),
        }
    }

    fn failed() -> Result<PriceObservation> {
        Err(OracleGuardError::UnsupportedPair {
            pair: "ETH/USD".to_string(),
            chain_id: 1,
        })
    }

    fn run(
        oracle: Result<PriceObservation>,
        twap: Option<Result<PriceObservation>>,
    ) -> Result<ValidatedPrice> {
        reconcile("ETH/USD", 1, SequencerStatus::l1(), oracle, twap, &POLICY)
    }

    #[test]
    fn test_deviation_formula() {
        assert_eq!(deviation(dec!(2000), dec!(2500)), Some(dec!(0.25)));
        assert_eq!(deviation(dec!(2000), dec!(1500)), Some(dec!(0.25)));
        assert_eq!(deviation(Decimal::ZERO, dec!(1)), None);
    }

    #[test]
    fn test_policy_bands_are_exclusive_at_threshold() {
        assert_eq!(POLICY.classify(dec!(0.02)), DeviationBand::Within);
        assert_eq!(POLICY.classify(dec!(0.0200001)), DeviationBand::Warn);
        assert_eq!(POLICY.classify(dec!(0.05)), DeviationBand::Warn);
        assert_eq!(POLICY.classify(dec!(0.0500001)), DeviationBand::Reject);
    }

    #[test]
    fn test_decimal_deviation_agrees_with_float() {
        let pairs = [(dec!(2000), dec!(2060)), (dec!(1.0001), dec!(0.9999)), (dec!(65000.5), dec!(61750.475))];
        for (a, b) in pairs {
            let d = deviation(a, b).unwrap().to_f64().unwrap();
            let (fa, fb) = (a.to_f64().unwrap(), b.to_f64().unwrap());
            let f = (fa - fb).abs() / fa;
            assert!((d - f).abs() < 1e-12, "{} vs {}", d, f);
        }
    }

    #[test]
    fn test_both_sources_agree_high() {
        let v = run(
            Ok(obs(dec!(2000), SourceKind::Oracle, false)),
            Some(Ok(obs(dec!(2000.035), SourceKind::Twap, false))),
        )
        .unwrap();
        assert_eq!(v.confidence, ConfidenceTier::High);
        assert_eq!(v.price, dec!(2000));
        assert!(v.warnings.is_empty(), "{:?}", v.warnings);
    }

    #[test]
    fn test_both_sources_stale_oracle_medium() {
        let v = run(
            Ok(obs(dec!(2000), SourceKind::Oracle, true)),
            Some(Ok(obs(dec!(2000), SourceKind::Twap, false))),
        )
        .unwrap();
        assert_eq!(v.confidence, ConfidenceTier::Medium);
        assert!(v.warnings.iter().any(|w| w.contains("stale")));
    }

    #[test]
    fn test_single_source_containment_is_symmetric() {
        let oracle_only = run(Ok(obs(dec!(2000), SourceKind::Oracle, false)), Some(failed())).unwrap();
        assert_eq!(oracle_only.price, dec!(2000));
        assert_eq!(oracle_only.confidence, ConfidenceTier::Medium);
        assert!(oracle_only.warnings.iter().any(|w| w.contains("single oracle")));

        let stale_only = run(Ok(obs(dec!(2000), SourceKind::Oracle, true)), None).unwrap();
        assert_eq!(stale_only.confidence, ConfidenceTier::Low);

        let twap_only = run(failed(), Some(Ok(obs(dec!(1999), SourceKind::Twap, false)))).unwrap();
        assert_eq!(twap_only.price, dec!(1999));
        assert_eq!(twap_only.confidence, ConfidenceTier::Low);
        assert!(twap_only.warnings.iter().any(|w| w.contains("TWAP-only")));
        assert!(twap_only.warnings.iter().any(|w| w.contains("Oracle read failed")));
    }

    #[test]
    fn test_all_failed() {
        let err = run(failed(), Some(failed())).unwrap_err();
        match err {
            OracleGuardError::AllOraclesFailed { failures, .. } => assert_eq!(failures.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(run(failed(), None), Err(OracleGuardError::AllOraclesFailed { .. })));
    }

    #[test]
    fn test_reject_above_threshold() {
        let err = run(
            Ok(obs(dec!(2000), SourceKind::Oracle, false)),
            Some(Ok(obs(dec!(2500), SourceKind::Twap, false))),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OracleGuardError::DeviationExceeded { deviation, threshold, .. }
                if deviation == dec!(0.25) && threshold == dec!(0.05)
        ));
    }

    #[test]
    fn test_spot_warning_carried_forward() {
        let mut spot = obs(dec!(2001), SourceKind::Spot, false);
        spot.warnings.push("TWAP unavailable for pool 0xpool".to_string());
        let v = run(Ok(obs(dec!(2000), SourceKind::Oracle, false)), Some(Ok(spot))).unwrap();
        assert_eq!(v.confidence, ConfidenceTier::High);
        assert_eq!(v.sources.twap.as_ref().map(|t| t.source), Some(SourceKind::Spot));
        assert!(v.warnings.iter().any(|w| w.contains("TWAP unavailable")));
    }

    #[test]
    fn test_grace_period_warning_first() {
        let sequencer = SequencerStatus {
            is_up: true,
            is_l1: false,
            up_since: Some(100),
            secs_since_up: Some(120),
            down_since: None,
            grace_period_active: true,
            grace_period_remaining_secs: 3480,
            message: None,
        };
        let v = reconcile(
            "ETH/USD",
            42161,
            sequencer,
            Ok(obs(dec!(2000), SourceKind::Oracle, false)),
            None,
            &POLICY,
        )
        .unwrap();
        assert!(v.warnings[0].contains("grace period"));
    }
}
