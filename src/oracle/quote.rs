//! External quote validation (aggregator or RFQ prices) against the reconciled price.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{pct, OracleGuardError};
use super::events::{EventBus, GuardEvent};
use super::reconciler::{deviation, DeviationBand, DeviationPolicy, PriceReconciler};
use super::types::{QuoteVerdict, ValidatedPrice};
use crate::chain::ChainId;

pub struct QuoteValidator {
    reconciler: Arc<PriceReconciler>,
    events: EventBus,
}

impl QuoteValidator {
    pub fn new(reconciler: Arc<PriceReconciler>, events: EventBus) -> Self {
        Self { reconciler, events }
    }

    /// Check `quoted_price` against the validated price for `pair`.
    ///
    /// With `require_oracle == false` a failed reconciliation accepts the
    /// quote unvalidated and flags it as bypassed, whatever the failure was.
    pub async fn validate_quote(
        &self,
        quoted_price: Decimal,
        pair: &str,
        chain_id: ChainId,
        twap_pool: Option<&str>,
        require_oracle: bool,
    ) -> QuoteVerdict {
        if quoted_price <= Decimal::ZERO {
            warn!(chain_id, pair, %quoted_price, "non-positive quote rejected");
            return QuoteVerdict {
                accepted: false,
                deviation: None,
                oracle_price: None,
                quoted_price,
                confidence: None,
                warnings: Vec::new(),
                bypassed_validation: false,
                rejection_reason: Some(format!("quoted price {} is not positive", quoted_price)),
            };
        }

        match self
            .reconciler
            .get_validated_price(pair, chain_id, twap_pool)
            .await
        {
            Ok(validated) => {
                let verdict = judge_quote(quoted_price, &validated, &self.reconciler.policy());
                info!(
                    chain_id,
                    pair,
                    %quoted_price,
                    oracle_price = %validated.price,
                    accepted = verdict.accepted,
                    "quote checked"
                );
                verdict
            }
            Err(e) => self.on_reconcile_failure(quoted_price, pair, chain_id, e, require_oracle),
        }
    }

    fn on_reconcile_failure(
        &self,
        quoted_price: Decimal,
        pair: &str,
        chain_id: ChainId,
        error: OracleGuardError,
        require_oracle: bool,
    ) -> QuoteVerdict {
        if require_oracle {
            warn!(chain_id, pair, %quoted_price, error = %error, "quote rejected");
            return QuoteVerdict {
                accepted: false,
                deviation: None,
                oracle_price: None,
                quoted_price,
                confidence: None,
                warnings: Vec::new(),
                bypassed_validation: false,
                rejection_reason: Some(format!(
                    "Oracle validation required but failed: {}",
                    error
                )),
            };
        }

        warn!(
            chain_id,
            pair,
            %quoted_price,
            error = %error,
            hard_gate = error.is_hard_gate(),
            "quote accepted without oracle validation"
        );
        self.events.emit(GuardEvent::QuoteBypassed {
            chain_id,
            pair: pair.to_string(),
            quoted_price,
            reason: error.to_string(),
        });
        QuoteVerdict {
            accepted: true,
            deviation: None,
            oracle_price: None,
            quoted_price,
            confidence: None,
            warnings: vec![format!(
                "Oracle validation bypassed: {}; quote accepted unvalidated",
                error
            )],
            bypassed_validation: true,
            rejection_reason: None,
        }
    }
}

/// Apply the deviation policy to a quote versus a validated price. Pure.
pub fn judge_quote(
    quoted_price: Decimal,
    validated: &ValidatedPrice,
    policy: &DeviationPolicy,
) -> QuoteVerdict {
    let mut warnings = validated.warnings.clone();
    let dev = deviation(validated.price, quoted_price);

    let mut verdict = QuoteVerdict {
        accepted: true,
        deviation: dev,
        oracle_price: Some(validated.price),
        quoted_price,
        confidence: Some(validated.confidence),
        warnings: Vec::new(),
        bypassed_validation: false,
        rejection_reason: None,
    };

    // ValidatedPrice is always positive, so `dev` is always Some here.
    match dev.map(|d| (d, policy.classify(d))) {
        Some((d, DeviationBand::Reject)) => {
            verdict.accepted = false;
            verdict.rejection_reason = Some(format!(
                "Quote {} deviates {}% from oracle price {} (max {}%)",
                quoted_price,
                pct(d),
                validated.price,
                pct(policy.reject_threshold)
            ));
        }
        Some((d, DeviationBand::Warn)) => warnings.push(format!(
            "Quote {} deviates {}% from oracle price {} (warning threshold {}%)",
            quoted_price,
            pct(d),
            validated.price,
            pct(policy.warn_threshold)
        )),
        Some((_, DeviationBand::Within)) | None => {}
    }

    verdict.warnings = warnings;
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::types::{ConfidenceTier, PriceSources, SequencerStatus};
    use rust_decimal_macros::dec;

    fn policy() -> DeviationPolicy {
        DeviationPolicy {
            warn_threshold: dec!(0.02),
            reject_threshold: dec!(0.05),
        }
    }

    fn validated(price: Decimal) -> ValidatedPrice {
        ValidatedPrice {
            pair: "ETH/USD".to_string(),
            chain_id: 1,
            price,
            confidence: ConfidenceTier::Medium,
            sources: PriceSources::default(),
            deviation: None,
            warnings: vec!["Price from single oracle source; no TWAP confirmation".to_string()],
            sequencer: SequencerStatus::l1(),
        }
    }

    #[test]
    fn test_quote_within_band() {
        let v = judge_quote(dec!(2010), &validated(dec!(2000)), &policy());
        assert!(v.accepted);
        assert_eq!(v.deviation, Some(dec!(0.005)));
        assert_eq!(v.confidence, Some(ConfidenceTier::Medium));
        assert_eq!(v.warnings.len(), 1);
    }

    #[test]
    fn test_quote_warn_band() {
        let v = judge_quote(dec!(2060), &validated(dec!(2000)), &policy());
        assert!(v.accepted);
        assert!(v.warnings.iter().any(|w| w.contains("3.00%")));
    }

    #[test]
    fn test_quote_rejected_names_both_prices() {
        let v = judge_quote(dec!(2200), &validated(dec!(2000)), &policy());
        assert!(!v.accepted);
        assert!(!v.bypassed_validation);
        let reason = v.rejection_reason.unwrap();
        assert!(reason.contains("2200"));
        assert!(reason.contains("2000"));
        assert!(reason.contains("10.00%"));
    }

    #[test]
    fn test_quote_at_reject_threshold_accepted() {
        let v = judge_quote(dec!(2100), &validated(dec!(2000)), &policy());
        assert!(v.accepted);
        assert_eq!(v.deviation, Some(dec!(0.05)));
    }
}
