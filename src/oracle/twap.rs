//! TWAP (Time-Weighted Average Price) from concentrated-liquidity tick cumulatives.
//!
//! ```text
//! averageTick = floor((tickCumulative[now] - tickCumulative[now - period]) / period)
//! price       = 1.0001 ^ averageTick
//! ```
//!
//! Young pools that cannot answer `observe` for the full window fall back to the
//! current tick, tagged [`SourceKind::Spot`] with a warning.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::{OracleGuardError, Result};
use super::read::{bounded_read, ReadTarget};
use super::types::{PriceObservation, SourceKind};
use crate::chain::{ChainId, ChainReadError, ChainReader};

/// Concentrated-liquidity tick base.
pub const TICK_BASE: Decimal = Decimal::from_parts(10_001, 0, 0, false, 4); // 1.0001

/// Largest tick a V3 pool can report.
pub const MAX_TICK: i64 = 887_272;

/// `floor(delta / period)`, rounding toward negative infinity like the pool library.
pub fn average_tick(cumulatives: [i64; 2], period_secs: u32) -> Option<i64> {
    if period_secs == 0 {
        return None;
    }
    let delta = i128::from(cumulatives[1]) - i128::from(cumulatives[0]);
    let tick = delta.div_euclid(i128::from(period_secs));
    i64::try_from(tick).ok()
}

/// `1.0001^tick`. `None` when the result does not fit a `Decimal`, including
/// deep negative ticks whose price rounds to zero at 28 decimal places.
pub fn tick_to_price(tick: i64) -> Option<Decimal> {
    if tick.abs() > MAX_TICK {
        return None;
    }
    TICK_BASE
        .checked_powi(tick)
        .filter(|price| *price > Decimal::ZERO)
}

pub struct TwapPriceReader {
    chain: Arc<dyn ChainReader>,
    read_timeout_ms: Option<u64>,
}

impl TwapPriceReader {
    pub fn new(chain: Arc<dyn ChainReader>, read_timeout_ms: Option<u64>) -> Self {
        Self {
            chain,
            read_timeout_ms,
        }
    }

    /// TWAP over `period_secs`, or spot if the pool lacks history.
    pub async fn fetch_twap(
        &self,
        chain_id: ChainId,
        pool: &str,
        period_secs: u32,
    ) -> Result<PriceObservation> {
        if period_secs == 0 {
            return Err(OracleGuardError::InvalidConfig(
                "TWAP period must be positive".to_string(),
            ));
        }

        let observed = bounded_read(
            self.read_timeout_ms,
            ReadTarget {
                operation: "observe",
                target: pool,
                chain_id,
            },
            self.chain.observe(chain_id, pool, [period_secs, 0]),
        )
        .await;

        match observed {
            Ok(cumulatives) => {
                let tick = average_tick(cumulatives, period_secs).ok_or_else(|| {
                    invalid_tick(pool, chain_id, format!("tick cumulatives {:?} overflow", cumulatives))
                })?;
                let price = tick_to_price(tick)
                    .ok_or_else(|| invalid_tick(pool, chain_id, format!("average tick {} has no representable price", tick)))?;
                debug!(chain_id, pool, tick, price = %price, period_secs, "TWAP price read");
                Ok(PriceObservation {
                    price,
                    age_secs: 0,
                    is_stale: false,
                    source: SourceKind::Twap,
                    round_id: None,
                    warnings: Vec::new(),
                })
            }
            Err(OracleGuardError::ChainRead {
                source: ChainReadError::InsufficientHistory { .. },
                ..
            }) => self.fetch_spot(chain_id, pool, period_secs).await,
            Err(e) => Err(e),
        }
    }

    async fn fetch_spot(
        &self,
        chain_id: ChainId,
        pool: &str,
        period_secs: u32,
    ) -> Result<PriceObservation> {
        warn!(chain_id, pool, period_secs, "pool lacks TWAP history, falling back to spot tick");
        let tick = bounded_read(
            self.read_timeout_ms,
            ReadTarget {
                operation: "slot0",
                target: pool,
                chain_id,
            },
            self.chain.current_tick(chain_id, pool),
        )
        .await?;
        let price = tick_to_price(i64::from(tick))
            .ok_or_else(|| invalid_tick(pool, chain_id, format!("spot tick {} has no representable price", tick)))?;

        Ok(PriceObservation {
            price,
            age_secs: 0,
            is_stale: false,
            source: SourceKind::Spot,
            round_id: None,
            warnings: vec![format!(
                "TWAP unavailable for pool {} (insufficient history for {}s window); using spot price",
                pool, period_secs
            )],
        })
    }
}

fn invalid_tick(pool: &str, chain_id: ChainId, detail: String) -> OracleGuardError {
    OracleGuardError::InvalidPrice {
        pair: format!("pool {}", pool),
        chain_id,
        detail,
    }
}
