//! Public facade wiring registries, readers and the reconciler together.

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use super::chainlink::ChainlinkPriceReader;
use super::config::OracleGuardConfig;
use super::error::Result;
use super::events::{EventBus, GuardEvent};
use super::quote::QuoteValidator;
use super::reconciler::{DeviationPolicy, PriceReconciler};
use super::registry::{FeedRegistry, HeartbeatRegistry};
use super::sequencer::SequencerHealthChecker;
use super::twap::TwapPriceReader;
use super::types::{PriceObservation, QuoteVerdict, SequencerStatus, ValidatedPrice};
use crate::chain::{ChainId, ChainReader, Clock};

/// Dual-source price validation for one set of chains.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct OracleGuard {
    config: OracleGuardConfig,
    feeds: Arc<FeedRegistry>,
    heartbeats: Arc<HeartbeatRegistry>,
    reconciler: Arc<PriceReconciler>,
    quotes: QuoteValidator,
    events: EventBus,
}

impl OracleGuard {
    /// Build a guard. Fails with `InvalidConfig` if `config` does not validate.
    pub fn new(
        config: OracleGuardConfig,
        chain: Arc<dyn ChainReader>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.ensure_valid()?;

        let feeds = Arc::new(FeedRegistry::from_config(&config));
        let heartbeats = Arc::new(HeartbeatRegistry::from_config(&config)?);
        let events = EventBus::new();

        let chainlink = ChainlinkPriceReader::new(
            chain.clone(),
            feeds.clone(),
            heartbeats.clone(),
            clock.clone(),
            config.read_timeout_ms,
        );
        let twap = TwapPriceReader::new(chain.clone(), config.read_timeout_ms);
        let sequencer = SequencerHealthChecker::new(
            chain,
            feeds.clone(),
            clock,
            config.sequencer_grace_period_secs,
            config.read_timeout_ms,
        );
        let policy = DeviationPolicy {
            warn_threshold: config.deviation_warn_threshold,
            reject_threshold: config.deviation_reject_threshold,
        };
        let reconciler = Arc::new(PriceReconciler::new(
            chainlink,
            twap,
            sequencer,
            policy,
            config.twap_period_secs,
            events.clone(),
        ));
        let quotes = QuoteValidator::new(reconciler.clone(), events.clone());

        info!(
            chains = feeds.chains().len(),
            warn_threshold = %config.deviation_warn_threshold,
            reject_threshold = %config.deviation_reject_threshold,
            twap_period_secs = config.twap_period_secs,
            read_timeout_ms = ?config.read_timeout_ms,
            "oracle guard initialized"
        );

        Ok(Self {
            config,
            feeds,
            heartbeats,
            reconciler,
            quotes,
            events,
        })
    }

    pub fn config(&self) -> &OracleGuardConfig {
        &self.config
    }

    /// Sequencer-gated, cross-checked price for `pair`.
    ///
    /// Without `twap_pool` the result is oracle-only and at most MEDIUM.
    pub async fn get_validated_price(
        &self,
        pair: &str,
        chain_id: ChainId,
        twap_pool: Option<&str>,
    ) -> Result<ValidatedPrice> {
        self.reconciler
            .get_validated_price(pair, chain_id, twap_pool)
            .await
    }

    pub async fn validate_quote(
        &self,
        quoted_price: Decimal,
        pair: &str,
        chain_id: ChainId,
        twap_pool: Option<&str>,
        require_oracle: bool,
    ) -> QuoteVerdict {
        self.quotes
            .validate_quote(quoted_price, pair, chain_id, twap_pool, require_oracle)
            .await
    }

    pub async fn check_sequencer(&self, chain_id: ChainId) -> Result<SequencerStatus> {
        self.reconciler.sequencer().check_sequencer(chain_id).await
    }

    /// Raw oracle reading, without sequencer gate or cross-check.
    pub async fn fetch_price(&self, pair: &str, chain_id: ChainId) -> Result<PriceObservation> {
        self.reconciler.chainlink().fetch_price(pair, chain_id).await
    }

    /// Raw TWAP reading over the configured window.
    pub async fn fetch_twap(&self, chain_id: ChainId, pool: &str) -> Result<PriceObservation> {
        self.reconciler
            .twap()
            .fetch_twap(chain_id, pool, self.reconciler.twap_period_secs())
            .await
    }

    /// Add or overwrite a price feed. The reserved sequencer key is ignored.
    pub fn register_feed(&self, chain_id: ChainId, pair: &str, address: &str) {
        self.feeds.register_feed(chain_id, pair, address);
    }

    pub fn register_sequencer_feed(&self, chain_id: ChainId, address: &str) {
        self.feeds.register_sequencer_feed(chain_id, address);
    }

    /// Override the staleness heartbeat for `pair`. Rejects 0.
    pub fn set_heartbeat(&self, pair: &str, secs: u64) -> Result<()> {
        self.heartbeats.set_heartbeat(pair, secs)
    }

    pub fn heartbeat(&self, pair: &str) -> u64 {
        self.heartbeats.heartbeat(pair)
    }

    pub fn list_pairs(&self, chain_id: ChainId) -> Vec<String> {
        self.feeds.list_pairs(chain_id)
    }

    pub fn has_sequencer_feed(&self, chain_id: ChainId) -> bool {
        self.feeds.has_sequencer_feed(chain_id)
    }

    pub fn chains(&self) -> Vec<ChainId> {
        self.feeds.chains()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GuardEvent> {
        self.events.subscribe()
    }
}
