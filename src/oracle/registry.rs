//! Feed and heartbeat registries.
//!
//! Both are read on every price request and written only through explicit
//! register/set calls, so a `parking_lot::RwLock` around a plain map is enough.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use super::config::OracleGuardConfig;
use super::error::{OracleGuardError, Result};
use crate::chain::ChainId;

/// Reserved pair key holding a chain's sequencer uptime feed.
pub const SEQUENCER_UPTIME_KEY: &str = "L2_SEQUENCER_UPTIME";

fn normalize(pair: &str) -> String {
    pair.trim().to_uppercase()
}

/// chain id -> pair symbol -> feed address.
#[derive(Debug, Default)]
pub struct FeedRegistry {
    feeds: RwLock<HashMap<ChainId, BTreeMap<String, String>>>,
}

impl FeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded from the configured feed tables.
    pub fn from_config(config: &OracleGuardConfig) -> Self {
        let registry = Self::new();
        for feed in &config.feeds {
            registry.register_feed(feed.chain_id, &feed.pair, &feed.address);
        }
        for feed in &config.sequencer_feeds {
            registry.register_sequencer_feed(feed.chain_id, &feed.address);
        }
        registry
    }

    pub fn resolve_feed(&self, chain_id: ChainId, pair: &str) -> Option<String> {
        let key = normalize(pair);
        if key == SEQUENCER_UPTIME_KEY {
            return None;
        }
        self.feeds.read().get(&chain_id)?.get(&key).cloned()
    }

    /// Add or overwrite a price feed. The sequencer key is ignored, like in
    /// [`resolve_feed`](Self::resolve_feed); uptime feeds go through
    /// [`register_sequencer_feed`](Self::register_sequencer_feed).
    pub fn register_feed(&self, chain_id: ChainId, pair: &str, address: &str) {
        let key = normalize(pair);
        if key == SEQUENCER_UPTIME_KEY {
            warn!(chain_id, address, "ignored price feed under the reserved sequencer key");
            return;
        }
        let previous = self
            .feeds
            .write()
            .entry(chain_id)
            .or_default()
            .insert(key.clone(), address.to_string());
        if previous.as_deref() != Some(address) {
            info!(chain_id, pair = %key, address, "price feed registered");
        }
    }

    /// Add or overwrite a chain's sequencer uptime feed.
    pub fn register_sequencer_feed(&self, chain_id: ChainId, address: &str) {
        self.feeds
            .write()
            .entry(chain_id)
            .or_default()
            .insert(SEQUENCER_UPTIME_KEY.to_string(), address.to_string());
        info!(chain_id, address, "sequencer uptime feed registered");
    }

    /// Sorted price pairs on a chain; the sequencer entry is never listed.
    pub fn list_pairs(&self, chain_id: ChainId) -> Vec<String> {
        self.feeds
            .read()
            .get(&chain_id)
            .map(|pairs| {
                pairs
                    .keys()
                    .filter(|k| k.as_str() != SEQUENCER_UPTIME_KEY)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn sequencer_feed(&self, chain_id: ChainId) -> Option<String> {
        self.feeds
            .read()
            .get(&chain_id)?
            .get(SEQUENCER_UPTIME_KEY)
            .cloned()
    }

    pub fn has_sequencer_feed(&self, chain_id: ChainId) -> bool {
        self.sequencer_feed(chain_id).is_some()
    }

    /// Chains with at least one entry.
    pub fn chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<ChainId> = self.feeds.read().keys().copied().collect();
        chains.sort_unstable();
        chains
    }
}

/// pair symbol -> max acceptable oracle age.
#[derive(Debug)]
pub struct HeartbeatRegistry {
    default_secs: u64,
    overrides: RwLock<HashMap<String, u64>>,
}

impl HeartbeatRegistry {
    pub fn new(default_secs: u64) -> Result<Self> {
        if default_secs == 0 {
            return Err(OracleGuardError::InvalidConfig(
                "default heartbeat must be positive".to_string(),
            ));
        }
        Ok(Self {
            default_secs,
            overrides: RwLock::new(HashMap::new()),
        })
    }

    pub fn from_config(config: &OracleGuardConfig) -> Result<Self> {
        let registry = Self::new(config.default_heartbeat_secs)?;
        for (pair, secs) in &config.heartbeats {
            registry.set_heartbeat(pair, *secs)?;
        }
        Ok(registry)
    }

    /// Override the heartbeat for a pair. Zero is rejected.
    pub fn set_heartbeat(&self, pair: &str, secs: u64) -> Result<()> {
        if secs == 0 {
            return Err(OracleGuardError::InvalidConfig(format!(
                "heartbeat for {} must be positive",
                pair
            )));
        }
        self.overrides.write().insert(normalize(pair), secs);
        Ok(())
    }

    /// Override if present, else the default.
    pub fn heartbeat(&self, pair: &str) -> u64 {
        self.overrides
            .read()
            .get(&normalize(pair))
            .copied()
            .unwrap_or(self.default_secs)
    }

    pub fn default_secs(&self) -> u64 {
        self.default_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = FeedRegistry::new();
        registry.register_feed(1, "eth/usd", "0xabc");
        assert_eq!(registry.resolve_feed(1, "ETH/USD").as_deref(), Some("0xabc"));
        assert_eq!(registry.resolve_feed(10, "ETH/USD"), None);
    }

    #[test]
    fn test_register_overwrites() {
        let registry = FeedRegistry::new();
        registry.register_feed(1, "ETH/USD", "0xold");
        registry.register_feed(1, "ETH/USD", "0xnew");
        assert_eq!(registry.resolve_feed(1, "ETH/USD").as_deref(), Some("0xnew"));
        assert_eq!(registry.list_pairs(1), vec!["ETH/USD".to_string()]);
    }

    #[test]
    fn test_list_pairs_excludes_sequencer() {
        let registry = FeedRegistry::new();
        registry.register_feed(42161, "ETH/USD", "0x1");
        registry.register_feed(42161, "ARB/USD", "0x2");
        registry.register_sequencer_feed(42161, "0x3");
        assert_eq!(registry.list_pairs(42161), vec!["ARB/USD", "ETH/USD"]);
        assert!(registry.has_sequencer_feed(42161));
        assert_eq!(registry.resolve_feed(42161, SEQUENCER_UPTIME_KEY), None);
    }

    #[test]
    fn test_sequencer_key_refused_as_price_pair() {
        let registry = FeedRegistry::new();
        registry.register_feed(1, "ETH/USD", "0x1");
        registry.register_feed(1, " l2_sequencer_uptime ", "0x2");
        assert!(!registry.has_sequencer_feed(1));
        assert_eq!(registry.list_pairs(1), vec!["ETH/USD"]);

        registry.register_sequencer_feed(42161, "0x3");
        registry.register_feed(42161, SEQUENCER_UPTIME_KEY, "0x4");
        assert_eq!(registry.sequencer_feed(42161).as_deref(), Some("0x3"));
    }

    #[test]
    fn test_l1_has_no_sequencer() {
        let registry = FeedRegistry::from_config(&OracleGuardConfig::default());
        assert!(!registry.has_sequencer_feed(1));
        assert!(registry.has_sequencer_feed(42161));
        assert!(registry.has_sequencer_feed(10));
        assert!(registry.list_pairs(1).contains(&"ETH/USD".to_string()));
        assert!(registry.list_pairs(999).is_empty());
    }

    #[test]
    fn test_heartbeat_override_and_default() {
        let registry = HeartbeatRegistry::from_config(&OracleGuardConfig::default()).unwrap();
        assert_eq!(registry.heartbeat("ETH/USD"), 3600);
        assert_eq!(registry.heartbeat("usdc/usd"), 86_400);
        registry.set_heartbeat("ETH/USD", 27).unwrap();
        assert_eq!(registry.heartbeat("ETH/USD"), 27);
    }

    #[test]
    fn test_zero_heartbeat_rejected() {
        assert!(HeartbeatRegistry::new(0).is_err());
        let registry = HeartbeatRegistry::new(60).unwrap();
        assert!(registry.set_heartbeat("ETH/USD", 0).is_err());
        assert_eq!(registry.heartbeat("ETH/USD"), 60);
    }
}
