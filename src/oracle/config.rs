//! Oracle guard configuration.
//!
//! `OracleGuardConfig` is built once at startup and treated as immutable. The
//! `with_*` methods consume the value and return a new one, so the built-in
//! feed and heartbeat tables are never mutated behind a caller's back.
//!
//! Sources, in increasing precedence:
//! 1. Built-in defaults ([`OracleGuardConfig::default`])
//! 2. TOML file ([`OracleGuardConfig::from_toml_file`])
//! 3. `ORACLE_GUARD_*` environment variables ([`OracleGuardConfig::apply_env`])

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use super::error::{OracleGuardError, Result};
use super::registry::SEQUENCER_UPTIME_KEY;
use crate::chain::ChainId;

pub const DEFAULT_WARN_THRESHOLD: Decimal = Decimal::from_parts(2, 0, 0, false, 2); // 0.02
pub const DEFAULT_REJECT_THRESHOLD: Decimal = Decimal::from_parts(5, 0, 0, false, 2); // 0.05
pub const DEFAULT_HEARTBEAT_SECS: u64 = 3600;
pub const STABLECOIN_HEARTBEAT_SECS: u64 = 86_400;
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 3600;
pub const DEFAULT_TWAP_PERIOD_SECS: u32 = 1800;

/// Well-known chain ids.
pub mod chains {
    use crate::chain::ChainId;

    pub const ETHEREUM: ChainId = 1;
    pub const OPTIMISM: ChainId = 10;
    pub const POLYGON: ChainId = 137;
    pub const BASE: ChainId = 8453;
    pub const ARBITRUM: ChainId = 42161;
}

/// Chainlink aggregator proxies seeded into every registry.
pub mod seed_feeds {
    use super::chains::*;
    use crate::chain::ChainId;

    /// (chain, pair, proxy address)
    pub const PRICE_FEEDS: &[(ChainId, &str, &str)] = &[
        (ETHEREUM, "ETH/USD", "0x5f4eC3Df9cbd43714FE2740f5E3616155c5b8419"),
        (ETHEREUM, "BTC/USD", "0xF4030086522a5bEEa4988F8cA5B36dbC97BeE88c"),
        (ETHEREUM, "LINK/USD", "0x2c1d072e956AFFC0D435Cb7AC38EF18d24d9127c"),
        (ETHEREUM, "USDC/USD", "0x8fFfFfd4AfB6115b954Bd326cbe7B4BA576818f6"),
        (ETHEREUM, "USDT/USD", "0x3E7d1eAB13ad0104d2750B8863b489D65364e32D"),
        (ETHEREUM, "DAI/USD", "0xAed0c38402a5d19df6E4c03F4E2DceD6e29c1ee9"),
        (ARBITRUM, "ETH/USD", "0x639Fe6ab55C921f74e7fac1ee960C0B6293ba612"),
        (ARBITRUM, "BTC/USD", "0x6ce185860a4963106506C203335A2910413708e9"),
        (ARBITRUM, "ARB/USD", "0xb2A824043730FE05F3DA2efaFa1CBbe83fa548D6"),
        (ARBITRUM, "USDC/USD", "0x50834F3163758fcC1Df9973b6e91f0F0F0434aD3"),
        (OPTIMISM, "ETH/USD", "0x13e3Ee699D1909E989722E753853AE30b17e08c5"),
        (OPTIMISM, "BTC/USD", "0xD702DD976Fb76Fffc2D3963D037dfDae5b04E593"),
        (OPTIMISM, "OP/USD", "0x0D276FC14719f9292D5C1eA2198673d1f4269246"),
        (OPTIMISM, "USDC/USD", "0x16a9FA2FDa030272Ce99B29CF780dFA30361E0f3"),
        (BASE, "ETH/USD", "0x71041dddad3595F9CEd3DcCFBe3D1F4b0a16Bb70"),
        (BASE, "BTC/USD", "0x64c911996D3c6aC71f9b455B1E8E7266BcbD848F"),
        (BASE, "USDC/USD", "0x7e860098F58bBFC8648a4311b374B1D669a2bc6B"),
        (POLYGON, "ETH/USD", "0xF9680D99D6C9589e2a93a78A04A279e509205945"),
        (POLYGON, "BTC/USD", "0xc907E116054Ad103354f2D350FD2514433D57F6f"),
        (POLYGON, "USDC/USD", "0xfE4A8cc5b5B2366C1B58Bea3858e81843581b2F7"),
    ];

    /// L2 sequencer uptime feeds.
    pub const SEQUENCER_FEEDS: &[(ChainId, &str)] = &[
        (ARBITRUM, "0xFdB631F5EE196F0ed6FAa767959853A9F217697D"),
        (OPTIMISM, "0x371EAD81c9102C9BF4874A9075FFFf170F2Ee389"),
        (BASE, "0xBCF85224fc0756B9Fa45aA7892530B47e10b6433"),
    ];

    /// Pairs whose feeds only update on a 24h heartbeat.
    pub const STABLECOIN_PAIRS: &[&str] = &["USDC/USD", "USDT/USD", "DAI/USD"];
}

/// One price feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub chain_id: ChainId,
    pub pair: String,
    pub address: String,
}

/// One sequencer uptime feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerFeedEntry {
    pub chain_id: ChainId,
    pub address: String,
}

/// A configuration problem found by [`OracleGuardConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigViolation {
    pub field: String,
    pub description: String,
    pub suggestion: String,
}

impl ConfigViolation {
    fn new(field: impl Into<String>, description: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            description: description.into(),
            suggestion: suggestion.into(),
        }
    }
}

impl std::fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.field, self.description, self.suggestion)
    }
}

/// Complete oracle guard configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleGuardConfig {
    /// Deviation above which a warning is attached.
    pub deviation_warn_threshold: Decimal,
    /// Deviation above which the price is rejected.
    pub deviation_reject_threshold: Decimal,
    /// Heartbeat for pairs without an override.
    pub default_heartbeat_secs: u64,
    /// Per-pair heartbeat overrides.
    pub heartbeats: BTreeMap<String, u64>,
    /// Window after sequencer recovery during which prices are flagged.
    pub sequencer_grace_period_secs: u64,
    /// TWAP window.
    pub twap_period_secs: u32,
    /// Deadline applied to every chain read. Unset means reads are unbounded.
    pub read_timeout_ms: Option<u64>,
    pub feeds: Vec<FeedEntry>,
    pub sequencer_feeds: Vec<SequencerFeedEntry>,
}

impl Default for OracleGuardConfig {
    fn default() -> Self {
        let heartbeats = seed_feeds::STABLECOIN_PAIRS
            .iter()
            .map(|p| (p.to_string(), STABLECOIN_HEARTBEAT_SECS))
            .collect();
        let feeds = seed_feeds::PRICE_FEEDS
            .iter()
            .map(|(chain_id, pair, address)| FeedEntry {
                chain_id: *chain_id,
                pair: pair.to_string(),
                address: address.to_string(),
            })
            .collect();
        let sequencer_feeds = seed_feeds::SEQUENCER_FEEDS
            .iter()
            .map(|(chain_id, address)| SequencerFeedEntry {
                chain_id: *chain_id,
                address: address.to_string(),
            })
            .collect();

        Self {
            deviation_warn_threshold: DEFAULT_WARN_THRESHOLD,
            deviation_reject_threshold: DEFAULT_REJECT_THRESHOLD,
            default_heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            heartbeats,
            sequencer_grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            twap_period_secs: DEFAULT_TWAP_PERIOD_SECS,
            read_timeout_ms: None,
            feeds,
            sequencer_feeds,
        }
    }
}

impl OracleGuardConfig {
    /// Configuration with no seeded feeds (tests, custom deployments).
    pub fn empty() -> Self {
        Self {
            feeds: Vec::new(),
            sequencer_feeds: Vec::new(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| OracleGuardError::InvalidConfig(e.to_string()))
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OracleGuardError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load defaults and apply environment overrides.
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Override scalar settings from `ORACLE_GUARD_*` variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env(mut self) -> Self {
        if let Some(v) = env_parse::<Decimal>("ORACLE_GUARD_WARN_THRESHOLD") {
            self.deviation_warn_threshold = v;
        }
        if let Some(v) = env_parse::<Decimal>("ORACLE_GUARD_REJECT_THRESHOLD") {
            self.deviation_reject_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("ORACLE_GUARD_DEFAULT_HEARTBEAT_SECS") {
            self.default_heartbeat_secs = v;
        }
        if let Some(v) = env_parse::<u64>("ORACLE_GUARD_GRACE_PERIOD_SECS") {
            self.sequencer_grace_period_secs = v;
        }
        if let Some(v) = env_parse::<u32>("ORACLE_GUARD_TWAP_PERIOD_SECS") {
            self.twap_period_secs = v;
        }
        if let Some(v) = env_parse::<u64>("ORACLE_GUARD_READ_TIMEOUT_MS") {
            self.read_timeout_ms = Some(v);
        }
        self
    }

    pub fn with_deviation_thresholds(mut self, warn: Decimal, reject: Decimal) -> Self {
        self.deviation_warn_threshold = warn;
        self.deviation_reject_threshold = reject;
        self
    }

    pub fn with_default_heartbeat(mut self, secs: u64) -> Self {
        self.default_heartbeat_secs = secs;
        self
    }

    pub fn with_heartbeat(mut self, pair: &str, secs: u64) -> Self {
        self.heartbeats.insert(pair.to_uppercase(), secs);
        self
    }

    pub fn with_grace_period(mut self, secs: u64) -> Self {
        self.sequencer_grace_period_secs = secs;
        self
    }

    pub fn with_twap_period(mut self, secs: u32) -> Self {
        self.twap_period_secs = secs;
        self
    }

    pub fn with_read_timeout_ms(mut self, ms: u64) -> Self {
        self.read_timeout_ms = Some(ms);
        self
    }

    pub fn with_feed(mut self, chain_id: ChainId, pair: &str, address: &str) -> Self {
        self.feeds.push(FeedEntry {
            chain_id,
            pair: pair.to_string(),
            address: address.to_string(),
        });
        self
    }

    pub fn with_sequencer_feed(mut self, chain_id: ChainId, address: &str) -> Self {
        self.sequencer_feeds.push(SequencerFeedEntry {
            chain_id,
            address: address.to_string(),
        });
        self
    }

    /// Check every invariant the guard relies on. Empty means valid.
    pub fn validate(&self) -> Vec<ConfigViolation> {
        let mut violations = Vec::new();

        let warn = self.deviation_warn_threshold;
        let reject = self.deviation_reject_threshold;
        if warn <= Decimal::ZERO || reject >= Decimal::ONE || warn > reject {
            violations.push(ConfigViolation::new(
                "deviation_thresholds",
                format!("warn {} / reject {} out of order", warn, reject),
                "Require 0 < warn <= reject < 1 (e.g. 0.02 / 0.05)",
            ));
        }

        if self.default_heartbeat_secs == 0 {
            violations.push(ConfigViolation::new(
                "default_heartbeat_secs",
                "Default heartbeat is 0",
                "Set a positive heartbeat in seconds (e.g. 3600)",
            ));
        }
        for (pair, secs) in &self.heartbeats {
            if *secs == 0 {
                violations.push(ConfigViolation::new(
                    format!("heartbeats.{}", pair),
                    "Heartbeat is 0",
                    "Heartbeats must be positive durations",
                ));
            }
        }

        if self.sequencer_grace_period_secs == 0 {
            violations.push(ConfigViolation::new(
                "sequencer_grace_period_secs",
                "Grace period is 0",
                "Set a positive grace period (e.g. 3600)",
            ));
        }
        if self.twap_period_secs == 0 {
            violations.push(ConfigViolation::new(
                "twap_period_secs",
                "TWAP period is 0",
                "Set a positive TWAP window (e.g. 1800)",
            ));
        }
        if self.read_timeout_ms == Some(0) {
            violations.push(ConfigViolation::new(
                "read_timeout_ms",
                "Read timeout is 0",
                "Unset it or give a positive deadline",
            ));
        }

        for feed in &self.feeds {
            if feed.pair.trim().is_empty() {
                violations.push(ConfigViolation::new(
                    "feeds.pair",
                    format!("Empty pair symbol on chain {}", feed.chain_id),
                    "Set pair to a symbol like 'ETH/USD'",
                ));
            }
            if feed.pair.trim().eq_ignore_ascii_case(SEQUENCER_UPTIME_KEY) {
                violations.push(ConfigViolation::new(
                    format!("feeds.{}.{}", feed.chain_id, feed.pair),
                    "Pair symbol is reserved for the sequencer uptime feed",
                    "List uptime feeds under sequencer_feeds",
                ));
            }
            if !is_address(&feed.address) {
                violations.push(ConfigViolation::new(
                    format!("feeds.{}.{}", feed.chain_id, feed.pair),
                    format!("'{}' does not look like an address", feed.address),
                    "Address should be 42 characters starting with 0x",
                ));
            }
        }
        for feed in &self.sequencer_feeds {
            if !is_address(&feed.address) {
                violations.push(ConfigViolation::new(
                    format!("sequencer_feeds.{}", feed.chain_id),
                    format!("'{}' does not look like an address", feed.address),
                    "Address should be 42 characters starting with 0x",
                ));
            }
        }

        violations
    }

    /// [`validate`](Self::validate) folded into a single error.
    pub fn ensure_valid(&self) -> Result<()> {
        let violations = self.validate();
        if violations.is_empty() {
            return Ok(());
        }
        let report: Vec<String> = violations.iter().map(ToString::to_string).collect();
        Err(OracleGuardError::InvalidConfig(report.join("; ")))
    }
}

/// `0x` followed by 40 hex digits.
pub fn is_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable oracle guard setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = OracleGuardConfig::default();
        assert_eq!(config.deviation_warn_threshold, dec!(0.02));
        assert_eq!(config.deviation_reject_threshold, dec!(0.05));
        assert_eq!(config.default_heartbeat_secs, 3600);
        assert_eq!(config.sequencer_grace_period_secs, 3600);
        assert_eq!(config.twap_period_secs, 1800);
        assert_eq!(config.read_timeout_ms, None);
        assert_eq!(config.heartbeats.get("USDC/USD"), Some(&86_400));
        assert!(config.validate().is_empty(), "{:?}", config.validate());
    }

    #[test]
    fn test_seed_addresses_are_well_formed() {
        for (_, pair, address) in seed_feeds::PRICE_FEEDS {
            assert!(is_address(address), "{} {}", pair, address);
        }
        for (chain, address) in seed_feeds::SEQUENCER_FEEDS {
            assert!(is_address(address), "{} {}", chain, address);
        }
    }

    #[test]
    fn test_with_methods_leave_original_untouched() {
        let base = OracleGuardConfig::default();
        let tuned = base.clone().with_heartbeat("eth/usd", 120).with_grace_period(600);
        assert_eq!(tuned.heartbeats.get("ETH/USD"), Some(&120));
        assert_eq!(tuned.sequencer_grace_period_secs, 600);
        assert!(!base.heartbeats.contains_key("ETH/USD"));
        assert_eq!(base.sequencer_grace_period_secs, 3600);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let config = OracleGuardConfig::default().with_deviation_thresholds(dec!(0.06), dec!(0.05));
        let violations = config.validate();
        assert!(violations.iter().any(|v| v.field == "deviation_thresholds"));
        assert!(config.ensure_valid().is_err());
    }

    #[test]
    fn test_zero_heartbeat_rejected() {
        let config = OracleGuardConfig::default().with_heartbeat("ETH/USD", 0);
        assert!(config.validate().iter().any(|v| v.field == "heartbeats.ETH/USD"));
    }

    #[test]
    fn test_bad_address_rejected() {
        let config = OracleGuardConfig::empty().with_feed(1, "ETH/USD", "not_an_address");
        let violations = config.validate();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].description.contains("does not look like"));
    }

    #[test]
    fn test_toml_partial_override_keeps_defaults() {
        let config = OracleGuardConfig::from_toml_str(
            r#"
            deviation_warn_threshold = "0.01"
            twap_period_secs = 600
            read_timeout_ms = 2500
            "#,
        )
        .unwrap();
        assert_eq!(config.deviation_warn_threshold, dec!(0.01));
        assert_eq!(config.deviation_reject_threshold, dec!(0.05));
        assert_eq!(config.twap_period_secs, 600);
        assert_eq!(config.read_timeout_ms, Some(2500));
        assert!(!config.feeds.is_empty());
    }

    #[test]
    fn test_toml_file_with_feeds() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[feeds]]
            chain_id = 1
            pair = "ETH/USD"
            address = "0x5f4eC3Df9cbd43714FE2740f5E3616155c5b8419"

            [[sequencer_feeds]]
            chain_id = 42161
            address = "0xFdB631F5EE196F0ed6FAa767959853A9F217697D"
            "#
        )
        .unwrap();
        let config = OracleGuardConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.feeds.len(), 1);
        assert_eq!(config.sequencer_feeds.len(), 1);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_missing_file_is_invalid_config() {
        let err = OracleGuardConfig::from_toml_file("/nonexistent/oracle_guard.toml").unwrap_err();
        assert!(matches!(err, OracleGuardError::InvalidConfig(_)));
    }
}
