//! Oracle Guard: dual-source price validation
//!
//! Every price a trading decision depends on is cross-checked before use:
//!
//! - **Sequencer gate**: on L2s with an uptime feed, a down sequencer blocks all pricing
//! - **Oracle read**: round-based feed with completeness, positivity and staleness checks
//! - **TWAP read**: pool tick-cumulative average, degrading to spot on young pools
//! - **Reconciliation**: oracle/TWAP deviation policy (warn 2%, reject 5% by default)
//!   and a HIGH/MEDIUM/LOW confidence tier
//! - **Quote validation**: external quotes checked against the reconciled price
//!
//! The reconciler never downgrades hard gates (`SequencerDown`, `DeviationExceeded`)
//! to warnings. Single-source failures are. Quote validation without
//! `require_oracle` accepts through any failure and flags the quote as bypassed.
//!
//! ```ignore
//! let guard = OracleGuard::new(OracleGuardConfig::default(), reader, Arc::new(SystemClock))?;
//! let price = guard.get_validated_price("ETH/USD", 42161, Some(pool)).await?;
//! ```

pub mod chainlink;
pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod quote;
pub mod read;
pub mod reconciler;
pub mod registry;
pub mod sequencer;
pub mod twap;
pub mod types;

pub use chainlink::ChainlinkPriceReader;
pub use config::{chains, ConfigViolation, FeedEntry, OracleGuardConfig, SequencerFeedEntry};
pub use error::{OracleGuardError, Result};
pub use events::{EventBus, GuardEvent};
pub use guard::OracleGuard;
pub use quote::QuoteValidator;
pub use reconciler::{DeviationBand, DeviationPolicy, PriceReconciler};
pub use registry::{FeedRegistry, HeartbeatRegistry, SEQUENCER_UPTIME_KEY};
pub use sequencer::SequencerHealthChecker;
pub use twap::TwapPriceReader;
pub use types::{
    ConfidenceTier, PriceObservation, PriceSources, QuoteVerdict, SequencerStatus, SourceKind,
    ValidatedPrice,
};
