//! Oracle Guard Library
//!
//! Sequencer-gated, dual-source (oracle + TWAP) price validation for EVM chains.
//! `chain` holds the read-only collaborator seam and its JSON-RPC implementation;
//! `oracle` holds the validation pipeline behind [`OracleGuard`].

pub mod chain;
pub mod oracle;

pub use chain::{ChainId, ChainReadError, ChainReader, Clock, RoundData, SystemClock};
pub use oracle::{
    ConfidenceTier, GuardEvent, OracleGuard, OracleGuardConfig, OracleGuardError,
    PriceObservation, QuoteVerdict, SequencerStatus, SourceKind, ValidatedPrice,
};
