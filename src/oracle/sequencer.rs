//! L2 sequencer liveness.
//!
//! Uptime feeds report `answer == 0` while the sequencer is up and `answer == 1`
//! while it is down; `startedAt` is when the current status began. After a
//! restart, prices may still be catching up, so a grace period is surfaced as a
//! warning for `sequencer_grace_period_secs` after recovery.

use std::sync::Arc;
use tracing::{debug, warn};

use super::error::Result;
use super::read::{bounded_read, ReadTarget};
use super::registry::FeedRegistry;
use super::types::SequencerStatus;
use crate::chain::{ChainId, ChainReader, Clock, RoundData};

const SEQUENCER_UP: i128 = 0;

pub struct SequencerHealthChecker {
    chain: Arc<dyn ChainReader>,
    feeds: Arc<FeedRegistry>,
    clock: Arc<dyn Clock>,
    grace_period_secs: u64,
    read_timeout_ms: Option<u64>,
}

impl SequencerHealthChecker {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        feeds: Arc<FeedRegistry>,
        clock: Arc<dyn Clock>,
        grace_period_secs: u64,
        read_timeout_ms: Option<u64>,
    ) -> Self {
        Self {
            chain,
            feeds,
            clock,
            grace_period_secs,
            read_timeout_ms,
        }
    }

    pub async fn check_sequencer(&self, chain_id: ChainId) -> Result<SequencerStatus> {
        let Some(feed) = self.feeds.sequencer_feed(chain_id) else {
            return Ok(SequencerStatus::l1());
        };

        let round = bounded_read(
            self.read_timeout_ms,
            ReadTarget {
                operation: "sequencer latestRoundData",
                target: &feed,
                chain_id,
            },
            self.chain.latest_round_data(chain_id, &feed),
        )
        .await?;

        let status = classify(&round, self.clock.now_secs(), self.grace_period_secs);
        if status.is_up {
            debug!(
                chain_id,
                secs_since_up = ?status.secs_since_up,
                grace_period_active = status.grace_period_active,
                "sequencer up"
            );
        } else {
            warn!(chain_id, since = round.started_at, answer = %round.answer, "sequencer down");
        }
        Ok(status)
    }
}

/// Classify an uptime-feed round. Any answer other than 0 counts as down.
pub fn classify(round: &RoundData, now_secs: u64, grace_period_secs: u64) -> SequencerStatus {
    if round.answer != SEQUENCER_UP {
        return SequencerStatus {
            is_up: false,
            is_l1: false,
            up_since: None,
            secs_since_up: None,
            down_since: Some(round.started_at),
            grace_period_active: false,
            grace_period_remaining_secs: 0,
            message: Some(format!(
                "Sequencer is down since {}; do not execute trades",
                round.started_at
            )),
        };
    }

    let secs_since_up = now_secs.saturating_sub(round.started_at);
    let grace_period_active = secs_since_up < grace_period_secs;
    let grace_period_remaining_secs = if grace_period_active {
        grace_period_secs - secs_since_up
    } else {
        0
    };

    SequencerStatus {
        is_up: true,
        is_l1: false,
        up_since: Some(round.started_at),
        secs_since_up: Some(secs_since_up),
        down_since: None,
        grace_period_active,
        grace_period_remaining_secs,
        message: grace_period_active.then(|| {
            format!(
                "Sequencer recovered {}s ago; grace period active for another {}s",
                secs_since_up, grace_period_remaining_secs
            )
        }),
    }
}
