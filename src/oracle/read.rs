//! Deadline-bounded collaborator reads.

use std::future::Future;
use std::time::Duration;

use super::error::{OracleGuardError, Result};
use crate::chain::{ChainId, ChainReadError};

/// Identifies a single collaborator call for error reporting.
#[derive(Debug, Clone, Copy)]
pub struct ReadTarget<'a> {
    pub operation: &'static str,
    pub target: &'a str,
    pub chain_id: ChainId,
}

/// Await `fut`, bounded by `timeout_ms` when set, mapping failures to
/// [`OracleGuardError::ChainRead`] / [`OracleGuardError::Timeout`].
///
/// On timeout the inner future is dropped, which cancels the read.
pub async fn bounded_read<T, F>(
    timeout_ms: Option<u64>,
    target: ReadTarget<'_>,
    fut: F,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, ChainReadError>>,
{
    let outcome = match timeout_ms {
        Some(ms) => tokio::time::timeout(Duration::from_millis(ms), fut)
            .await
            .map_err(|_| OracleGuardError::Timeout {
                operation: target.operation,
                target: target.target.to_string(),
                chain_id: target.chain_id,
                after_ms: ms,
            })?,
        None => fut.await,
    };
    outcome.map_err(|source| OracleGuardError::ChainRead {
        operation: target.operation,
        target: target.target.to_string(),
        chain_id: target.chain_id,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: ReadTarget<'static> = ReadTarget {
        operation: "decimals",
        target: "0xfeed",
        chain_id: 1,
    };

    #[tokio::test]
    async fn test_passes_value_through() {
        let v = bounded_read(Some(1000), TARGET, async { Ok::<_, ChainReadError>(8u8) })
            .await
            .unwrap();
        assert_eq!(v, 8);
    }

    #[tokio::test]
    async fn test_wraps_chain_error() {
        let err = bounded_read(None, TARGET, async {
            Err::<u8, _>(ChainReadError::Rpc("boom".to_string()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, OracleGuardError::ChainRead { operation: "decimals", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let err = bounded_read(Some(50), TARGET, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<u8, ChainReadError>(8)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, OracleGuardError::Timeout { after_ms: 50, .. }));
    }
}
