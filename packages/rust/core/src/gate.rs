//! Duplicate gate: skip candidates that are already stored.

use tracing::{debug, warn};

use toolharvest_shared::DuplicatePolicy;

use crate::store::RecordStore;

/// What the gate decided for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Not stored yet; enrich it.
    Proceed,
    /// Already stored.
    Duplicate,
    /// The store could not answer and the policy is fail-closed.
    Blocked,
}

/// Check `data_id` against the store. Store errors resolve through `policy`.
pub async fn check_duplicate(
    store: &dyn RecordStore,
    data_id: &str,
    policy: DuplicatePolicy,
) -> GateDecision {
    match store.exists(data_id).await {
        Ok(true) => {
            debug!(data_id, "already stored");
            GateDecision::Duplicate
        }
        Ok(false) => GateDecision::Proceed,
        Err(e) => match policy {
            DuplicatePolicy::FailOpen => {
                warn!(data_id, error = %e, "duplicate check failed, treating as new");
                GateDecision::Proceed
            }
            DuplicatePolicy::FailClosed => {
                warn!(data_id, error = %e, "duplicate check failed, skipping");
                GateDecision::Blocked
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use toolharvest_shared::{EnrichedRecord, Result, ToolHarvestError};

    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn exists(&self, _data_id: &str) -> Result<bool> {
            Err(ToolHarvestError::Storage("connection lost".into()))
        }

        async fn upsert(&self, _record: &EnrichedRecord) -> Result<()> {
            Err(ToolHarvestError::Storage("connection lost".into()))
        }
    }

    struct FixedStore(bool);

    #[async_trait]
    impl RecordStore for FixedStore {
        async fn exists(&self, _data_id: &str) -> Result<bool> {
            Ok(self.0)
        }

        async fn upsert(&self, _record: &EnrichedRecord) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn existing_key_is_duplicate() {
        let decision = check_duplicate(&FixedStore(true), "42", DuplicatePolicy::FailOpen).await;
        assert_eq!(decision, GateDecision::Duplicate);
        let decision = check_duplicate(&FixedStore(false), "42", DuplicatePolicy::FailOpen).await;
        assert_eq!(decision, GateDecision::Proceed);
    }

    #[tokio::test]
    async fn store_errors_follow_policy() {
        assert_eq!(
            check_duplicate(&BrokenStore, "42", DuplicatePolicy::FailOpen).await,
            GateDecision::Proceed
        );
        assert_eq!(
            check_duplicate(&BrokenStore, "42", DuplicatePolicy::FailClosed).await,
            GateDecision::Blocked
        );
    }
}
