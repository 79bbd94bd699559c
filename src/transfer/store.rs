//! Transfer persistence boundary
//!
//! Status updates are compare-and-swap: a write only lands if the stored
//! status still equals the status the caller read. Whoever loses the race
//! (worker vs. sweeper) sees `false` and backs off.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::error::TransferError;
use super::state::TransferStatus;
use super::types::InternalTransfer;
use crate::core_types::{InternalTransferId, ReferenceId};

#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Insert a new transfer; a known reference yields `DuplicateReference`
    async fn insert(&self, transfer: &InternalTransfer) -> Result<(), TransferError>;

    async fn get(&self, id: InternalTransferId) -> Result<Option<InternalTransfer>, TransferError>;

    async fn get_by_reference(
        &self,
        reference: &ReferenceId,
    ) -> Result<Option<InternalTransfer>, TransferError>;

    /// Overwrite the mutable fields of `transfer` if the stored status is `expected`
    ///
    /// Rejects edges the FSM does not allow before touching storage.
    async fn update_if(
        &self,
        transfer: &InternalTransfer,
        expected: TransferStatus,
    ) -> Result<bool, TransferError>;

    /// LOCKED / PROCESSING transfers whose estimated unlock is before `cutoff`
    async fn find_expired(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<InternalTransfer>, TransferError>;
}

pub(crate) fn check_transition(
    expected: TransferStatus,
    next: TransferStatus,
) -> Result<(), TransferError> {
    if expected.can_transition_to(next) {
        Ok(())
    } else {
        Err(TransferError::InvalidStateTransition {
            from: expected,
            to: next,
        })
    }
}

#[derive(Default)]
struct MemoryState {
    transfers: HashMap<InternalTransferId, InternalTransfer>,
    by_reference: HashMap<ReferenceId, InternalTransferId>,
}

/// In-memory transfer store
#[derive(Default)]
pub struct MemoryTransferStore {
    state: RwLock<MemoryState>,
}

impl MemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.transfers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TransferStore for MemoryTransferStore {
    async fn insert(&self, transfer: &InternalTransfer) -> Result<(), TransferError> {
        let mut state = self.state.write().await;
        if state.by_reference.contains_key(&transfer.reference) {
            return Err(TransferError::DuplicateReference(transfer.reference.clone()));
        }
        state
            .by_reference
            .insert(transfer.reference.clone(), transfer.transfer_id);
        state
            .transfers
            .insert(transfer.transfer_id, transfer.clone());
        Ok(())
    }

    async fn get(&self, id: InternalTransferId) -> Result<Option<InternalTransfer>, TransferError> {
        Ok(self.state.read().await.transfers.get(&id).cloned())
    }

    async fn get_by_reference(
        &self,
        reference: &ReferenceId,
    ) -> Result<Option<InternalTransfer>, TransferError> {
        let state = self.state.read().await;
        Ok(state
            .by_reference
            .get(reference)
            .and_then(|id| state.transfers.get(id))
            .cloned())
    }

    async fn update_if(
        &self,
        transfer: &InternalTransfer,
        expected: TransferStatus,
    ) -> Result<bool, TransferError> {
        check_transition(expected, transfer.status)?;
        let mut state = self.state.write().await;
        match state.transfers.get_mut(&transfer.transfer_id) {
            Some(stored) if stored.status == expected => {
                *stored = transfer.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(TransferError::TransferNotFound(
                transfer.transfer_id.to_string(),
            )),
        }
    }

    async fn find_expired(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<InternalTransfer>, TransferError> {
        let state = self.state.read().await;
        let mut expired: Vec<InternalTransfer> = state
            .transfers
            .values()
            .filter(|t| t.status.holds_lock())
            .filter(|t| t.estimated_unlock_at.is_some_and(|at| at < cutoff))
            .cloned()
            .collect();
        expired.sort_by_key(|t| t.estimated_unlock_at);
        expired.truncate(limit);
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Currency;
    use crate::transfer::types::{CreateTransferRequest, TransferKind};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn transfer(reference: &str) -> InternalTransfer {
        InternalTransfer::new(
            &CreateTransferRequest::new(reference, ("w-a", 1), ("w-b", 2), dec!(10)),
            Currency::new("EUR"),
            Currency::new("XOF"),
            TransferKind::Locked,
        )
    }

    #[tokio::test]
    async fn test_reference_is_unique() {
        let store = MemoryTransferStore::new();
        store.insert(&transfer("r-1")).await.unwrap();
        assert_eq!(
            store.insert(&transfer("r-1")).await,
            Err(TransferError::DuplicateReference(ReferenceId::new("r-1")))
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_is_compare_and_swap() {
        let store = MemoryTransferStore::new();
        let t = transfer("r-1");
        store.insert(&t).await.unwrap();

        let locked = t.with_status(TransferStatus::Locked);
        assert!(store.update_if(&locked, TransferStatus::Pending).await.unwrap());
        // stale writer still believes PENDING
        assert!(!store.update_if(&t.failed("late"), TransferStatus::Pending).await.unwrap());

        let stored = store.get_by_reference(&t.reference).await.unwrap().unwrap();
        assert_eq!(stored.status, TransferStatus::Locked);
    }

    #[tokio::test]
    async fn test_illegal_edge_rejected() {
        let store = MemoryTransferStore::new();
        let t = transfer("r-1");
        store.insert(&t).await.unwrap();

        let result = store
            .update_if(&t.with_status(TransferStatus::Pending), TransferStatus::Completed)
            .await;
        assert!(matches!(
            result,
            Err(TransferError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_find_expired_only_returns_lock_holders() {
        let store = MemoryTransferStore::new();
        let now = Utc::now();

        let mut old = transfer("old").with_status(TransferStatus::Locked);
        old.estimated_unlock_at = Some(now - Duration::minutes(10));
        let mut fresh = transfer("fresh").with_status(TransferStatus::Locked);
        fresh.estimated_unlock_at = Some(now + Duration::minutes(5));
        let mut done = transfer("done").with_status(TransferStatus::Completed);
        done.estimated_unlock_at = Some(now - Duration::minutes(10));

        for t in [&old, &fresh, &done] {
            store.insert(t).await.unwrap();
        }

        let expired = store.find_expired(now, 10).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].reference.as_str(), "old");
    }
}
