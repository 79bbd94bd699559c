//! Ledger persistence
//!
//! [`LedgerStore::commit`] is the only way balances change: it validates the
//! batch, locks every touched account in a stable order, checks each debit
//! against the balance floor, writes movements with resulting balances and
//! records the transaction, all or nothing.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::error::LedgerError;
use super::types::{LedgerBatch, LedgerMovement, LedgerTransaction, LedgerTxStatus, StatusUpdate};
use crate::core_types::{Currency, ReferenceId, WalletId};
use crate::instance::{InstanceStore, MemoryInstanceStore};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create an account if it does not exist
    async fn open_account(
        &self,
        account: &WalletId,
        currency: &Currency,
        balance: Decimal,
    ) -> Result<(), LedgerError>;

    async fn balance(&self, account: &WalletId) -> Result<Decimal, LedgerError>;

    async fn account_currency(&self, account: &WalletId) -> Result<Currency, LedgerError>;

    async fn commit(&self, batch: LedgerBatch) -> Result<Vec<LedgerMovement>, LedgerError>;

    async fn transaction(
        &self,
        reference: &ReferenceId,
    ) -> Result<Option<LedgerTransaction>, LedgerError>;

    /// Move a pending transaction to a final status
    async fn update_status(&self, update: StatusUpdate) -> Result<LedgerTransaction, LedgerError>;

    async fn movements_for(&self, transaction_id: Uuid) -> Result<Vec<LedgerMovement>, LedgerError>;
}

struct Account {
    currency: Currency,
    balance: Decimal,
}

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<WalletId, Account>,
    transactions: HashMap<ReferenceId, LedgerTransaction>,
    movements: Vec<LedgerMovement>,
}

impl LedgerState {
    fn apply_status(&mut self, update: &StatusUpdate) -> Result<LedgerTransaction, LedgerError> {
        let tx = self
            .transactions
            .get_mut(&update.reference)
            .ok_or_else(|| LedgerError::TransactionNotFound(update.reference.clone()))?;
        if tx.status != LedgerTxStatus::Pending {
            return Err(LedgerError::InvalidStatus {
                reference: update.reference.clone(),
                status: tx.status,
            });
        }
        tx.status = update.status;
        if update.provider_reference.is_some() {
            tx.provider_reference = update.provider_reference.clone();
        }
        if update.failure_reason.is_some() {
            tx.failure_reason = update.failure_reason.clone();
        }
        tx.updated_at = Utc::now();
        Ok(tx.clone())
    }

    fn check_status(&self, update: &StatusUpdate) -> Result<(), LedgerError> {
        match self.transactions.get(&update.reference) {
            None => Err(LedgerError::TransactionNotFound(update.reference.clone())),
            Some(tx) if tx.status != LedgerTxStatus::Pending => Err(LedgerError::InvalidStatus {
                reference: update.reference.clone(),
                status: tx.status,
            }),
            Some(_) => Ok(()),
        }
    }
}

/// Single-mutex ledger used in tests and database-less runs
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<LedgerState>,
    instances: Option<Arc<MemoryInstanceStore>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Usage increments in batches are applied to `instances`
    pub fn with_instances(instances: Arc<MemoryInstanceStore>) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            instances: Some(instances),
        }
    }

    /// Every movement ever written, oldest first
    pub async fn all_movements(&self) -> Vec<LedgerMovement> {
        self.state.lock().await.movements.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn open_account(
        &self,
        account: &WalletId,
        currency: &Currency,
        balance: Decimal,
    ) -> Result<(), LedgerError> {
        if balance.is_sign_negative() {
            return Err(LedgerError::InvalidAmount(balance));
        }
        self.state
            .lock()
            .await
            .accounts
            .entry(account.clone())
            .or_insert(Account {
                currency: currency.clone(),
                balance,
            });
        Ok(())
    }

    async fn balance(&self, account: &WalletId) -> Result<Decimal, LedgerError> {
        self.state
            .lock()
            .await
            .accounts
            .get(account)
            .map(|a| a.balance)
            .ok_or_else(|| LedgerError::AccountNotFound(account.clone()))
    }

    async fn account_currency(&self, account: &WalletId) -> Result<Currency, LedgerError> {
        self.state
            .lock()
            .await
            .accounts
            .get(account)
            .map(|a| a.currency.clone())
            .ok_or_else(|| LedgerError::AccountNotFound(account.clone()))
    }

    async fn commit(&self, batch: LedgerBatch) -> Result<Vec<LedgerMovement>, LedgerError> {
        batch.validate()?;
        let mut state = self.state.lock().await;

        if state.transactions.contains_key(&batch.transaction.reference) {
            return Err(LedgerError::DuplicateReference(batch.transaction.reference.clone()));
        }
        if let Some(update) = &batch.status_update {
            state.check_status(update)?;
        }
        if let (Some((instance, _)), Some(instances)) = (&batch.usage, &self.instances) {
            instances.get(instance).await?;
        }

        for (account, expected) in &batch.expected_balances {
            let actual = state
                .accounts
                .get(account)
                .map(|a| a.balance)
                .ok_or_else(|| LedgerError::AccountNotFound(account.clone()))?;
            if actual != *expected {
                return Err(LedgerError::StaleBalance {
                    account: account.clone(),
                    expected: *expected,
                    actual,
                });
            }
        }

        let deltas = batch.deltas();
        for (account, delta) in &deltas {
            let acc = state
                .accounts
                .get(account)
                .ok_or_else(|| LedgerError::AccountNotFound(account.clone()))?;
            if acc.currency != batch.transaction.currency {
                return Err(LedgerError::CurrencyMismatch {
                    account: account.clone(),
                    expected: batch.transaction.currency.clone(),
                    actual: acc.currency.clone(),
                });
            }
            if acc.balance + *delta < Decimal::ZERO {
                return Err(LedgerError::InsufficientBalance {
                    account: account.clone(),
                    available: acc.balance,
                    requested: -*delta,
                });
            }
        }

        // Checks passed; nothing below can fail
        let now = Utc::now();
        let mut movements = Vec::with_capacity(batch.postings.len());
        for posting in &batch.postings {
            let Some(acc) = state.accounts.get_mut(&posting.account) else {
                continue;
            };
            acc.balance += posting.direction.signed(posting.amount);
            movements.push(LedgerMovement {
                transaction_id: batch.transaction.id,
                reference: batch.transaction.reference.clone(),
                account: posting.account.clone(),
                direction: posting.direction,
                amount: posting.amount,
                currency: acc.currency.clone(),
                balance_after: acc.balance,
                user_id: batch.transaction.user_id,
                created_at: now,
            });
        }

        if let Some(update) = &batch.status_update {
            state.apply_status(update)?;
        }
        if let (Some((instance, amount)), Some(instances)) = (&batch.usage, &self.instances) {
            instances.record_usage(instance, *amount, now).await?;
        }

        state.movements.extend(movements.iter().cloned());
        state
            .transactions
            .insert(batch.transaction.reference.clone(), batch.transaction);
        Ok(movements)
    }

    async fn transaction(
        &self,
        reference: &ReferenceId,
    ) -> Result<Option<LedgerTransaction>, LedgerError> {
        Ok(self.state.lock().await.transactions.get(reference).cloned())
    }

    async fn update_status(&self, update: StatusUpdate) -> Result<LedgerTransaction, LedgerError> {
        self.state.lock().await.apply_status(&update)
    }

    async fn movements_for(&self, transaction_id: Uuid) -> Result<Vec<LedgerMovement>, LedgerError> {
        Ok(self
            .state
            .lock()
            .await
            .movements
            .iter()
            .filter(|m| m.transaction_id == transaction_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::{LedgerTxKind, Posting};
    use rust_decimal_macros::dec;

    async fn store() -> MemoryLedgerStore {
        let store = MemoryLedgerStore::new();
        let xof = Currency::new("XOF");
        store.open_account(&"hot".into(), &xof, dec!(1000)).await.unwrap();
        store.open_account(&"user".into(), &xof, dec!(0)).await.unwrap();
        store
            .open_account(&"eur".into(), &Currency::new("EUR"), dec!(0))
            .await
            .unwrap();
        store
    }

    fn batch(reference: &str, from: &str, to: &str, amount: Decimal) -> LedgerBatch {
        LedgerBatch::new(
            LedgerTransaction::new(
                reference.into(),
                LedgerTxKind::Deposit,
                LedgerTxStatus::Completed,
                amount,
                Currency::new("XOF"),
            ),
            vec![
                Posting::debit(&from.into(), amount),
                Posting::credit(&to.into(), amount),
            ],
        )
    }

    #[tokio::test]
    async fn test_commit_writes_zero_sum_movements() {
        let store = store().await;
        let movements = store.commit(batch("d-1", "hot", "user", dec!(300))).await.unwrap();

        assert_eq!(movements.len(), 2);
        assert_eq!(
            movements.iter().map(|m| m.signed_amount()).sum::<Decimal>(),
            Decimal::ZERO
        );
        assert_eq!(movements[0].balance_after, dec!(700));
        assert_eq!(movements[1].balance_after, dec!(300));
    }

    #[tokio::test]
    async fn test_expected_balance_is_checked_under_lock() {
        let store = store().await;
        store.commit(batch("d-1", "hot", "user", dec!(100))).await.unwrap();

        let stale = batch("d-2", "hot", "user", dec!(50)).expect_balance(&"hot".into(), dec!(1000));
        let err = store.commit(stale).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::StaleBalance {
                account: "hot".into(),
                expected: dec!(1000),
                actual: dec!(900),
            }
        );
        assert!(store.transaction(&"d-2".into()).await.unwrap().is_none());

        let fresh = batch("d-3", "hot", "user", dec!(50)).expect_balance(&"hot".into(), dec!(900));
        store.commit(fresh).await.unwrap();
        assert_eq!(store.balance(&"hot".into()).await.unwrap(), dec!(850));
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_trace() {
        let store = store().await;

        let err = store.commit(batch("d-1", "hot", "user", dec!(1000.01))).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));

        let err = store.commit(batch("d-2", "hot", "eur", dec!(1))).await.unwrap_err();
        assert!(matches!(err, LedgerError::CurrencyMismatch { .. }));

        assert_eq!(store.balance(&"hot".into()).await.unwrap(), dec!(1000));
        assert!(store.all_movements().await.is_empty());
        assert!(store.transaction(&"d-1".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reference_is_unique() {
        let store = store().await;
        store.commit(batch("d-1", "hot", "user", dec!(1))).await.unwrap();
        assert_eq!(
            store.commit(batch("d-1", "hot", "user", dec!(1))).await,
            Err(LedgerError::DuplicateReference("d-1".into()))
        );
    }

    #[tokio::test]
    async fn test_status_update_only_from_pending() {
        let store = store().await;
        let mut pending = batch("w-1", "hot", "user", dec!(5));
        pending.transaction.status = LedgerTxStatus::Pending;
        store.commit(pending).await.unwrap();

        let update = StatusUpdate {
            reference: "w-1".into(),
            status: LedgerTxStatus::Completed,
            provider_reference: Some("prov-1".into()),
            failure_reason: None,
        };
        let tx = store.update_status(update.clone()).await.unwrap();
        assert_eq!(tx.provider_reference.as_deref(), Some("prov-1"));
        assert!(matches!(
            store.update_status(update).await,
            Err(LedgerError::InvalidStatus { .. })
        ));
    }
}
