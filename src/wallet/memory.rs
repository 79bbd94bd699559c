//! In-memory wallet service
//!
//! Used in tests and when no database is configured. Supports fault
//! injection so compensation paths can be exercised.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

use super::{WalletBalance, WalletError, WalletService};
use crate::core_types::{Currency, ReferenceId, WalletId};

/// One balance change, signed (credit positive)
#[derive(Debug, Clone, PartialEq)]
pub struct WalletEntry {
    pub wallet_id: WalletId,
    pub reference: ReferenceId,
    pub amount: Decimal,
    pub currency: Currency,
}

struct WalletState {
    currency: Currency,
    balance: Decimal,
    locks: HashMap<ReferenceId, Decimal>,
}

impl WalletState {
    fn locked(&self) -> Decimal {
        self.locks.values().copied().sum()
    }

    fn available(&self) -> Decimal {
        self.balance - self.locked()
    }
}

#[derive(Default)]
pub struct MemoryWalletService {
    wallets: Mutex<HashMap<WalletId, WalletState>>,
    journal: Mutex<Vec<WalletEntry>>,
    fail_debit: Mutex<HashSet<WalletId>>,
    fail_credit: Mutex<HashSet<WalletId>>,
    debit_count: AtomicUsize,
    credit_count: AtomicUsize,
}

impl MemoryWalletService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open_wallet(&self, wallet: impl Into<WalletId>, currency: &str, balance: Decimal) {
        self.wallets.lock().await.insert(
            wallet.into(),
            WalletState {
                currency: Currency::new(currency),
                balance,
                locks: HashMap::new(),
            },
        );
    }

    /// Make every debit on `wallet` fail with `Unavailable`
    pub async fn set_fail_debit(&self, wallet: &WalletId, fail: bool) {
        let mut set = self.fail_debit.lock().await;
        if fail {
            set.insert(wallet.clone());
        } else {
            set.remove(wallet);
        }
    }

    /// Make every credit on `wallet` fail with `Unavailable`
    pub async fn set_fail_credit(&self, wallet: &WalletId, fail: bool) {
        let mut set = self.fail_credit.lock().await;
        if fail {
            set.insert(wallet.clone());
        } else {
            set.remove(wallet);
        }
    }

    pub fn debit_count(&self) -> usize {
        self.debit_count.load(Ordering::SeqCst)
    }

    pub fn credit_count(&self) -> usize {
        self.credit_count.load(Ordering::SeqCst)
    }

    /// Journal entries whose reference is `reference` or derived from it
    pub async fn entries_for(&self, reference: &ReferenceId) -> Vec<WalletEntry> {
        let prefix = format!("{}_", reference);
        self.journal
            .lock()
            .await
            .iter()
            .filter(|e| e.reference == *reference || e.reference.as_str().starts_with(&prefix))
            .cloned()
            .collect()
    }

    async fn record(&self, wallet: &WalletId, reference: &ReferenceId, amount: Decimal, currency: Currency) {
        self.journal.lock().await.push(WalletEntry {
            wallet_id: wallet.clone(),
            reference: reference.clone(),
            amount,
            currency,
        });
    }
}

fn positive(amount: Decimal) -> Result<(), WalletError> {
    if amount <= Decimal::ZERO {
        return Err(WalletError::InvalidAmount(amount));
    }
    Ok(())
}

#[async_trait]
impl WalletService for MemoryWalletService {
    async fn get_balance(&self, wallet: &WalletId) -> Result<WalletBalance, WalletError> {
        let wallets = self.wallets.lock().await;
        let state = wallets
            .get(wallet)
            .ok_or_else(|| WalletError::NotFound(wallet.clone()))?;
        Ok(WalletBalance {
            wallet_id: wallet.clone(),
            currency: state.currency.clone(),
            balance: state.balance,
            locked: state.locked(),
        })
    }

    async fn lock_funds(
        &self,
        wallet: &WalletId,
        amount: Decimal,
        reference: &ReferenceId,
    ) -> Result<(), WalletError> {
        positive(amount)?;
        let mut wallets = self.wallets.lock().await;
        let state = wallets
            .get_mut(wallet)
            .ok_or_else(|| WalletError::NotFound(wallet.clone()))?;
        if state.locks.contains_key(reference) {
            return Err(WalletError::DuplicateLock(reference.clone()));
        }
        if state.available() < amount {
            return Err(WalletError::InsufficientBalance {
                wallet: wallet.clone(),
                available: state.available(),
                requested: amount,
            });
        }
        state.locks.insert(reference.clone(), amount);
        debug!(wallet = %wallet, reference = %reference, amount = %amount, "Funds locked");
        Ok(())
    }

    async fn unlock_funds(
        &self,
        wallet: &WalletId,
        reference: &ReferenceId,
    ) -> Result<Decimal, WalletError> {
        let mut wallets = self.wallets.lock().await;
        let state = wallets
            .get_mut(wallet)
            .ok_or_else(|| WalletError::NotFound(wallet.clone()))?;
        state
            .locks
            .remove(reference)
            .ok_or_else(|| WalletError::LockNotFound {
                wallet: wallet.clone(),
                reference: reference.clone(),
            })
    }

    async fn debit_wallet(
        &self,
        wallet: &WalletId,
        amount: Decimal,
        reference: &ReferenceId,
    ) -> Result<Decimal, WalletError> {
        self.debit_count.fetch_add(1, Ordering::SeqCst);
        positive(amount)?;
        if self.fail_debit.lock().await.contains(wallet) {
            return Err(WalletError::Unavailable(format!("debit on {} failed", wallet)));
        }

        let (balance, currency) = {
            let mut wallets = self.wallets.lock().await;
            let state = wallets
                .get_mut(wallet)
                .ok_or_else(|| WalletError::NotFound(wallet.clone()))?;
            if state.available() < amount {
                return Err(WalletError::InsufficientBalance {
                    wallet: wallet.clone(),
                    available: state.available(),
                    requested: amount,
                });
            }
            state.balance -= amount;
            (state.balance, state.currency.clone())
        };
        self.record(wallet, reference, -amount, currency).await;
        Ok(balance)
    }

    async fn credit_wallet(
        &self,
        wallet: &WalletId,
        amount: Decimal,
        reference: &ReferenceId,
    ) -> Result<Decimal, WalletError> {
        self.credit_count.fetch_add(1, Ordering::SeqCst);
        positive(amount)?;
        if self.fail_credit.lock().await.contains(wallet) {
            return Err(WalletError::Unavailable(format!("credit on {} failed", wallet)));
        }

        let (balance, currency) = {
            let mut wallets = self.wallets.lock().await;
            let state = wallets
                .get_mut(wallet)
                .ok_or_else(|| WalletError::NotFound(wallet.clone()))?;
            state.balance += amount;
            (state.balance, state.currency.clone())
        };
        self.record(wallet, reference, amount, currency).await;
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn service() -> MemoryWalletService {
        let service = MemoryWalletService::new();
        service.open_wallet("alice", "XOF", dec!(10000)).await;
        service
    }

    #[tokio::test]
    async fn test_locked_funds_are_not_spendable() {
        let service = service().await;
        let alice = WalletId::new("alice");
        service
            .lock_funds(&alice, dec!(8000), &"t-1".into())
            .await
            .unwrap();

        let balance = service.get_balance(&alice).await.unwrap();
        assert_eq!(balance.available(), dec!(2000));
        assert!(matches!(
            service.debit_wallet(&alice, dec!(3000), &"t-2".into()).await,
            Err(WalletError::InsufficientBalance { .. })
        ));

        assert_eq!(
            service.unlock_funds(&alice, &"t-1".into()).await.unwrap(),
            dec!(8000)
        );
        assert_eq!(
            service.debit_wallet(&alice, dec!(3000), &"t-2".into()).await.unwrap(),
            dec!(7000)
        );
    }

    #[tokio::test]
    async fn test_duplicate_lock_rejected() {
        let service = service().await;
        let alice = WalletId::new("alice");
        service.lock_funds(&alice, dec!(1), &"t-1".into()).await.unwrap();
        assert_eq!(
            service.lock_funds(&alice, dec!(1), &"t-1".into()).await,
            Err(WalletError::DuplicateLock("t-1".into()))
        );
    }

    #[tokio::test]
    async fn test_fault_injection_and_journal() {
        let service = service().await;
        let alice = WalletId::new("alice");
        service.set_fail_credit(&alice, true).await;
        assert!(matches!(
            service.credit_wallet(&alice, dec!(5), &"t-1".into()).await,
            Err(WalletError::Unavailable(_))
        ));
        assert_eq!(service.credit_count(), 1);

        service.debit_wallet(&alice, dec!(5), &"t-1".into()).await.unwrap();
        service.set_fail_credit(&alice, false).await;
        service
            .credit_wallet(&alice, dec!(5), &ReferenceId::new("t-1").refund())
            .await
            .unwrap();

        let entries = service.entries_for(&"t-1".into()).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.iter().map(|e| e.amount).sum::<Decimal>(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_wallet() {
        let service = service().await;
        assert!(matches!(
            service.get_balance(&"ghost".into()).await,
            Err(WalletError::NotFound(_))
        ));
    }
}
