//! Fund-Movement Ledger service
//!
//! Deposit settlement, withdrawal staging/confirmation and hot-wallet
//! auto-recharge, each expressed as one [`LedgerBatch`] so the store commits
//! it atomically.
//!
//! # Withdrawal lifecycle
//!
//! ```text
//! stage_withdrawal ──▶ pending ──┬─ provider ok ──▶ completed (+ provider ref)
//!   debit user                    │
//!   credit hot wallet             └─ provider failed ──▶ <ref>_refund batch
//!                                                         credit user, debit hot
//!                                                         original ──▶ failed
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::LedgerError;
use super::store::LedgerStore;
use super::types::{
    Direction, LedgerBatch, LedgerMovement, LedgerTransaction, LedgerTxKind, LedgerTxStatus,
    Posting, StatusUpdate,
};
use crate::config::LedgerConfig;
use crate::core_types::{Currency, InstanceId, ReferenceId, UserId, WalletId};
use crate::events::{
    EventPublisher, SettlementEvent, TOPIC_DEPOSIT_SETTLED, TOPIC_WITHDRAWAL_COMPLETED,
    TOPIC_WITHDRAWAL_FAILED,
};
use crate::instance::{AggregatorInstance, InstanceStore};
use crate::logging::AUDIT_TARGET;

/// Recharge commits retried when a concurrent movement changed a balance
const MAX_RECHARGE_ATTEMPTS: u32 = 3;

/// Funds arriving from an external collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositSettlement {
    pub reference: ReferenceId,
    pub user_id: UserId,
    pub user_wallet: WalletId,
    pub instance_id: InstanceId,
    pub amount: Decimal,
    pub currency: Currency,
}

/// User funds queued for an external payout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalStaging {
    pub reference: ReferenceId,
    pub user_id: UserId,
    pub user_wallet: WalletId,
    pub instance_id: InstanceId,
    pub amount: Decimal,
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalOutcome {
    Succeeded { provider_reference: String },
    Failed { reason: String },
}

/// Committed transaction with its movement rows
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerReceipt {
    pub transaction: LedgerTransaction,
    pub movements: Vec<LedgerMovement>,
}

pub struct FundLedger {
    store: Arc<dyn LedgerStore>,
    instances: Arc<dyn InstanceStore>,
    events: Arc<dyn EventPublisher>,
    config: LedgerConfig,
}

impl FundLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        instances: Arc<dyn InstanceStore>,
        events: Arc<dyn EventPublisher>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            instances,
            events,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    async fn commit(&self, batch: LedgerBatch) -> Result<LedgerReceipt, LedgerError> {
        let transaction = batch.transaction.clone();
        let movements = self.store.commit(batch).await?;
        for m in &movements {
            info!(
                target: AUDIT_TARGET,
                reference = %m.reference,
                account = %m.account,
                direction = m.direction.as_str(),
                amount = %m.amount,
                currency = %m.currency,
                balance_after = %m.balance_after,
                "Ledger movement"
            );
        }
        Ok(LedgerReceipt {
            transaction,
            movements,
        })
    }

    /// Move collected funds from the instance hot wallet to the user
    pub async fn settle_deposit(
        &self,
        deposit: DepositSettlement,
    ) -> Result<LedgerReceipt, LedgerError> {
        if deposit.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(deposit.amount));
        }
        let instance = self.instances.get(&deposit.instance_id).await?;

        let transaction = LedgerTransaction::new(
            deposit.reference.clone(),
            LedgerTxKind::Deposit,
            LedgerTxStatus::Completed,
            deposit.amount,
            deposit.currency.clone(),
        )
        .for_user(deposit.user_id)
        .on_instance(instance.id.clone());

        let batch = LedgerBatch::new(
            transaction,
            vec![
                Posting::debit(&instance.hot_wallet, deposit.amount),
                Posting::credit(&deposit.user_wallet, deposit.amount),
            ],
        )
        .with_usage(instance.id.clone(), deposit.amount);

        let receipt = self.commit(batch).await?;
        info!(
            reference = %deposit.reference,
            user_id = deposit.user_id,
            instance = %instance.id,
            amount = %deposit.amount,
            "Deposit settled"
        );

        self.events
            .publish(SettlementEvent::new(
                TOPIC_DEPOSIT_SETTLED,
                deposit.reference.clone(),
                deposit.amount,
                deposit.currency.clone(),
                LedgerTxStatus::Completed.as_str(),
            ))
            .await;

        if let Err(e) = self.auto_recharge(&instance.id).await {
            warn!(instance = %instance.id, error = %e, "Auto-recharge after deposit failed");
        }
        Ok(receipt)
    }

    /// Debit the user and park the funds on the instance hot wallet
    pub async fn stage_withdrawal(
        &self,
        withdrawal: WithdrawalStaging,
    ) -> Result<LedgerReceipt, LedgerError> {
        if withdrawal.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(withdrawal.amount));
        }
        let instance = self.instances.get(&withdrawal.instance_id).await?;

        let transaction = LedgerTransaction::new(
            withdrawal.reference.clone(),
            LedgerTxKind::Withdrawal,
            LedgerTxStatus::Pending,
            withdrawal.amount,
            withdrawal.currency.clone(),
        )
        .for_user(withdrawal.user_id)
        .on_instance(instance.id.clone());

        let batch = LedgerBatch::new(
            transaction,
            vec![
                Posting::debit(&withdrawal.user_wallet, withdrawal.amount),
                Posting::credit(&instance.hot_wallet, withdrawal.amount),
            ],
        )
        .with_usage(instance.id.clone(), withdrawal.amount);

        let receipt = self.commit(batch).await?;
        info!(
            reference = %withdrawal.reference,
            user_id = withdrawal.user_id,
            instance = %instance.id,
            amount = %withdrawal.amount,
            "Withdrawal staged"
        );
        Ok(receipt)
    }

    /// Finalise a staged withdrawal once the provider has answered
    ///
    /// On failure a compensating batch under `<ref>_refund` reverses the
    /// staging movement and marks the original failed in the same commit.
    pub async fn confirm_withdrawal(
        &self,
        reference: &ReferenceId,
        outcome: WithdrawalOutcome,
    ) -> Result<LedgerTransaction, LedgerError> {
        let original = self
            .store
            .transaction(reference)
            .await?
            .ok_or_else(|| LedgerError::TransactionNotFound(reference.clone()))?;

        match outcome {
            WithdrawalOutcome::Succeeded { provider_reference } => {
                let updated = self
                    .store
                    .update_status(StatusUpdate {
                        reference: reference.clone(),
                        status: LedgerTxStatus::Completed,
                        provider_reference: Some(provider_reference.clone()),
                        failure_reason: None,
                    })
                    .await?;
                info!(reference = %reference, provider_reference = %provider_reference, "Withdrawal completed");
                self.events
                    .publish(SettlementEvent::new(
                        TOPIC_WITHDRAWAL_COMPLETED,
                        reference.clone(),
                        updated.amount,
                        updated.currency.clone(),
                        updated.status.as_str(),
                    ))
                    .await;
                Ok(updated)
            }
            WithdrawalOutcome::Failed { reason } => {
                if original.status != LedgerTxStatus::Pending {
                    return Err(LedgerError::InvalidStatus {
                        reference: reference.clone(),
                        status: original.status,
                    });
                }
                let staged = self.store.movements_for(original.id).await?;
                let user_wallet = account_with(&staged, Direction::Debit)
                    .ok_or_else(|| LedgerError::Corrupt(format!("{} has no debit", reference)))?;
                let hot_wallet = account_with(&staged, Direction::Credit)
                    .ok_or_else(|| LedgerError::Corrupt(format!("{} has no credit", reference)))?;

                let mut refund = LedgerTransaction::new(
                    reference.refund(),
                    LedgerTxKind::WithdrawalRefund,
                    LedgerTxStatus::Completed,
                    original.amount,
                    original.currency.clone(),
                );
                refund.user_id = original.user_id;
                refund.instance_id = original.instance_id.clone();

                let batch = LedgerBatch::new(
                    refund,
                    vec![
                        Posting::debit(&hot_wallet, original.amount),
                        Posting::credit(&user_wallet, original.amount),
                    ],
                )
                .with_status_update(StatusUpdate {
                    reference: reference.clone(),
                    status: LedgerTxStatus::Failed,
                    provider_reference: None,
                    failure_reason: Some(reason.clone()),
                });

                if let Err(e) = self.commit(batch).await {
                    error!(reference = %reference, error = %e, "Withdrawal refund failed");
                    return Err(e);
                }
                warn!(reference = %reference, reason = %reason, "Withdrawal failed, user refunded");

                self.events
                    .publish(
                        SettlementEvent::new(
                            TOPIC_WITHDRAWAL_FAILED,
                            reference.clone(),
                            original.amount,
                            original.currency.clone(),
                            LedgerTxStatus::Failed.as_str(),
                        )
                        .with_detail(reason),
                    )
                    .await;

                self.store
                    .transaction(reference)
                    .await?
                    .ok_or_else(|| LedgerError::TransactionNotFound(reference.clone()))
            }
        }
    }

    /// Top the instance hot wallet up from the cold wallet when it falls below
    /// the threshold. Returns `None` when no movement was needed or possible.
    ///
    /// The amount is computed from balances read before the commit; the batch
    /// carries both as preconditions, so a concurrent movement on either wallet
    /// makes the commit fail with `StaleBalance` and the top-up is re-evaluated.
    pub async fn auto_recharge(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Option<LedgerReceipt>, LedgerError> {
        let instance = self.instances.get(instance_id).await?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_recharge(&instance).await {
                Err(LedgerError::StaleBalance { account, .. }) if attempt < MAX_RECHARGE_ATTEMPTS => {
                    debug!(instance = %instance.id, account = %account, attempt, "Balance moved during recharge, retrying");
                }
                result => return result,
            }
        }
    }

    async fn try_recharge(
        &self,
        instance: &AggregatorInstance,
    ) -> Result<Option<LedgerReceipt>, LedgerError> {
        let balance = self.store.balance(&instance.hot_wallet).await?;
        if balance >= self.config.recharge_threshold {
            return Ok(None);
        }

        let cold_balance = self.store.balance(&self.config.cold_wallet).await?;
        let amount = (self.config.recharge_target - balance).min(cold_balance);
        if amount <= Decimal::ZERO {
            warn!(
                instance = %instance.id,
                balance = %balance,
                cold_balance = %cold_balance,
                "Hot wallet below threshold but cold wallet is empty"
            );
            return Ok(None);
        }

        let reference =
            ReferenceId::new(format!("{}-{}", instance.id, Uuid::new_v4().simple())).recharge();
        let currency = self.store.account_currency(&instance.hot_wallet).await?;
        let transaction = LedgerTransaction::new(
            reference.clone(),
            LedgerTxKind::Recharge,
            LedgerTxStatus::Completed,
            amount,
            currency,
        )
        .on_instance(instance.id.clone());

        let batch = LedgerBatch::new(
            transaction,
            vec![
                Posting::debit(&self.config.cold_wallet, amount),
                Posting::credit(&instance.hot_wallet, amount),
            ],
        )
        .expect_balance(&instance.hot_wallet, balance)
        .expect_balance(&self.config.cold_wallet, cold_balance);
        let receipt = self.commit(batch).await?;

        info!(
            instance = %instance.id,
            reference = %reference,
            amount = %amount,
            balance_before = %balance,
            "Hot wallet recharged"
        );
        Ok(Some(receipt))
    }
}

fn account_with(movements: &[LedgerMovement], direction: Direction) -> Option<WalletId> {
    movements
        .iter()
        .find(|m| m.direction == direction)
        .map(|m| m.account.clone())
}
