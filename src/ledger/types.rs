use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::LedgerError;
use crate::core_types::{Currency, InstanceId, ReferenceId, UserId, WalletId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Debit => "debit",
            Direction::Credit => "credit",
        }
    }

    /// Signed amount: debits negative, credits positive
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            Direction::Debit => -amount,
            Direction::Credit => amount,
        }
    }
}

impl FromStr for Direction {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(Direction::Debit),
            "credit" => Ok(Direction::Credit),
            other => Err(LedgerError::Corrupt(format!("unknown direction {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerTxKind {
    Deposit,
    Withdrawal,
    WithdrawalRefund,
    Recharge,
}

impl LedgerTxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerTxKind::Deposit => "deposit",
            LedgerTxKind::Withdrawal => "withdrawal",
            LedgerTxKind::WithdrawalRefund => "withdrawal_refund",
            LedgerTxKind::Recharge => "recharge",
        }
    }
}

impl FromStr for LedgerTxKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(LedgerTxKind::Deposit),
            "withdrawal" => Ok(LedgerTxKind::Withdrawal),
            "withdrawal_refund" => Ok(LedgerTxKind::WithdrawalRefund),
            "recharge" => Ok(LedgerTxKind::Recharge),
            other => Err(LedgerError::Corrupt(format!("unknown kind {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerTxStatus {
    Pending,
    Completed,
    Failed,
}

impl LedgerTxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerTxStatus::Pending => "pending",
            LedgerTxStatus::Completed => "completed",
            LedgerTxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for LedgerTxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerTxStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LedgerTxStatus::Pending),
            "completed" => Ok(LedgerTxStatus::Completed),
            "failed" => Ok(LedgerTxStatus::Failed),
            other => Err(LedgerError::Corrupt(format!("unknown status {}", other))),
        }
    }
}

/// Transaction record; one per reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub reference: ReferenceId,
    pub kind: LedgerTxKind,
    pub status: LedgerTxStatus,
    pub user_id: Option<UserId>,
    pub instance_id: Option<InstanceId>,
    pub amount: Decimal,
    pub currency: Currency,
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn new(
        reference: ReferenceId,
        kind: LedgerTxKind,
        status: LedgerTxStatus,
        amount: Decimal,
        currency: Currency,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reference,
            kind,
            status,
            user_id: None,
            instance_id: None,
            amount,
            currency,
            provider_reference: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn on_instance(mut self, instance_id: InstanceId) -> Self {
        self.instance_id = Some(instance_id);
        self
    }
}

/// One balance change inside a batch
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub account: WalletId,
    pub direction: Direction,
    pub amount: Decimal,
}

impl Posting {
    pub fn debit(account: &WalletId, amount: Decimal) -> Self {
        Self {
            account: account.clone(),
            direction: Direction::Debit,
            amount,
        }
    }

    pub fn credit(account: &WalletId, amount: Decimal) -> Self {
        Self {
            account: account.clone(),
            direction: Direction::Credit,
            amount,
        }
    }
}

/// Persisted movement row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerMovement {
    pub transaction_id: Uuid,
    pub reference: ReferenceId,
    pub account: WalletId,
    pub direction: Direction,
    pub amount: Decimal,
    pub currency: Currency,
    pub balance_after: Decimal,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl LedgerMovement {
    pub fn signed_amount(&self) -> Decimal {
        self.direction.signed(self.amount)
    }
}

/// Status change applied to an existing pending transaction in the same commit
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub reference: ReferenceId,
    pub status: LedgerTxStatus,
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
}

/// Unit of work for [`LedgerStore::commit`](super::LedgerStore::commit)
#[derive(Debug, Clone)]
pub struct LedgerBatch {
    pub transaction: LedgerTransaction,
    pub postings: Vec<Posting>,
    /// Volume to add to an instance's usage counters
    pub usage: Option<(InstanceId, Decimal)>,
    pub status_update: Option<StatusUpdate>,
    /// Balances the batch was computed from; checked under the account locks
    pub expected_balances: Vec<(WalletId, Decimal)>,
}

impl LedgerBatch {
    pub fn new(transaction: LedgerTransaction, postings: Vec<Posting>) -> Self {
        Self {
            transaction,
            postings,
            usage: None,
            status_update: None,
            expected_balances: Vec::new(),
        }
    }

    pub fn with_usage(mut self, instance: InstanceId, amount: Decimal) -> Self {
        self.usage = Some((instance, amount));
        self
    }

    pub fn with_status_update(mut self, update: StatusUpdate) -> Self {
        self.status_update = Some(update);
        self
    }

    /// Abort the commit with `StaleBalance` unless `account` still holds `balance`
    pub fn expect_balance(mut self, account: &WalletId, balance: Decimal) -> Self {
        self.expected_balances.push((account.clone(), balance));
        self
    }

    /// Double-entry checks: at least one debit and one credit, positive
    /// amounts, signed sum of zero, a debit and credit never on one account
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.postings.iter().any(|p| p.amount <= Decimal::ZERO) {
            return Err(LedgerError::Unbalanced("posting amount must be positive".into()));
        }
        let has_debit = self.postings.iter().any(|p| p.direction == Direction::Debit);
        let has_credit = self.postings.iter().any(|p| p.direction == Direction::Credit);
        if !has_debit || !has_credit {
            return Err(LedgerError::Unbalanced("needs a debit and a credit".into()));
        }
        let sum: Decimal = self.postings.iter().map(|p| p.direction.signed(p.amount)).sum();
        if !sum.is_zero() {
            return Err(LedgerError::Unbalanced(format!("postings sum to {}", sum)));
        }
        let debited: Vec<&WalletId> = self
            .postings
            .iter()
            .filter(|p| p.direction == Direction::Debit)
            .map(|p| &p.account)
            .collect();
        if self
            .postings
            .iter()
            .any(|p| p.direction == Direction::Credit && debited.contains(&&p.account))
        {
            return Err(LedgerError::Unbalanced("debit and credit on the same account".into()));
        }
        Ok(())
    }

    /// Net change per account, sorted by account for stable lock order
    pub fn deltas(&self) -> Vec<(WalletId, Decimal)> {
        let mut deltas: Vec<(WalletId, Decimal)> = Vec::new();
        for p in &self.postings {
            let signed = p.direction.signed(p.amount);
            match deltas.iter_mut().find(|(a, _)| *a == p.account) {
                Some((_, d)) => *d += signed,
                None => deltas.push((p.account.clone(), signed)),
            }
        }
        deltas.sort_by(|a, b| a.0.cmp(&b.0));
        deltas
    }
}
