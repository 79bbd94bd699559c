//! Transfer Core Types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::state::TransferStatus;
use crate::core_types::{
    CountryCode, Currency, InternalTransferId, ReferenceId, UserId, WalletId,
};
use crate::provider::{PaymentMethod, Recipient};

/// Settlement path chosen at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    /// Same currency, settled synchronously with a flat fee
    Direct,
    /// Cross-currency at or below the instant threshold, converted synchronously
    Instant,
    /// Cross-currency above the threshold, settled by the worker
    Locked,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Direct => "direct",
            TransferKind::Instant => "instant",
            TransferKind::Locked => "locked",
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(TransferKind::Direct),
            "instant" => Ok(TransferKind::Instant),
            "locked" => Ok(TransferKind::Locked),
            _ => Err(format!("Invalid transfer kind: {}", s)),
        }
    }
}

/// External payout to run once a locked transfer has settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutInstruction {
    pub country: CountryCode,
    pub method: PaymentMethod,
    pub recipient: Recipient,
    #[serde(default)]
    pub narration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTransferRequest {
    pub reference: ReferenceId,
    pub sender_wallet: WalletId,
    pub sender_user: UserId,
    pub recipient_wallet: WalletId,
    pub recipient_user: UserId,
    /// Amount in the sender wallet's currency
    pub amount: Decimal,
    #[serde(default)]
    pub payout: Option<PayoutInstruction>,
}

impl CreateTransferRequest {
    pub fn new(
        reference: impl Into<ReferenceId>,
        sender: (impl Into<WalletId>, UserId),
        recipient: (impl Into<WalletId>, UserId),
        amount: Decimal,
    ) -> Self {
        Self {
            reference: reference.into(),
            sender_wallet: sender.0.into(),
            sender_user: sender.1,
            recipient_wallet: recipient.0.into(),
            recipient_user: recipient.1,
            amount,
            payout: None,
        }
    }

    pub fn with_payout(mut self, payout: PayoutInstruction) -> Self {
        self.payout = Some(payout);
        self
    }
}

/// Persisted internal transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalTransfer {
    pub transfer_id: InternalTransferId,
    pub reference: ReferenceId,
    pub sender_wallet: WalletId,
    pub sender_user: UserId,
    pub recipient_wallet: WalletId,
    pub recipient_user: UserId,
    pub sender_amount: Decimal,
    pub sender_currency: Currency,
    /// Set only once the recipient leg has been priced and credited
    pub recipient_amount: Option<Decimal>,
    pub recipient_currency: Currency,
    pub exchange_rate: Option<Decimal>,
    /// Direct-path fee, in the sender currency
    pub transfer_fee: Decimal,
    /// Conversion fee, in the recipient currency
    pub conversion_fee: Decimal,
    pub kind: TransferKind,
    pub status: TransferStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub estimated_unlock_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl InternalTransfer {
    /// New PENDING transfer for a validated request
    pub fn new(
        request: &CreateTransferRequest,
        sender_currency: Currency,
        recipient_currency: Currency,
        kind: TransferKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            transfer_id: InternalTransferId::new(),
            reference: request.reference.clone(),
            sender_wallet: request.sender_wallet.clone(),
            sender_user: request.sender_user,
            recipient_wallet: request.recipient_wallet.clone(),
            recipient_user: request.recipient_user,
            sender_amount: request.amount,
            sender_currency,
            recipient_amount: None,
            recipient_currency,
            exchange_rate: None,
            transfer_fee: Decimal::ZERO,
            conversion_fee: Decimal::ZERO,
            kind,
            status: TransferStatus::Pending,
            failure_reason: None,
            created_at: now,
            locked_at: None,
            estimated_unlock_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Copy of this transfer moved to COMPLETED with its recipient leg
    pub fn completed(&self, recipient_amount: Decimal, exchange_rate: Decimal) -> Self {
        let now = Utc::now();
        Self {
            status: TransferStatus::Completed,
            recipient_amount: Some(recipient_amount),
            exchange_rate: Some(exchange_rate),
            completed_at: Some(now),
            updated_at: now,
            ..self.clone()
        }
    }

    /// Copy of this transfer moved to FAILED
    pub fn failed(&self, reason: impl Into<String>) -> Self {
        Self {
            status: TransferStatus::Failed,
            failure_reason: Some(reason.into()),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn with_status(&self, status: TransferStatus) -> Self {
        Self {
            status,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Unit of work for the settlement worker
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementJob {
    pub transfer_id: InternalTransferId,
    pub payout: Option<PayoutInstruction>,
}
