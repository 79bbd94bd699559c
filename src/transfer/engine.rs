//! Internal Transfer Engine
//!
//! Moves value between two platform wallets. The path is fixed at creation:
//!
//! ```text
//! same currency                         ─▶ DIRECT  (debit, fee, credit)
//! cross currency, USD ≤ threshold       ─▶ INSTANT (convert, debit, credit)
//! cross currency, USD > threshold       ─▶ LOCKED  (lock, enqueue, return)
//! ```
//!
//! Any failure after the sender was debited is compensated synchronously
//! under `<reference>_refund` before the transfer is marked FAILED.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::error::TransferError;
use super::state::TransferStatus;
use super::store::TransferStore;
use super::types::{CreateTransferRequest, InternalTransfer, SettlementJob, TransferKind};
use crate::config::InternalTransferConfig;
use crate::core_types::{InternalTransferId, ReferenceId, WalletId};
use crate::crypto_rails::{ConversionRequest, ConversionResponse, CryptoRailsBridge};
use crate::events::{
    EventPublisher, SettlementEvent, TOPIC_TRANSFER_COMPLETED, TOPIC_TRANSFER_FAILED,
};
use crate::logging::AUDIT_TARGET;
use crate::money::{fee_at, round_for};
use crate::wallet::{WalletError, WalletService};

pub struct InternalTransferEngine {
    store: Arc<dyn TransferStore>,
    wallets: Arc<dyn WalletService>,
    bridge: Arc<CryptoRailsBridge>,
    events: Arc<dyn EventPublisher>,
    config: InternalTransferConfig,
    queue: mpsc::Sender<SettlementJob>,
}

impl InternalTransferEngine {
    /// Build the engine and the receiving end of its settlement queue
    pub fn new(
        store: Arc<dyn TransferStore>,
        wallets: Arc<dyn WalletService>,
        bridge: Arc<CryptoRailsBridge>,
        events: Arc<dyn EventPublisher>,
        config: InternalTransferConfig,
    ) -> (Self, mpsc::Receiver<SettlementJob>) {
        let (queue, jobs) = mpsc::channel(config.settlement_queue_size);
        (
            Self {
                store,
                wallets,
                bridge,
                events,
                config,
                queue,
            },
            jobs,
        )
    }

    pub fn store(&self) -> &Arc<dyn TransferStore> {
        &self.store
    }

    pub(crate) fn wallets(&self) -> &Arc<dyn WalletService> {
        &self.wallets
    }

    pub(crate) fn bridge(&self) -> &Arc<CryptoRailsBridge> {
        &self.bridge
    }

    pub async fn get_transfer(&self, id: InternalTransferId) -> Result<InternalTransfer, TransferError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| TransferError::TransferNotFound(id.to_string()))
    }

    pub async fn get_by_reference(
        &self,
        reference: &ReferenceId,
    ) -> Result<InternalTransfer, TransferError> {
        self.store
            .get_by_reference(reference)
            .await?
            .ok_or_else(|| TransferError::TransferNotFound(reference.to_string()))
    }

    /// Create and (for DIRECT / INSTANT) settle a transfer
    ///
    /// A known reference returns the stored transfer untouched. LOCKED
    /// transfers return in LOCKED state once the job is queued.
    pub async fn create_transfer(
        &self,
        request: CreateTransferRequest,
    ) -> Result<InternalTransfer, TransferError> {
        if let Some(existing) = self.store.get_by_reference(&request.reference).await? {
            debug!(reference = %request.reference, status = %existing.status, "Duplicate reference, returning existing transfer");
            return Ok(existing);
        }

        if request.amount <= Decimal::ZERO {
            return Err(TransferError::InvalidAmount);
        }
        if request.sender_wallet == request.recipient_wallet {
            return Err(TransferError::SameWallet);
        }

        let sender = self.wallets.get_balance(&request.sender_wallet).await?;
        let recipient = self.wallets.get_balance(&request.recipient_wallet).await?;
        if sender.available() < request.amount {
            return Err(TransferError::InsufficientBalance {
                available: sender.available(),
                requested: request.amount,
            });
        }

        let kind = if sender.currency == recipient.currency {
            TransferKind::Direct
        } else {
            let usd = self
                .bridge
                .usd_equivalent(request.amount, &sender.currency)
                .await?;
            if usd <= self.config.instant_threshold_usd {
                TransferKind::Instant
            } else {
                TransferKind::Locked
            }
        };

        let transfer = InternalTransfer::new(&request, sender.currency, recipient.currency, kind);
        match self.store.insert(&transfer).await {
            Ok(()) => {}
            Err(TransferError::DuplicateReference(reference)) => {
                return self.get_by_reference(&reference).await;
            }
            Err(e) => return Err(e),
        }

        info!(
            transfer_id = %transfer.transfer_id,
            reference = %transfer.reference,
            kind = %kind,
            amount = %transfer.sender_amount,
            from = %transfer.sender_currency,
            to = %transfer.recipient_currency,
            "Transfer created"
        );

        match kind {
            TransferKind::Direct => self.settle_direct(transfer).await,
            TransferKind::Instant => self.settle_instant(transfer).await,
            TransferKind::Locked => self.lock_and_enqueue(transfer, request).await,
        }
    }

    async fn settle_direct(&self, transfer: InternalTransfer) -> Result<InternalTransfer, TransferError> {
        let reference = transfer.reference.clone();
        let currency = &transfer.sender_currency;
        let fee = round_for(fee_at(transfer.sender_amount, self.config.direct_fee_rate), currency);
        let net = transfer.sender_amount - fee;
        let fee_wallet = self.config.fee_wallet(currency).filter(|_| fee > Decimal::ZERO);

        if let Err(e) = self
            .wallets
            .debit_wallet(&transfer.sender_wallet, transfer.sender_amount, &reference)
            .await
        {
            return Err(self.fail_without_debit(&transfer, TransferStatus::Pending, e).await);
        }

        if let Some(fee_wallet) = fee_wallet
            && let Err(e) = self.wallets.credit_wallet(fee_wallet, fee, &reference).await
        {
            return Err(self
                .refund(&transfer, TransferStatus::Pending, None, &e.to_string())
                .await);
        }

        if let Err(e) = self
            .wallets
            .credit_wallet(&transfer.recipient_wallet, net, &reference)
            .await
        {
            let fee_credit = fee_wallet.map(|w| (w, fee));
            return Err(self
                .refund(&transfer, TransferStatus::Pending, fee_credit, &e.to_string())
                .await);
        }

        let mut completed = transfer.completed(net, Decimal::ONE);
        completed.transfer_fee = fee;
        self.complete(completed, TransferStatus::Pending).await
    }

    async fn settle_instant(&self, transfer: InternalTransfer) -> Result<InternalTransfer, TransferError> {
        let conversion = match self.bridge.convert_via_stablecoin(&conversion_request(&transfer)).await {
            Ok(conversion) => conversion,
            Err(e) => {
                self.mark_failed(&transfer, TransferStatus::Pending, &e.to_string())
                    .await;
                return Err(e.into());
            }
        };

        self.settle_converted(transfer, TransferStatus::Pending, conversion)
            .await
    }

    /// Debit, credit and complete a transfer whose conversion already ran
    ///
    /// Shared by the INSTANT path and the settlement worker.
    pub(crate) async fn settle_converted(
        &self,
        transfer: InternalTransfer,
        from: TransferStatus,
        conversion: ConversionResponse,
    ) -> Result<InternalTransfer, TransferError> {
        let reference = transfer.reference.clone();

        if let Err(e) = self
            .wallets
            .debit_wallet(&transfer.sender_wallet, transfer.sender_amount, &reference)
            .await
        {
            self.release_conversion(&conversion).await;
            return Err(self.fail_without_debit(&transfer, from, e).await);
        }

        if let Err(e) = self
            .wallets
            .credit_wallet(&transfer.recipient_wallet, conversion.target_amount, &reference)
            .await
        {
            self.release_conversion(&conversion).await;
            return Err(self.refund(&transfer, from, None, &e.to_string()).await);
        }

        if conversion.used_internal_pool
            && let Err(e) = self.bridge.commit_pool_usage(&reference).await
        {
            warn!(reference = %reference, error = %e, "Pool usage commit failed");
        }

        let mut completed = transfer.completed(conversion.target_amount, conversion.exchange_rate());
        completed.conversion_fee = conversion.fee_in_target;
        self.complete(completed, from).await
    }

    async fn lock_and_enqueue(
        &self,
        transfer: InternalTransfer,
        request: CreateTransferRequest,
    ) -> Result<InternalTransfer, TransferError> {
        if let Err(e) = self
            .wallets
            .lock_funds(&transfer.sender_wallet, transfer.sender_amount, &transfer.reference)
            .await
        {
            return Err(self.fail_without_debit(&transfer, TransferStatus::Pending, e).await);
        }

        let now = Utc::now();
        let mut locked = transfer.with_status(TransferStatus::Locked);
        locked.locked_at = Some(now);
        locked.estimated_unlock_at = chrono::Duration::from_std(self.config.lock_window())
            .ok()
            .map(|window| now + window);

        if !self.store.update_if(&locked, TransferStatus::Pending).await? {
            return Err(TransferError::SystemError(format!(
                "Transfer {} changed while locking",
                locked.transfer_id
            )));
        }

        let job = SettlementJob {
            transfer_id: locked.transfer_id,
            payout: request.payout,
        };
        if let Err(e) = self.queue.try_send(job) {
            warn!(reference = %locked.reference, error = %e, "Settlement queue rejected job");
            if let Err(unlock) = self
                .wallets
                .unlock_funds(&locked.sender_wallet, &locked.reference)
                .await
            {
                error!(reference = %locked.reference, error = %unlock, "Unlock after enqueue failure failed");
            }
            self.mark_failed(&locked, TransferStatus::Locked, "settlement queue unavailable")
                .await;
            return Err(TransferError::ServiceUnavailable(
                "settlement queue unavailable".into(),
            ));
        }

        info!(
            transfer_id = %locked.transfer_id,
            reference = %locked.reference,
            unlock_at = ?locked.estimated_unlock_at,
            "Transfer locked and queued for settlement"
        );
        Ok(locked)
    }

    pub(crate) async fn complete(
        &self,
        completed: InternalTransfer,
        from: TransferStatus,
    ) -> Result<InternalTransfer, TransferError> {
        if !self.store.update_if(&completed, from).await? {
            error!(
                reference = %completed.reference,
                "Transfer settled but status changed concurrently"
            );
            return Err(TransferError::SystemError(format!(
                "Transfer {} changed during settlement",
                completed.transfer_id
            )));
        }

        let recipient_amount = completed.recipient_amount.unwrap_or_default();
        info!(
            target: AUDIT_TARGET,
            transfer_id = %completed.transfer_id,
            reference = %completed.reference,
            sender = %completed.sender_wallet,
            recipient = %completed.recipient_wallet,
            debited = %completed.sender_amount,
            credited = %recipient_amount,
            fee = %completed.transfer_fee,
            conversion_fee = %completed.conversion_fee,
            "Transfer completed"
        );
        self.events
            .publish(SettlementEvent::new(
                TOPIC_TRANSFER_COMPLETED,
                completed.reference.clone(),
                recipient_amount,
                completed.recipient_currency.clone(),
                "completed",
            ))
            .await;
        Ok(completed)
    }

    /// Return the sender's debit (and any fee credit) then mark FAILED
    pub(crate) async fn refund(
        &self,
        transfer: &InternalTransfer,
        from: TransferStatus,
        fee_credit: Option<(&WalletId, Decimal)>,
        reason: &str,
    ) -> TransferError {
        let refund_ref = transfer.reference.refund();

        if let Some((fee_wallet, fee)) = fee_credit
            && let Err(e) = self.wallets.debit_wallet(fee_wallet, fee, &refund_ref).await
        {
            error!(reference = %refund_ref, wallet = %fee_wallet, error = %e, "Fee reversal failed");
        }

        match self
            .wallets
            .credit_wallet(&transfer.sender_wallet, transfer.sender_amount, &refund_ref)
            .await
        {
            Ok(balance) => info!(
                target: AUDIT_TARGET,
                reference = %refund_ref,
                wallet = %transfer.sender_wallet,
                amount = %transfer.sender_amount,
                balance = %balance,
                "Sender refunded"
            ),
            Err(e) => error!(
                reference = %refund_ref,
                wallet = %transfer.sender_wallet,
                amount = %transfer.sender_amount,
                error = %e,
                "CRITICAL: refund failed, manual reconciliation required"
            ),
        }

        self.mark_failed(transfer, from, reason).await;
        TransferError::Refunded {
            reference: transfer.reference.clone(),
            reason: reason.to_string(),
        }
    }

    async fn fail_without_debit(
        &self,
        transfer: &InternalTransfer,
        from: TransferStatus,
        cause: WalletError,
    ) -> TransferError {
        self.mark_failed(transfer, from, &cause.to_string()).await;
        cause.into()
    }

    /// Move to FAILED and publish; a lost CAS means someone else finished it
    pub(crate) async fn mark_failed(&self, transfer: &InternalTransfer, from: TransferStatus, reason: &str) {
        let failed = transfer.failed(reason);
        match self.store.update_if(&failed, from).await {
            Ok(true) => {
                warn!(
                    transfer_id = %failed.transfer_id,
                    reference = %failed.reference,
                    reason = reason,
                    "Transfer failed"
                );
                self.events
                    .publish(
                        SettlementEvent::new(
                            TOPIC_TRANSFER_FAILED,
                            failed.reference.clone(),
                            failed.sender_amount,
                            failed.sender_currency.clone(),
                            "failed",
                        )
                        .with_detail(reason),
                    )
                    .await;
            }
            Ok(false) => debug!(reference = %failed.reference, "Transfer already left {}", from),
            Err(e) => error!(reference = %failed.reference, error = %e, "Failed to record transfer failure"),
        }
    }

    pub(crate) async fn release_conversion(&self, conversion: &ConversionResponse) {
        if conversion.used_internal_pool
            && let Err(e) = self.bridge.release_pool_reservation(&conversion.reference).await
        {
            warn!(reference = %conversion.reference, error = %e, "Pool reservation release failed");
        }
    }
}

pub(crate) fn conversion_request(transfer: &InternalTransfer) -> ConversionRequest {
    ConversionRequest::new(
        transfer.reference.clone(),
        transfer.sender_amount,
        transfer.sender_currency.clone(),
        transfer.recipient_currency.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CryptoRailsConfig;
    use crate::core_types::Currency;
    use crate::crypto_rails::RateTable;
    use crate::events::ChannelPublisher;
    use crate::transfer::store::MemoryTransferStore;
    use crate::wallet::MemoryWalletService;
    use rust_decimal_macros::dec;

    struct Harness {
        engine: InternalTransferEngine,
        wallets: Arc<MemoryWalletService>,
        jobs: mpsc::Receiver<SettlementJob>,
        events: mpsc::Receiver<SettlementEvent>,
    }

    async fn harness(config: InternalTransferConfig) -> Harness {
        let wallets = Arc::new(MemoryWalletService::new());
        wallets.open_wallet("alice-eur", "EUR", dec!(10000)).await;
        wallets.open_wallet("bob-eur", "EUR", dec!(0)).await;
        wallets.open_wallet("bob-usd", "USD", dec!(0)).await;
        wallets.open_wallet("alice-usd", "USD", dec!(10000)).await;
        wallets.open_wallet("fees-eur", "EUR", dec!(0)).await;

        let rates = RateTable::new(true)
            .with_fiat_rate("USD", dec!(1))
            .with_local_rate("USD", dec!(1))
            .with_fiat_rate("EUR", dec!(1.25))
            .with_local_rate("EUR", dec!(0.8));
        let bridge = Arc::new(CryptoRailsBridge::with_rates(&CryptoRailsConfig::default(), rates));
        let (publisher, events) = ChannelPublisher::new(64);
        let (engine, jobs) = InternalTransferEngine::new(
            Arc::new(MemoryTransferStore::new()),
            wallets.clone(),
            bridge,
            Arc::new(publisher),
            config,
        );
        Harness {
            engine,
            wallets,
            jobs,
            events,
        }
    }

    fn with_fee_wallet() -> InternalTransferConfig {
        let mut config = InternalTransferConfig::default();
        config
            .fee_wallets
            .insert(Currency::new("EUR"), WalletId::new("fees-eur"));
        config
    }

    async fn balance(wallets: &MemoryWalletService, wallet: &str) -> Decimal {
        wallets.get_balance(&WalletId::new(wallet)).await.unwrap().balance
    }

    #[tokio::test]
    async fn test_direct_transfer_charges_fee() {
        let h = harness(with_fee_wallet()).await;
        let t = h
            .engine
            .create_transfer(CreateTransferRequest::new("d-1", ("alice-eur", 1), ("bob-eur", 2), dec!(1000)))
            .await
            .unwrap();

        assert_eq!(t.kind, TransferKind::Direct);
        assert_eq!(t.status, TransferStatus::Completed);
        assert_eq!(t.transfer_fee, dec!(1.00));
        assert_eq!(t.recipient_amount, Some(dec!(999.00)));
        assert_eq!(t.sender_amount - t.transfer_fee, t.recipient_amount.unwrap());

        assert_eq!(balance(&h.wallets, "alice-eur").await, dec!(9000));
        assert_eq!(balance(&h.wallets, "bob-eur").await, dec!(999));
        assert_eq!(balance(&h.wallets, "fees-eur").await, dec!(1));

        let signed: Decimal = h
            .wallets
            .entries_for(&ReferenceId::new("d-1"))
            .await
            .iter()
            .map(|e| e.amount)
            .sum();
        assert_eq!(signed, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_direct_credit_failure_refunds_sender() {
        let mut h = harness(with_fee_wallet()).await;
        h.wallets.set_fail_credit(&WalletId::new("bob-eur"), true).await;

        let err = h
            .engine
            .create_transfer(CreateTransferRequest::new("d-2", ("alice-eur", 1), ("bob-eur", 2), dec!(500)))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Refunded { .. }));

        assert_eq!(balance(&h.wallets, "alice-eur").await, dec!(10000));
        assert_eq!(balance(&h.wallets, "fees-eur").await, dec!(0));

        let stored = h.engine.get_by_reference(&ReferenceId::new("d-2")).await.unwrap();
        assert_eq!(stored.status, TransferStatus::Failed);
        assert!(stored.recipient_amount.is_none());

        let refund = h.wallets.entries_for(&ReferenceId::new("d-2_refund")).await;
        assert_eq!(refund.len(), 2);

        let event = h.events.recv().await.unwrap();
        assert_eq!(event.topic, TOPIC_TRANSFER_FAILED);
    }

    #[tokio::test]
    async fn test_known_reference_returns_existing_without_mutation() {
        let h = harness(InternalTransferConfig::default()).await;
        let request = CreateTransferRequest::new("d-3", ("alice-eur", 1), ("bob-eur", 2), dec!(100));

        let first = h.engine.create_transfer(request.clone()).await.unwrap();
        let debits = h.wallets.debit_count();
        let second = h.engine.create_transfer(request).await.unwrap();

        assert_eq!(first.transfer_id, second.transfer_id);
        assert_eq!(h.wallets.debit_count(), debits);
        assert_eq!(balance(&h.wallets, "alice-eur").await, dec!(9900));
    }

    #[tokio::test]
    async fn test_validation_happens_before_mutation() {
        let h = harness(InternalTransferConfig::default()).await;

        let zero = CreateTransferRequest::new("v-1", ("alice-eur", 1), ("bob-eur", 2), dec!(0));
        assert_eq!(h.engine.create_transfer(zero).await.unwrap_err(), TransferError::InvalidAmount);

        let same = CreateTransferRequest::new("v-2", ("alice-eur", 1), ("alice-eur", 1), dec!(5));
        assert_eq!(h.engine.create_transfer(same).await.unwrap_err(), TransferError::SameWallet);

        let broke = CreateTransferRequest::new("v-3", ("alice-eur", 1), ("bob-eur", 2), dec!(10001));
        assert!(matches!(
            h.engine.create_transfer(broke).await.unwrap_err(),
            TransferError::InsufficientBalance { .. }
        ));

        let ghost = CreateTransferRequest::new("v-4", ("nobody", 1), ("bob-eur", 2), dec!(5));
        assert!(matches!(
            h.engine.create_transfer(ghost).await.unwrap_err(),
            TransferError::WalletNotFound(_)
        ));

        assert_eq!(h.wallets.debit_count(), 0);
        assert!(h.engine.get_by_reference(&ReferenceId::new("v-3")).await.is_err());
    }

    #[tokio::test]
    async fn test_threshold_boundary_selects_path() {
        let mut h = harness(InternalTransferConfig::default()).await;

        let at = h
            .engine
            .create_transfer(CreateTransferRequest::new("b-1", ("alice-usd", 1), ("bob-eur", 2), dec!(2500)))
            .await
            .unwrap();
        assert_eq!(at.kind, TransferKind::Instant);
        assert_eq!(at.status, TransferStatus::Completed);

        let above = h
            .engine
            .create_transfer(CreateTransferRequest::new("b-2", ("alice-usd", 1), ("bob-eur", 2), dec!(2500.01)))
            .await
            .unwrap();
        assert_eq!(above.kind, TransferKind::Locked);
        assert_eq!(above.status, TransferStatus::Locked);
        assert!(above.recipient_amount.is_none());
        assert!(above.estimated_unlock_at.unwrap() > above.locked_at.unwrap());

        let job = h.jobs.try_recv().unwrap();
        assert_eq!(job.transfer_id, above.transfer_id);

        let sender = h.wallets.get_balance(&WalletId::new("alice-usd")).await.unwrap();
        assert_eq!(sender.balance, dec!(7500));
        assert_eq!(sender.locked, dec!(2500.01));
    }

    #[tokio::test]
    async fn test_instant_transfer_converts() {
        let h = harness(InternalTransferConfig::default()).await;
        let t = h
            .engine
            .create_transfer(CreateTransferRequest::new("i-1", ("alice-usd", 1), ("bob-eur", 2), dec!(100)))
            .await
            .unwrap();

        // 100 USD, 0.5% pool fee, 0.8 EUR per USD
        assert_eq!(t.recipient_amount, Some(dec!(79.60)));
        assert_eq!(t.conversion_fee, dec!(0.40));
        assert_eq!(balance(&h.wallets, "bob-eur").await, dec!(79.60));
        assert_eq!(balance(&h.wallets, "alice-usd").await, dec!(9900));

        let pool = h.engine.bridge().pool_snapshot().await;
        assert_eq!(pool.reserved, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_instant_credit_failure_restores_sender_and_pool() {
        let h = harness(InternalTransferConfig::default()).await;
        h.wallets.set_fail_credit(&WalletId::new("bob-eur"), true).await;
        let pool_before = h.engine.bridge().pool_snapshot().await;

        let err = h
            .engine
            .create_transfer(CreateTransferRequest::new("i-2", ("alice-usd", 1), ("bob-eur", 2), dec!(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Refunded { .. }));
        assert_eq!(balance(&h.wallets, "alice-usd").await, dec!(10000));
        assert_eq!(h.engine.bridge().pool_snapshot().await, pool_before);
    }

    #[tokio::test]
    async fn test_full_queue_fails_and_unlocks() {
        let config = InternalTransferConfig {
            settlement_queue_size: 1,
            ..InternalTransferConfig::default()
        };
        let h = harness(config).await;

        h.engine
            .create_transfer(CreateTransferRequest::new("q-1", ("alice-usd", 1), ("bob-eur", 2), dec!(3000)))
            .await
            .unwrap();
        let err = h
            .engine
            .create_transfer(CreateTransferRequest::new("q-2", ("alice-usd", 1), ("bob-eur", 2), dec!(3000)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");

        let sender = h.wallets.get_balance(&WalletId::new("alice-usd")).await.unwrap();
        assert_eq!(sender.locked, dec!(3000));
        let failed = h.engine.get_by_reference(&ReferenceId::new("q-2")).await.unwrap();
        assert_eq!(failed.status, TransferStatus::Failed);
    }
}
