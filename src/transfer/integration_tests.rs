//! Integration Tests for the locked settlement path
//!
//! Engine, settlement worker and expiry sweeper wired over in-memory stores.
//! The worker is driven one job at a time through `process_next`.

#[cfg(test)]
mod integration_tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::{CryptoRailsConfig, InternalTransferConfig, SweeperConfig};
    use crate::core_types::{ReferenceId, WalletId};
    use crate::crypto_rails::{CryptoRailsBridge, RateTable};
    use crate::events::{
        ChannelPublisher, SettlementEvent, TOPIC_PAYOUT_COMPLETED, TOPIC_PAYOUT_FAILED,
        TOPIC_TRANSFER_COMPLETED, TOPIC_TRANSFER_FAILED,
    };
    use crate::provider::{PaymentMethod, ProviderError, Recipient, SandboxProvider};
    use crate::router::{Zone, ZoneRouter};
    use crate::transfer::engine::InternalTransferEngine;
    use crate::transfer::state::TransferStatus;
    use crate::transfer::store::MemoryTransferStore;
    use crate::transfer::sweeper::{EXPIRED_REASON, ExpirySweeper};
    use crate::transfer::types::{CreateTransferRequest, PayoutInstruction, TransferKind};
    use crate::transfer::worker::SettlementWorker;
    use crate::wallet::{MemoryWalletService, WalletService};
    use tokio::sync::mpsc;

    fn rates() -> RateTable {
        RateTable::new(true)
            .with_fiat_rate("USD", dec!(1))
            .with_local_rate("USD", dec!(1))
            .with_fiat_rate("XOF", dec!(0.0016))
            .with_local_rate("XOF", dec!(625))
    }

    struct TestHarness {
        engine: Arc<InternalTransferEngine>,
        worker: SettlementWorker,
        wallets: Arc<MemoryWalletService>,
        bridge: Arc<CryptoRailsBridge>,
        events: mpsc::Receiver<SettlementEvent>,
    }

    impl TestHarness {
        async fn new(config: InternalTransferConfig) -> Self {
            let wallets = Arc::new(MemoryWalletService::new());
            wallets.open_wallet("sender-usd", "USD", dec!(50000)).await;
            wallets.open_wallet("recipient-xof", "XOF", dec!(0)).await;

            let bridge = Arc::new(CryptoRailsBridge::with_rates(
                &CryptoRailsConfig::default(),
                rates(),
            ));
            let (publisher, events) = ChannelPublisher::new(64);
            let (engine, jobs) = InternalTransferEngine::new(
                Arc::new(MemoryTransferStore::new()),
                wallets.clone(),
                bridge.clone(),
                Arc::new(publisher),
                config,
            );
            let engine = Arc::new(engine);
            let worker = SettlementWorker::new(engine.clone(), jobs);

            Self {
                engine,
                worker,
                wallets,
                bridge,
                events,
            }
        }

        async fn balance(&self, wallet: &str) -> (Decimal, Decimal) {
            let b = self
                .wallets
                .get_balance(&WalletId::new(wallet))
                .await
                .unwrap();
            (b.balance, b.locked)
        }

        async fn topics(&mut self) -> Vec<&'static str> {
            let mut topics = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                topics.push(event.topic);
            }
            topics
        }
    }

    fn large(reference: &str) -> CreateTransferRequest {
        CreateTransferRequest::new(
            reference,
            ("sender-usd", 7),
            ("recipient-xof", 8),
            dec!(4000),
        )
    }

    // ========================================================================
    // Happy Path
    // ========================================================================

    #[tokio::test]
    async fn test_locked_transfer_settles_through_worker() {
        let mut h = TestHarness::new(InternalTransferConfig::default()).await;

        let locked = h.engine.create_transfer(large("lk-1")).await.unwrap();
        assert_eq!(locked.kind, TransferKind::Locked);
        assert_eq!(locked.status, TransferStatus::Locked);
        assert_eq!(h.balance("sender-usd").await, (dec!(50000), dec!(4000)));

        let status = h.worker.process_next().await.unwrap().unwrap();
        assert_eq!(status, TransferStatus::Completed);

        // 4000 USD above the pool threshold: 1% + 1.5 network fee on chain
        let settled = h.engine.get_transfer(locked.transfer_id).await.unwrap();
        assert_eq!(settled.status, TransferStatus::Completed);
        assert_eq!(settled.recipient_amount, Some(dec!(2474063)));
        assert_eq!(h.balance("sender-usd").await, (dec!(46000), dec!(0)));
        assert_eq!(h.balance("recipient-xof").await, (dec!(2474063), dec!(0)));
        assert_eq!(h.topics().await, vec![TOPIC_TRANSFER_COMPLETED]);

        assert!(h.worker.process_next().await.is_none());
    }

    // ========================================================================
    // Failure & Compensation
    // ========================================================================

    #[tokio::test]
    async fn test_conversion_failure_unlocks_without_debit() {
        let mut h = TestHarness::new(InternalTransferConfig::default()).await;
        let locked = h.engine.create_transfer(large("lk-2")).await.unwrap();

        h.bridge.set_rates(RateTable::new(false)).await;
        let status = h.worker.process_next().await.unwrap().unwrap();
        assert_eq!(status, TransferStatus::Failed);

        assert_eq!(h.balance("sender-usd").await, (dec!(50000), dec!(0)));
        assert_eq!(h.wallets.debit_count(), 0);

        let failed = h.engine.get_transfer(locked.transfer_id).await.unwrap();
        assert!(failed.recipient_amount.is_none());
        assert!(failed.failure_reason.unwrap().contains("Rate unavailable"));
        assert_eq!(h.topics().await, vec![TOPIC_TRANSFER_FAILED]);
    }

    #[tokio::test]
    async fn test_credit_failure_after_debit_refunds_sender() {
        let h = TestHarness::new(InternalTransferConfig::default()).await;
        h.wallets
            .set_fail_credit(&WalletId::new("recipient-xof"), true)
            .await;
        let locked = h.engine.create_transfer(large("lk-3")).await.unwrap();

        let mut worker = h.worker;
        let status = worker.process_next().await.unwrap().unwrap();
        assert_eq!(status, TransferStatus::Failed);

        let failed = h.engine.get_transfer(locked.transfer_id).await.unwrap();
        assert_eq!(failed.status, TransferStatus::Failed);

        let sender = h
            .wallets
            .get_balance(&WalletId::new("sender-usd"))
            .await
            .unwrap();
        assert_eq!(sender.balance, dec!(50000));
        assert_eq!(sender.locked, dec!(0));

        let entries = h.wallets.entries_for(&ReferenceId::new("lk-3")).await;
        let signed: Decimal = entries.iter().map(|e| e.amount).sum();
        assert_eq!(signed, Decimal::ZERO);
        assert!(
            entries
                .iter()
                .any(|e| e.reference.as_str() == "lk-3_refund")
        );
    }

    #[tokio::test]
    async fn test_terminal_transfer_is_not_reprocessed() {
        let mut h = TestHarness::new(InternalTransferConfig::default()).await;
        let locked = h.engine.create_transfer(large("lk-4")).await.unwrap();
        h.worker.process_next().await.unwrap().unwrap();

        let again = h
            .worker
            .process(crate::transfer::types::SettlementJob {
                transfer_id: locked.transfer_id,
                payout: None,
            })
            .await
            .unwrap();
        assert_eq!(again, TransferStatus::Completed);
        assert_eq!(h.wallets.debit_count(), 1);
    }

    // ========================================================================
    // Expiry
    // ========================================================================

    fn expiring() -> InternalTransferConfig {
        InternalTransferConfig {
            lock_window_secs: 0,
            ..InternalTransferConfig::default()
        }
    }

    fn sweeper_config() -> SweeperConfig {
        SweeperConfig {
            grace_secs: 0,
            ..SweeperConfig::default()
        }
    }

    #[tokio::test]
    async fn test_sweeper_expires_stale_lock() {
        let mut h = TestHarness::new(expiring()).await;
        let locked = h.engine.create_transfer(large("ex-1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let sweeper = ExpirySweeper::new(h.engine.clone(), &sweeper_config());
        assert_eq!(sweeper.sweep().await.unwrap(), 1);

        let expired = h.engine.get_transfer(locked.transfer_id).await.unwrap();
        assert_eq!(expired.status, TransferStatus::Failed);
        assert_eq!(expired.failure_reason.as_deref(), Some(EXPIRED_REASON));
        assert_eq!(h.balance("sender-usd").await, (dec!(50000), dec!(0)));

        // the queued job now finds a terminal transfer
        let status = h.worker.process_next().await.unwrap().unwrap();
        assert_eq!(status, TransferStatus::Failed);
        assert_eq!(h.wallets.debit_count(), 0);
        assert_eq!(sweeper.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_ignores_unexpired_lock() {
        let h = TestHarness::new(InternalTransferConfig::default()).await;
        h.engine.create_transfer(large("ex-2")).await.unwrap();

        let sweeper = ExpirySweeper::new(h.engine.clone(), &sweeper_config());
        assert_eq!(sweeper.sweep().await.unwrap(), 0);
        assert_eq!(h.balance("sender-usd").await, (dec!(50000), dec!(4000)));
    }

    // ========================================================================
    // Payout after settlement
    // ========================================================================

    async fn payout_router(provider: Arc<SandboxProvider>) -> Arc<ZoneRouter> {
        let router = ZoneRouter::with_priorities(
            Zone::Africa,
            HashMap::from([(Zone::Africa, vec!["WAVE".into()])]),
            Duration::from_secs(1),
        );
        router.register(provider).await;
        Arc::new(router)
    }

    fn instruction() -> PayoutInstruction {
        PayoutInstruction {
            country: "SN".into(),
            method: PaymentMethod::MobileMoney,
            recipient: Recipient::mobile("Awa Ndiaye", "+221770000000"),
            narration: None,
        }
    }

    #[tokio::test]
    async fn test_settled_transfer_pays_out() {
        let h = TestHarness::new(InternalTransferConfig::default()).await;
        let wave = Arc::new(SandboxProvider::new("WAVE", &["SN"], &[PaymentMethod::MobileMoney]));
        let (publisher, mut payout_events) = ChannelPublisher::new(8);
        let mut worker = h
            .worker
            .with_payout_router(payout_router(wave.clone()).await, Arc::new(publisher));

        h.engine
            .create_transfer(large("po-1").with_payout(instruction()))
            .await
            .unwrap();
        worker.process_next().await.unwrap().unwrap();

        assert_eq!(wave.payout_count(), 1);
        let recipient = h
            .wallets
            .get_balance(&WalletId::new("recipient-xof"))
            .await
            .unwrap();
        assert_eq!(recipient.balance, Decimal::ZERO);
        assert_eq!(payout_events.recv().await.unwrap().topic, TOPIC_PAYOUT_COMPLETED);
    }

    #[tokio::test]
    async fn test_failed_payout_is_reversed_into_recipient_wallet() {
        let h = TestHarness::new(InternalTransferConfig::default()).await;
        let wave = Arc::new(SandboxProvider::new("WAVE", &["SN"], &[PaymentMethod::MobileMoney]));
        wave.set_payout_failure(Some(ProviderError::Unavailable("503".into())));
        let (publisher, mut payout_events) = ChannelPublisher::new(8);
        let mut worker = h
            .worker
            .with_payout_router(payout_router(wave).await, Arc::new(publisher));

        let locked = h
            .engine
            .create_transfer(large("po-2").with_payout(instruction()))
            .await
            .unwrap();
        let status = worker.process_next().await.unwrap().unwrap();
        assert_eq!(status, TransferStatus::Completed);

        let settled = h.engine.get_transfer(locked.transfer_id).await.unwrap();
        let recipient = h
            .wallets
            .get_balance(&WalletId::new("recipient-xof"))
            .await
            .unwrap();
        assert_eq!(Some(recipient.balance), settled.recipient_amount);
        assert_eq!(payout_events.recv().await.unwrap().topic, TOPIC_PAYOUT_FAILED);
    }
}
