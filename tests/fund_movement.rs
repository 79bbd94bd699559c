//! End-to-end fund movement over the shipped dev configuration
//!
//! Every component is built from `config/dev.yaml` with in-memory stores and
//! sandbox rails, the same way the binary wires them without a database.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use fundrail::config::AppConfig;
use fundrail::core_types::{CountryCode, Currency, ProviderCode, ReferenceId, WalletId};
use fundrail::crypto_rails::CryptoRailsBridge;
use fundrail::events::LogPublisher;
use fundrail::instance::{AggregatorInstance, InstanceStore, MemoryInstanceStore};
use fundrail::ledger::{
    DepositSettlement, FundLedger, LedgerStore, MemoryLedgerStore, WithdrawalOutcome,
    WithdrawalStaging,
};
use fundrail::orchestrator::{CrossBorderRequest, TransferOrchestrator};
use fundrail::provider::{
    PaymentMethod, PaymentStatus, PayoutRequest, ProviderError, Recipient, SandboxProvider,
};
use fundrail::router::ZoneRouter;
use fundrail::transfer::{
    CreateTransferRequest, InternalTransferEngine, MemoryTransferStore, TransferKind,
    TransferStatus,
};
use fundrail::wallet::{MemoryWalletService, WalletService};

fn dev_config() -> AppConfig {
    AppConfig::from_yaml(include_str!("../config/dev.yaml")).expect("dev config must parse")
}

/// Router with every configured sandbox rail, keyed by provider code
async fn dev_router(config: &AppConfig) -> (Arc<ZoneRouter>, HashMap<String, Arc<SandboxProvider>>) {
    let router = Arc::new(ZoneRouter::new(&config.router));
    let mut providers = HashMap::new();
    for provider_config in &config.sandbox_providers {
        let provider = Arc::new(SandboxProvider::from_config(provider_config));
        router.register(provider.clone()).await;
        providers.insert(provider_config.code.as_str().to_string(), provider);
    }
    (router, providers)
}

async fn balance(wallets: &MemoryWalletService, wallet: &str) -> Decimal {
    wallets
        .get_balance(&WalletId::new(wallet))
        .await
        .unwrap()
        .balance
}

fn senegal_payout(reference: &str, amount: Decimal) -> PayoutRequest {
    PayoutRequest {
        reference: ReferenceId::new(reference),
        amount,
        currency: Currency::new("XOF"),
        country: CountryCode::new("SN"),
        method: PaymentMethod::MobileMoney,
        recipient: Recipient::mobile("Fatou Diop", "+221771234567"),
        narration: Some("family support".to_string()),
    }
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_dev_priorities_fail_over_from_wave_to_cinetpay() {
    let config = dev_config();
    let (router, providers) = dev_router(&config).await;
    providers["WAVE"].set_payout_failure(Some(ProviderError::Unavailable("503".into())));

    let routed = router
        .create_payout(&senegal_payout("e2e-route-1", dec!(25000)))
        .await
        .unwrap();

    assert_eq!(routed.attempts, 2);
    assert_eq!(routed.response.provider, Some(ProviderCode::new("CINETPAY")));
    assert_eq!(providers["FLUTTERWAVE"].payout_count(), 0);
}

#[tokio::test]
async fn test_rails_without_country_coverage_are_skipped() {
    let config = dev_config();
    let (router, _providers) = dev_router(&config).await;

    let mut request = senegal_payout("e2e-route-2", dec!(10000));
    request.country = CountryCode::new("NG");
    request.currency = Currency::new("NGN");

    let routed = router.create_payout(&request).await.unwrap();
    assert_eq!(routed.response.provider, Some(ProviderCode::new("FLUTTERWAVE")));
}

// ============================================================================
// Internal Transfers
// ============================================================================

#[tokio::test]
async fn test_direct_transfer_conserves_funds_with_platform_fee() {
    let config = dev_config();
    let wallets = Arc::new(MemoryWalletService::new());
    wallets.open_wallet("amina-xof", "XOF", dec!(100000)).await;
    wallets.open_wallet("moussa-xof", "XOF", dec!(0)).await;
    wallets.open_wallet("platform-fees-xof", "XOF", dec!(0)).await;

    let (engine, _jobs) = InternalTransferEngine::new(
        Arc::new(MemoryTransferStore::new()),
        wallets.clone(),
        Arc::new(CryptoRailsBridge::new(&config.crypto_rails)),
        Arc::new(LogPublisher),
        config.internal_transfer.clone(),
    );

    let transfer = engine
        .create_transfer(CreateTransferRequest::new(
            "e2e-direct-1",
            ("amina-xof", 1),
            ("moussa-xof", 2),
            dec!(50000),
        ))
        .await
        .unwrap();

    assert_eq!(transfer.kind, TransferKind::Direct);
    assert_eq!(transfer.status, TransferStatus::Completed);
    assert_eq!(transfer.transfer_fee, dec!(50));
    assert_eq!(balance(&wallets, "amina-xof").await, dec!(50000));
    assert_eq!(balance(&wallets, "moussa-xof").await, dec!(49950));
    assert_eq!(balance(&wallets, "platform-fees-xof").await, dec!(50));

    let total = balance(&wallets, "amina-xof").await
        + balance(&wallets, "moussa-xof").await
        + balance(&wallets, "platform-fees-xof").await;
    assert_eq!(total, dec!(100000));
}

#[tokio::test]
async fn test_small_cross_currency_transfer_settles_instantly() {
    let config = dev_config();
    let wallets = Arc::new(MemoryWalletService::new());
    wallets.open_wallet("chloe-eur", "EUR", dec!(1000)).await;
    wallets.open_wallet("ibrahima-xof", "XOF", dec!(0)).await;

    let (engine, mut jobs) = InternalTransferEngine::new(
        Arc::new(MemoryTransferStore::new()),
        wallets.clone(),
        Arc::new(CryptoRailsBridge::new(&config.crypto_rails)),
        Arc::new(LogPublisher),
        config.internal_transfer.clone(),
    );

    let transfer = engine
        .create_transfer(CreateTransferRequest::new(
            "e2e-instant-1",
            ("chloe-eur", 3),
            ("ibrahima-xof", 4),
            dec!(200),
        ))
        .await
        .unwrap();

    assert_eq!(transfer.kind, TransferKind::Instant);
    assert_eq!(transfer.status, TransferStatus::Completed);
    let credited = transfer.recipient_amount.unwrap();
    assert!(credited > Decimal::ZERO);
    assert_eq!(balance(&wallets, "chloe-eur").await, dec!(800));
    assert_eq!(balance(&wallets, "ibrahima-xof").await, credited);
    assert!(jobs.try_recv().is_err(), "instant path never queues work");
}

// ============================================================================
// Cross-Border Orchestration
// ============================================================================

#[tokio::test]
async fn test_cross_border_quote_fees_add_up() {
    let config = dev_config();
    let (router, _providers) = dev_router(&config).await;
    let orchestrator = TransferOrchestrator::new(
        router,
        Arc::new(CryptoRailsBridge::new(&config.crypto_rails)),
        Arc::new(MemoryWalletService::new()),
        Arc::new(LogPublisher),
        config.orchestrator.clone(),
    );

    let quote = orchestrator
        .get_quote(&CrossBorderRequest {
            reference: ReferenceId::new("e2e-quote-1"),
            amount: dec!(100),
            source_currency: Currency::new("EUR"),
            target_currency: Currency::new("XOF"),
            country: CountryCode::new("SN"),
            method: PaymentMethod::MobileMoney,
            recipient: Recipient::mobile("Awa Ndiaye", "+221770000000"),
            narration: None,
        })
        .await
        .unwrap();

    assert_eq!(quote.provider, ProviderCode::new("WAVE"));
    assert_eq!(quote.total_fee, quote.conversion_fee + quote.payout_fee);
    assert_eq!(quote.recipient_amount, quote.converted_amount - quote.payout_fee);
    assert!(quote.estimated_seconds > config.orchestrator.payout_buffer_secs);
}

#[tokio::test]
async fn test_cross_border_transfer_pays_out_through_router() {
    let config = dev_config();
    let (router, providers) = dev_router(&config).await;
    providers["WAVE"].set_payout_failure(Some(ProviderError::Timeout { after_ms: 30_000 }));
    let orchestrator = TransferOrchestrator::new(
        router,
        Arc::new(CryptoRailsBridge::new(&config.crypto_rails)),
        Arc::new(MemoryWalletService::new()),
        Arc::new(LogPublisher),
        config.orchestrator.clone(),
    );

    let outcome = orchestrator
        .execute_transfer(&CrossBorderRequest {
            reference: ReferenceId::new("e2e-xborder-1"),
            amount: dec!(150),
            source_currency: Currency::new("USD"),
            target_currency: Currency::new("XOF"),
            country: CountryCode::new("SN"),
            method: PaymentMethod::MobileMoney,
            recipient: Recipient::mobile("Awa Ndiaye", "+221770000000"),
            narration: None,
        })
        .await
        .unwrap();

    assert_ne!(outcome.status, PaymentStatus::Failed);
    let payout = outcome.payout.unwrap();
    assert_eq!(payout.attempts, 2);
    assert_eq!(payout.response.provider, Some(ProviderCode::new("CINETPAY")));
    assert!(outcome.reversal_reference.is_none());
}

// ============================================================================
// Ledger
// ============================================================================

#[tokio::test]
async fn test_ledger_history_is_zero_sum_per_transaction() {
    let config = dev_config();
    let xof = Currency::new("XOF");
    let instances = Arc::new(MemoryInstanceStore::new());
    let store = Arc::new(MemoryLedgerStore::with_instances(instances.clone()));
    store.open_account(&"hot-wave-sn".into(), &xof, dec!(500000)).await.unwrap();
    store.open_account(&"user-42".into(), &xof, dec!(0)).await.unwrap();
    store.open_account(&config.ledger.cold_wallet, &xof, dec!(10000000)).await.unwrap();
    instances
        .upsert(AggregatorInstance::new("wave-sn-1", "WAVE", "hot-wave-sn", 1))
        .await
        .unwrap();

    let ledger = FundLedger::new(
        store.clone(),
        instances.clone(),
        Arc::new(LogPublisher),
        config.ledger.clone(),
    );

    ledger
        .settle_deposit(DepositSettlement {
            reference: "e2e-dep-1".into(),
            user_id: 42,
            user_wallet: "user-42".into(),
            instance_id: "wave-sn-1".into(),
            amount: dec!(30000),
            currency: xof.clone(),
        })
        .await
        .unwrap();
    ledger
        .stage_withdrawal(WithdrawalStaging {
            reference: "e2e-wd-1".into(),
            user_id: 42,
            user_wallet: "user-42".into(),
            instance_id: "wave-sn-1".into(),
            amount: dec!(12000),
            currency: xof.clone(),
        })
        .await
        .unwrap();
    ledger
        .confirm_withdrawal(
            &"e2e-wd-1".into(),
            WithdrawalOutcome::Failed {
                reason: "recipient unreachable".into(),
            },
        )
        .await
        .unwrap();

    let movements = store.all_movements().await;
    let mut per_transaction: HashMap<_, Decimal> = HashMap::new();
    for m in &movements {
        *per_transaction.entry(m.transaction_id).or_default() += m.signed_amount();
    }
    assert!(per_transaction.len() >= 3);
    assert!(per_transaction.values().all(|sum| sum.is_zero()));

    assert_eq!(store.balance(&"user-42".into()).await.unwrap(), dec!(30000));
}
