//! Fundrail service entry point
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌───────────────┐    ┌─────────────┐
//! │  Config  │───▶│ Stores (PG / │───▶│ Engine+Worker │───▶│ Zone Router │
//! │  (YAML)  │    │   memory)    │    │   +Sweeper    │    │  (payouts)  │
//! └──────────┘    └──────────────┘    └───────────────┘    └─────────────┘
//! ```
//!
//! Without `database.url` every store is in-memory and the platform wallets
//! are opened empty, which is enough for local runs against sandbox rails.

use std::sync::Arc;

use anyhow::Context;
use rust_decimal::Decimal;
use tracing::{info, warn};

use fundrail::config::AppConfig;
use fundrail::crypto_rails::CryptoRailsBridge;
use fundrail::db::{Database, schema};
use fundrail::events::{EventPublisher, LogPublisher};
use fundrail::logging::init_logging;
use fundrail::provider::SandboxProvider;
use fundrail::router::{CollectionRouter, ZoneRouter};
use fundrail::transfer::{
    ExpirySweeper, InternalTransferEngine, MemoryTransferStore, PgTransferStore, SettlementWorker,
    TransferStore,
};
use fundrail::wallet::{MemoryWalletService, PgWalletService, WalletService};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

struct Stores {
    wallets: Arc<dyn WalletService>,
    transfers: Arc<dyn TransferStore>,
}

async fn postgres_stores(url: &str, config: &AppConfig) -> anyhow::Result<Stores> {
    let db = Database::connect_with(url, &config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.health_check()
        .await
        .context("PostgreSQL health check failed")?;
    schema::init_schema(db.pool())
        .await
        .context("Failed to initialize schema")?;

    let pool = db.pool().clone();
    Ok(Stores {
        wallets: Arc::new(PgWalletService::new(pool.clone())),
        transfers: Arc::new(PgTransferStore::new(pool)),
    })
}

async fn memory_stores(config: &AppConfig) -> Stores {
    let wallets = MemoryWalletService::new();
    for (currency, wallet) in &config.internal_transfer.fee_wallets {
        wallets
            .open_wallet(wallet.clone(), currency.as_str(), Decimal::ZERO)
            .await;
    }
    wallets
        .open_wallet(
            config.orchestrator.holding_wallet.clone(),
            config.crypto_rails.stablecoin.as_str(),
            Decimal::ZERO,
        )
        .await;

    Stores {
        wallets: Arc::new(wallets),
        transfers: Arc::new(MemoryTransferStore::new()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env).context("Failed to load config")?;
    let _log_guard = init_logging(&app_config);

    info!(
        env = %env,
        git_hash = env!("GIT_HASH"),
        "Starting fundrail"
    );

    let stores = match &app_config.database.url {
        Some(url) => postgres_stores(url, &app_config).await?,
        None => {
            warn!("No database.url configured, running with in-memory stores");
            memory_stores(&app_config).await
        }
    };

    let events: Arc<dyn EventPublisher> = Arc::new(LogPublisher);

    let payout_router = Arc::new(ZoneRouter::new(&app_config.router));
    let collection_router = Arc::new(CollectionRouter::new(&app_config.router));
    for provider_config in &app_config.sandbox_providers {
        let provider = Arc::new(SandboxProvider::from_config(provider_config));
        payout_router.register(provider.clone()).await;
        collection_router.register(provider).await;
    }
    info!(
        providers = app_config.sandbox_providers.len(),
        fallback_zone = ?app_config.router.fallback_zone,
        "Routers ready"
    );

    let bridge = Arc::new(CryptoRailsBridge::new(&app_config.crypto_rails));

    let (engine, jobs) = InternalTransferEngine::new(
        stores.transfers.clone(),
        stores.wallets.clone(),
        bridge.clone(),
        events.clone(),
        app_config.internal_transfer.clone(),
    );
    let engine = Arc::new(engine);

    let worker = SettlementWorker::new(engine.clone(), jobs)
        .with_payout_router(payout_router.clone(), events.clone());
    tokio::spawn(worker.run());

    let sweeper = ExpirySweeper::new(engine.clone(), &app_config.sweeper);
    tokio::spawn(async move {
        sweeper.run().await;
    });

    info!("Fundrail ready, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    Ok(())
}
