//! Expiry Sweeper
//!
//! Background task that fails LOCKED / PROCESSING transfers whose estimated
//! unlock time plus a grace period has passed.
//!
//! The sweeper releases the sender lock *before* touching the status. A
//! missing lock means the settlement worker already unlocked the funds and
//! owns the transfer, so the sweeper leaves it alone.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::engine::InternalTransferEngine;
use super::error::TransferError;
use crate::config::SweeperConfig;
use crate::wallet::WalletError;

pub const EXPIRED_REASON: &str = "expired";

pub struct ExpirySweeper {
    engine: Arc<InternalTransferEngine>,
    scan_interval: Duration,
    grace: Duration,
    batch_size: usize,
}

impl ExpirySweeper {
    pub fn new(engine: Arc<InternalTransferEngine>, config: &SweeperConfig) -> Self {
        Self {
            engine,
            scan_interval: Duration::from_secs(config.scan_interval_secs),
            grace: Duration::from_secs(config.grace_secs),
            batch_size: config.batch_size,
        }
    }

    /// Run forever, sweeping every `scan_interval`
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.scan_interval.as_secs(),
            grace_secs = self.grace.as_secs(),
            "Starting expiry sweeper"
        );

        loop {
            if let Err(e) = self.sweep().await {
                error!(error = %e, "Expiry sweep failed");
            }
            tokio::time::sleep(self.scan_interval).await;
        }
    }

    /// Run a single sweep; returns how many transfers were expired
    pub async fn sweep(&self) -> Result<usize, TransferError> {
        let grace = chrono::Duration::from_std(self.grace)
            .map_err(|e| TransferError::SystemError(e.to_string()))?;
        let cutoff = Utc::now() - grace;

        let expired = self
            .engine
            .store()
            .find_expired(cutoff, self.batch_size)
            .await?;
        if expired.is_empty() {
            debug!("No expired transfers found");
            return Ok(0);
        }

        let wallets = self.engine.wallets();
        let mut swept = 0;
        for transfer in expired {
            match wallets
                .unlock_funds(&transfer.sender_wallet, &transfer.reference)
                .await
            {
                Ok(amount) => {
                    info!(
                        reference = %transfer.reference,
                        status = %transfer.status,
                        amount = %amount,
                        "Expired transfer unlocked"
                    );
                }
                Err(WalletError::LockNotFound { .. }) => {
                    debug!(reference = %transfer.reference, "Lock already released, worker owns transfer");
                    continue;
                }
                Err(e) => {
                    warn!(reference = %transfer.reference, error = %e, "Unlock of expired transfer failed");
                    continue;
                }
            }

            self.engine
                .mark_failed(&transfer, transfer.status, EXPIRED_REASON)
                .await;
            swept += 1;
        }

        if swept > 0 {
            info!(count = swept, "Expired transfers this sweep");
        }
        Ok(swept)
    }
}
