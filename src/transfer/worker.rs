//! Settlement Worker
//!
//! Drains the settlement queue for LOCKED transfers. Each job runs strictly
//! in order: PROCESSING → convert → unlock → debit → credit → COMPLETED.
//! A conversion failure unlocks the sender without a debit; a failure after
//! the debit refunds the sender under `<reference>_refund`.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::engine::{InternalTransferEngine, conversion_request};
use super::error::TransferError;
use super::state::TransferStatus;
use super::types::{InternalTransfer, PayoutInstruction, SettlementJob};
use crate::events::{EventPublisher, SettlementEvent, TOPIC_PAYOUT_COMPLETED, TOPIC_PAYOUT_FAILED};
use crate::provider::PayoutRequest;
use crate::router::ZoneRouter;

pub struct SettlementWorker {
    engine: Arc<InternalTransferEngine>,
    jobs: mpsc::Receiver<SettlementJob>,
    payout_router: Option<Arc<ZoneRouter>>,
    events: Option<Arc<dyn EventPublisher>>,
}

impl SettlementWorker {
    pub fn new(engine: Arc<InternalTransferEngine>, jobs: mpsc::Receiver<SettlementJob>) -> Self {
        Self {
            engine,
            jobs,
            payout_router: None,
            events: None,
        }
    }

    /// Enable the external payout leg for jobs that carry a payout instruction
    pub fn with_payout_router(
        mut self,
        router: Arc<ZoneRouter>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        self.payout_router = Some(router);
        self.events = Some(events);
        self
    }

    /// Process jobs until every sender handle is dropped
    pub async fn run(mut self) {
        info!("Starting settlement worker");
        while let Some(job) = self.jobs.recv().await {
            let transfer_id = job.transfer_id;
            if let Err(e) = self.process(job).await {
                error!(transfer_id = %transfer_id, error = %e, "Settlement job failed");
            }
        }
        info!("Settlement queue closed, worker stopping");
    }

    /// Take and process the next queued job, if any (test driver)
    pub async fn process_next(&mut self) -> Option<Result<TransferStatus, TransferError>> {
        let job = self.jobs.try_recv().ok()?;
        Some(self.process(job).await)
    }

    pub async fn process(&self, job: SettlementJob) -> Result<TransferStatus, TransferError> {
        let transfer = self.engine.get_transfer(job.transfer_id).await?;
        if transfer.status != TransferStatus::Locked {
            debug!(
                transfer_id = %transfer.transfer_id,
                status = %transfer.status,
                "Transfer no longer locked, skipping"
            );
            return Ok(transfer.status);
        }

        let processing = transfer.with_status(TransferStatus::Processing);
        if !self
            .engine
            .store()
            .update_if(&processing, TransferStatus::Locked)
            .await?
        {
            debug!(transfer_id = %transfer.transfer_id, "Lost race for transfer, skipping");
            return Ok(self.engine.get_transfer(job.transfer_id).await?.status);
        }

        match self.settle(processing).await {
            Ok(completed) => {
                if let Some(instruction) = job.payout {
                    self.pay_out(&completed, instruction).await;
                }
                Ok(TransferStatus::Completed)
            }
            Err(e) => {
                warn!(transfer_id = %job.transfer_id, error = %e, "Locked transfer failed");
                Ok(TransferStatus::Failed)
            }
        }
    }

    async fn settle(&self, transfer: InternalTransfer) -> Result<InternalTransfer, TransferError> {
        let from = TransferStatus::Processing;
        let wallets = self.engine.wallets();

        let conversion = match self
            .engine
            .bridge()
            .convert_via_stablecoin(&conversion_request(&transfer))
            .await
        {
            Ok(conversion) => conversion,
            Err(e) => {
                if let Err(unlock) = wallets
                    .unlock_funds(&transfer.sender_wallet, &transfer.reference)
                    .await
                {
                    error!(reference = %transfer.reference, error = %unlock, "Unlock after conversion failure failed");
                }
                self.engine
                    .mark_failed(&transfer, from, &e.to_string())
                    .await;
                return Err(e.into());
            }
        };

        // The sweeper may have expired the lock while we were converting
        if let Err(e) = wallets
            .unlock_funds(&transfer.sender_wallet, &transfer.reference)
            .await
        {
            self.engine.release_conversion(&conversion).await;
            self.engine
                .mark_failed(&transfer, from, &e.to_string())
                .await;
            return Err(e.into());
        }

        self.engine
            .settle_converted(transfer, from, conversion)
            .await
    }

    /// Move the settled amount out of the recipient wallet and through the router
    ///
    /// A payout failure credits the amount back under `<reference>_reversal`;
    /// the transfer itself stays COMPLETED.
    async fn pay_out(&self, transfer: &InternalTransfer, instruction: PayoutInstruction) {
        let (Some(router), Some(events)) = (&self.payout_router, &self.events) else {
            warn!(reference = %transfer.reference, "Payout requested but no payout router configured");
            return;
        };
        let Some(amount) = transfer.recipient_amount else {
            return;
        };

        let wallets = self.engine.wallets();
        let payout_ref = transfer.reference.payout();
        if let Err(e) = wallets
            .debit_wallet(&transfer.recipient_wallet, amount, &payout_ref)
            .await
        {
            error!(reference = %payout_ref, error = %e, "Payout debit failed");
            return;
        }

        let request = PayoutRequest {
            reference: payout_ref.clone(),
            amount,
            currency: transfer.recipient_currency.clone(),
            country: instruction.country,
            method: instruction.method,
            recipient: instruction.recipient,
            narration: instruction.narration,
        };

        match router.create_payout(&request).await {
            Ok(routed) => {
                info!(
                    reference = %payout_ref,
                    provider = ?routed.response.provider,
                    attempts = routed.attempts,
                    "Settled transfer paid out"
                );
                events
                    .publish(SettlementEvent::new(
                        TOPIC_PAYOUT_COMPLETED,
                        payout_ref,
                        amount,
                        request.currency,
                        routed.response.status.as_str(),
                    ))
                    .await;
            }
            Err(e) => {
                let reversal = transfer.reference.reversal();
                if let Err(credit) = wallets
                    .credit_wallet(&transfer.recipient_wallet, amount, &reversal)
                    .await
                {
                    error!(
                        reference = %reversal,
                        error = %credit,
                        "CRITICAL: payout reversal failed, manual reconciliation required"
                    );
                }
                warn!(reference = %payout_ref, error = %e, "Payout after settlement failed");
                events
                    .publish(
                        SettlementEvent::new(
                            TOPIC_PAYOUT_FAILED,
                            payout_ref,
                            amount,
                            request.currency,
                            "failed",
                        )
                        .with_detail(e.to_string()),
                    )
                    .await;
            }
        }
    }
}
