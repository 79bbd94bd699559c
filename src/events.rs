//! Settlement events
//!
//! Fire-and-forget publication of settled transfers for notification and
//! compliance consumers. Publishing never fails the caller: transport errors
//! are logged and dropped.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core_types::{Currency, ReferenceId};

pub const TOPIC_TRANSFER_COMPLETED: &str = "transfer.completed";
pub const TOPIC_TRANSFER_FAILED: &str = "transfer.failed";
pub const TOPIC_PAYOUT_COMPLETED: &str = "payout.completed";
pub const TOPIC_PAYOUT_FAILED: &str = "payout.failed";
pub const TOPIC_DEPOSIT_SETTLED: &str = "deposit.settled";
pub const TOPIC_WITHDRAWAL_COMPLETED: &str = "withdrawal.completed";
pub const TOPIC_WITHDRAWAL_FAILED: &str = "withdrawal.failed";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementEvent {
    pub topic: &'static str,
    pub reference: ReferenceId,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: String,
    pub detail: Option<String>,
    pub timestamp: i64,
}

impl SettlementEvent {
    pub fn new(
        topic: &'static str,
        reference: ReferenceId,
        amount: Decimal,
        currency: Currency,
        status: impl Into<String>,
    ) -> Self {
        Self {
            topic,
            reference,
            amount,
            currency,
            status: status.into(),
            detail: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: SettlementEvent);
}

/// Publishes to the tracing log only
#[derive(Debug, Default, Clone)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: SettlementEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => debug!(topic = event.topic, payload = %payload, "Event published"),
            Err(e) => warn!(topic = event.topic, error = %e, "Event serialization failed"),
        }
    }
}

/// Forwards events into an mpsc channel (bridge to a queue transport)
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<SettlementEvent>,
}

impl ChannelPublisher {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<SettlementEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, event: SettlementEvent) {
        let topic = event.topic;
        if let Err(e) = self.tx.try_send(event) {
            warn!(topic = topic, error = %e, "Event dropped");
        }
    }
}
