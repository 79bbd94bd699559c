//! Sandbox Rail
//!
//! A configurable in-process provider implementing both capabilities. Used for
//! local runs (registered from `config/<env>.yaml`) and as the test double for
//! router, orchestrator and ledger tests. Failure modes can be switched at
//! runtime; every capability call is counted.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use super::error::ProviderError;
use super::types::{
    Bank, CollectionRequest, CollectionResponse, FeeSchedule, MobileOperator, PaymentMethod,
    PaymentStatus, PayoutQuote, PayoutRequest, PayoutResponse, ProviderInfo,
};
use super::{CollectionProvider, PayoutProvider};
use crate::config::SandboxProviderConfig;
use crate::core_types::{CountryCode, ProviderCode, ReferenceId};
use crate::money::round_for;

/// Switchable behavior of a sandbox rail
#[derive(Debug, Clone)]
pub struct SandboxBehavior {
    /// Returned by `create_payout` instead of succeeding
    pub payout_failure: Option<ProviderError>,
    /// Returned by `get_quote` instead of succeeding
    pub quote_failure: Option<ProviderError>,
    /// Returned by `initiate_collection` instead of succeeding
    pub collection_failure: Option<ProviderError>,
    /// Reason used to reject every recipient
    pub reject_recipient: Option<String>,
    /// Status reported for created payouts and verified collections
    pub settled_status: PaymentStatus,
    /// Simulated network latency per call
    pub latency: Duration,
    pub estimated_seconds: u64,
}

impl Default for SandboxBehavior {
    fn default() -> Self {
        Self {
            payout_failure: None,
            quote_failure: None,
            collection_failure: None,
            reject_recipient: None,
            settled_status: PaymentStatus::Completed,
            latency: Duration::ZERO,
            estimated_seconds: 60,
        }
    }
}

pub struct SandboxProvider {
    info: ProviderInfo,
    banks: Vec<Bank>,
    operators: Vec<MobileOperator>,
    behavior: Mutex<SandboxBehavior>,
    payouts: Mutex<HashMap<String, PayoutResponse>>,
    payout_refs: Mutex<HashMap<ReferenceId, String>>,
    collections: Mutex<HashMap<String, CollectionResponse>>,
    validate_calls: AtomicUsize,
    quote_calls: AtomicUsize,
    payout_calls: AtomicUsize,
    collection_calls: AtomicUsize,
}

impl SandboxProvider {
    pub fn new(code: &str, countries: &[&str], methods: &[PaymentMethod]) -> Self {
        let info = ProviderInfo {
            code: ProviderCode::new(code),
            display_name: code.to_string(),
            countries: countries.iter().map(CountryCode::new).collect(),
            methods: methods.iter().copied().collect(),
            fees: FeeSchedule::default(),
        };
        Self::from_info(info)
    }

    pub fn from_info(info: ProviderInfo) -> Self {
        Self {
            info,
            banks: Vec::new(),
            operators: Vec::new(),
            behavior: Mutex::new(SandboxBehavior::default()),
            payouts: Mutex::new(HashMap::new()),
            payout_refs: Mutex::new(HashMap::new()),
            collections: Mutex::new(HashMap::new()),
            validate_calls: AtomicUsize::new(0),
            quote_calls: AtomicUsize::new(0),
            payout_calls: AtomicUsize::new(0),
            collection_calls: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &SandboxProviderConfig) -> Self {
        let info = ProviderInfo {
            code: config.code.clone(),
            display_name: config
                .display_name
                .clone()
                .unwrap_or_else(|| config.code.to_string()),
            countries: config.countries.iter().cloned().collect::<BTreeSet<_>>(),
            methods: config.methods.iter().copied().collect(),
            fees: config.fees,
        };
        let provider = Self::from_info(info);
        provider.update_behavior(|b| b.estimated_seconds = config.estimated_seconds);
        provider
    }

    pub fn with_fees(mut self, fees: FeeSchedule) -> Self {
        self.info.fees = fees;
        self
    }

    pub fn with_display_name(mut self, name: &str) -> Self {
        self.info.display_name = name.to_string();
        self
    }

    pub fn with_banks(mut self, banks: Vec<Bank>) -> Self {
        self.banks = banks;
        self
    }

    pub fn with_operators(mut self, operators: Vec<MobileOperator>) -> Self {
        self.operators = operators;
        self
    }

    pub fn update_behavior(&self, f: impl FnOnce(&mut SandboxBehavior)) {
        let mut behavior = self.behavior.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut behavior);
    }

    pub fn set_payout_failure(&self, failure: Option<ProviderError>) {
        self.update_behavior(|b| b.payout_failure = failure);
    }

    pub fn set_quote_failure(&self, failure: Option<ProviderError>) {
        self.update_behavior(|b| b.quote_failure = failure);
    }

    pub fn set_collection_failure(&self, failure: Option<ProviderError>) {
        self.update_behavior(|b| b.collection_failure = failure);
    }

    pub fn set_reject_recipient(&self, reason: Option<&str>) {
        self.update_behavior(|b| b.reject_recipient = reason.map(str::to_string));
    }

    pub fn set_settled_status(&self, status: PaymentStatus) {
        self.update_behavior(|b| b.settled_status = status);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.update_behavior(|b| b.latency = latency);
    }

    pub fn validate_count(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn quote_count(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn payout_count(&self) -> usize {
        self.payout_calls.load(Ordering::SeqCst)
    }

    pub fn collection_count(&self) -> usize {
        self.collection_calls.load(Ordering::SeqCst)
    }

    fn behavior(&self) -> SandboxBehavior {
        self.behavior
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn simulate_latency(&self, latency: Duration) {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn new_provider_reference(&self) -> String {
        format!(
            "{}-{}",
            self.info.code.as_str().to_ascii_lowercase(),
            uuid::Uuid::new_v4().simple()
        )
    }

    fn fee_for(&self, request: &PayoutRequest) -> Decimal {
        round_for(self.info.fees.fee_for(request.amount), &request.currency)
    }
}

#[async_trait]
impl PayoutProvider for SandboxProvider {
    fn info(&self) -> &ProviderInfo {
        &self.info
    }

    async fn banks(&self, country: &CountryCode) -> Result<Vec<Bank>, ProviderError> {
        Ok(self
            .banks
            .iter()
            .filter(|b| &b.country == country)
            .cloned()
            .collect())
    }

    async fn mobile_operators(
        &self,
        country: &CountryCode,
    ) -> Result<Vec<MobileOperator>, ProviderError> {
        Ok(self
            .operators
            .iter()
            .filter(|o| &o.country == country)
            .cloned()
            .collect())
    }

    async fn validate_recipient(&self, request: &PayoutRequest) -> Result<(), ProviderError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = self.behavior().reject_recipient {
            return Err(ProviderError::InvalidRecipient(reason));
        }
        if !self.info.supports_country(&request.country) {
            return Err(ProviderError::CountryNotSupported(request.country.clone()));
        }

        let recipient = &request.recipient;
        if recipient.name.trim().is_empty() {
            return Err(ProviderError::InvalidRecipient("missing name".into()));
        }
        match request.method {
            PaymentMethod::MobileMoney | PaymentMethod::Ussd => {
                let phone = recipient.phone.as_deref().unwrap_or_default();
                let digits = phone.trim_start_matches('+');
                if digits.len() < 8 || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return Err(ProviderError::InvalidRecipient(format!(
                        "invalid phone number: {}",
                        phone
                    )));
                }
            }
            PaymentMethod::BankTransfer => {
                if recipient.account_number.is_none() || recipient.bank_code.is_none() {
                    return Err(ProviderError::InvalidRecipient(
                        "bank account number and bank code required".into(),
                    ));
                }
            }
            PaymentMethod::Card | PaymentMethod::Wallet => {}
        }
        Ok(())
    }

    async fn get_quote(&self, request: &PayoutRequest) -> Result<PayoutQuote, ProviderError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior();
        self.simulate_latency(behavior.latency).await;
        if let Some(err) = behavior.quote_failure {
            return Err(err);
        }

        let fee = self.fee_for(request);
        Ok(PayoutQuote {
            provider: self.info.code.clone(),
            amount: request.amount,
            fee,
            net_amount: request.amount - fee,
            currency: request.currency.clone(),
            estimated_seconds: behavior.estimated_seconds,
        })
    }

    async fn create_payout(
        &self,
        request: &PayoutRequest,
    ) -> Result<PayoutResponse, ProviderError> {
        self.payout_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior();
        self.simulate_latency(behavior.latency).await;
        if let Some(err) = behavior.payout_failure {
            return Err(err);
        }

        let existing = self
            .payout_refs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&request.reference)
            .cloned();
        if let Some(provider_reference) = existing
            && let Some(response) = self
                .payouts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&provider_reference)
        {
            debug!(reference = %request.reference, "Sandbox payout replayed");
            return Ok(response.clone());
        }

        let fee = self.fee_for(request);
        let response = PayoutResponse {
            provider: None,
            provider_reference: self.new_provider_reference(),
            reference: request.reference.clone(),
            status: behavior.settled_status,
            amount: request.amount,
            fee,
            net_amount: request.amount - fee,
            currency: request.currency.clone(),
            message: None,
        };

        self.payout_refs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request.reference.clone(), response.provider_reference.clone());
        self.payouts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(response.provider_reference.clone(), response.clone());

        Ok(response)
    }

    async fn payout_status(
        &self,
        provider_reference: &str,
    ) -> Result<PaymentStatus, ProviderError> {
        self.payouts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(provider_reference)
            .map(|p| p.status)
            .ok_or_else(|| ProviderError::NotFound(provider_reference.to_string()))
    }

    async fn cancel_payout(&self, provider_reference: &str) -> Result<(), ProviderError> {
        let mut payouts = self.payouts.lock().unwrap_or_else(|e| e.into_inner());
        let payout = payouts
            .get_mut(provider_reference)
            .ok_or_else(|| ProviderError::NotFound(provider_reference.to_string()))?;
        if payout.status.is_terminal() {
            return Err(ProviderError::Rejected(format!(
                "payout already {}",
                payout.status
            )));
        }
        payout.status = PaymentStatus::Cancelled;
        Ok(())
    }
}

#[async_trait]
impl CollectionProvider for SandboxProvider {
    fn info(&self) -> &ProviderInfo {
        &self.info
    }

    async fn initiate_collection(
        &self,
        request: &CollectionRequest,
    ) -> Result<CollectionResponse, ProviderError> {
        self.collection_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior();
        self.simulate_latency(behavior.latency).await;
        if let Some(err) = behavior.collection_failure {
            return Err(err);
        }
        if !self.info.supports_country(&request.country) {
            return Err(ProviderError::CountryNotSupported(request.country.clone()));
        }

        let provider_reference = self.new_provider_reference();
        let (payment_link, ussd_code) = match request.method {
            PaymentMethod::Ussd => (
                None,
                Some(format!("*144*{}#", &provider_reference[provider_reference.len() - 6..])),
            ),
            _ => (
                Some(format!(
                    "https://sandbox.{}.local/pay/{}",
                    self.info.code.as_str().to_ascii_lowercase(),
                    provider_reference
                )),
                None,
            ),
        };
        let fee = round_for(self.info.fees.fee_for(request.amount), &request.currency);
        let response = CollectionResponse {
            provider: None,
            provider_reference: provider_reference.clone(),
            reference: request.reference.clone(),
            status: PaymentStatus::Pending,
            payment_link,
            ussd_code,
            fee,
            net_amount: request.amount - fee,
        };

        self.collections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(provider_reference, response.clone());
        Ok(response)
    }

    async fn verify_collection(
        &self,
        provider_reference: &str,
    ) -> Result<CollectionResponse, ProviderError> {
        let settled = self.behavior().settled_status;
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        let collection = collections
            .get_mut(provider_reference)
            .ok_or_else(|| ProviderError::NotFound(provider_reference.to_string()))?;
        if !collection.status.is_terminal() {
            collection.status = settled;
        }
        Ok(collection.clone())
    }
}
