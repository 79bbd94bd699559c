use thiserror::Error;

use crate::core_types::ReferenceId;
use crate::crypto_rails::BridgeError;
use crate::i18n::{Localized, Message, catalog};
use crate::router::RouterError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("Conversion failed: {0}")]
    Conversion(#[from] BridgeError),

    #[error("Routing failed: {0}")]
    Routing(#[from] RouterError),

    #[error("Transfer {0} is already executing")]
    InProgress(ReferenceId),
}

impl OrchestratorError {
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::Conversion(e) => e.code(),
            OrchestratorError::Routing(e) => e.code(),
            OrchestratorError::InProgress(_) => "TRANSFER_IN_PROGRESS",
        }
    }
}

impl Localized for OrchestratorError {
    fn message(&self) -> Message {
        match self {
            OrchestratorError::Conversion(e) => e.message(),
            OrchestratorError::Routing(e) => e.message(),
            OrchestratorError::InProgress(_) => catalog::DUPLICATE_REFERENCE,
        }
    }
}
