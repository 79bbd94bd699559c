//! Transfer FSM State Definitions
//!
//! State IDs are stored as SMALLINT in `internal_transfers_tb.status`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal transfer status
///
/// Terminal states: COMPLETED (40), FAILED (-10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum TransferStatus {
    /// Recorded, funds not yet moved
    Pending = 0,

    /// Sender funds reserved, waiting for the settlement worker
    Locked = 10,

    /// Settlement worker owns the transfer
    Processing = 20,

    /// Terminal: recipient credited
    Completed = 40,

    /// Terminal: sender restored (or never debited)
    Failed = -10,
}

impl TransferStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed)
    }

    /// Sender funds are reserved but not yet debited
    #[inline]
    pub fn holds_lock(&self) -> bool {
        matches!(self, TransferStatus::Locked | TransferStatus::Processing)
    }

    /// Legal FSM edges
    ///
    /// ```text
    /// PENDING ──▶ COMPLETED | FAILED            (direct / instant)
    /// PENDING ──▶ LOCKED ──▶ PROCESSING ──▶ COMPLETED | FAILED
    ///               └────────────────────────▶ FAILED (expiry)
    /// ```
    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self, next),
            (Pending, Locked)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Locked, Processing)
                | (Locked, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransferStatus::Pending),
            10 => Some(TransferStatus::Locked),
            20 => Some(TransferStatus::Processing),
            40 => Some(TransferStatus::Completed),
            -10 => Some(TransferStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Locked => "LOCKED",
            TransferStatus::Processing => "PROCESSING",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for TransferStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TransferStatus::from_id(value).ok_or(())
    }
}
