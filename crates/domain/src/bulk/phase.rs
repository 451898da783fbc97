//! Bulk transaction phase machine.

use serde::{Deserialize, Serialize};

/// The phase of a bulk transaction in its lifecycle.
///
/// Phase transitions:
/// ```text
/// Received ──► DiscoveryProcessing ──► DiscoveryCompleted
///                  ──► AgreementProcessing ──► AgreementCompleted
///                  ──► TransfersProcessing ──► Completed
/// (Error reachable from any non-terminal phase)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkTransactionPhase {
    /// Bulk request accepted, nothing dispatched yet.
    #[default]
    Received,

    /// Party lookups fanned out, callbacks pending.
    DiscoveryProcessing,

    /// Every party lookup has reported back.
    DiscoveryCompleted,

    /// Bulk quotes fanned out per batch, callbacks pending.
    AgreementProcessing,

    /// Every quote batch has reported back.
    AgreementCompleted,

    /// Bulk transfers fanned out per batch, callbacks pending.
    TransfersProcessing,

    /// All phases finished (terminal).
    Completed,

    /// Aggregate-level fault aborted the bulk (terminal).
    Error,
}

impl BulkTransactionPhase {
    /// Returns true if discovery fan-out can start from this phase.
    pub fn can_start_discovery(&self) -> bool {
        matches!(self, BulkTransactionPhase::Received)
    }

    /// Returns true if discovery can complete from this phase.
    pub fn can_complete_discovery(&self) -> bool {
        matches!(self, BulkTransactionPhase::DiscoveryProcessing)
    }

    /// Returns true if agreement fan-out can start from this phase.
    pub fn can_start_agreement(&self) -> bool {
        matches!(self, BulkTransactionPhase::DiscoveryCompleted)
    }

    /// Returns true if agreement can complete from this phase.
    pub fn can_complete_agreement(&self) -> bool {
        matches!(self, BulkTransactionPhase::AgreementProcessing)
    }

    /// Returns true if transfer fan-out can start from this phase.
    pub fn can_start_transfers(&self) -> bool {
        matches!(self, BulkTransactionPhase::AgreementCompleted)
    }

    /// Returns true if the bulk can complete from this phase.
    pub fn can_complete(&self) -> bool {
        matches!(self, BulkTransactionPhase::TransfersProcessing)
    }

    /// Returns true if the bulk can be failed from this phase.
    pub fn can_fail(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this is a terminal phase (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BulkTransactionPhase::Completed | BulkTransactionPhase::Error
        )
    }

    /// Returns the phase name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkTransactionPhase::Received => "RECEIVED",
            BulkTransactionPhase::DiscoveryProcessing => "DISCOVERY_PROCESSING",
            BulkTransactionPhase::DiscoveryCompleted => "DISCOVERY_COMPLETED",
            BulkTransactionPhase::AgreementProcessing => "AGREEMENT_PROCESSING",
            BulkTransactionPhase::AgreementCompleted => "AGREEMENT_COMPLETED",
            BulkTransactionPhase::TransfersProcessing => "TRANSFERS_PROCESSING",
            BulkTransactionPhase::Completed => "COMPLETED",
            BulkTransactionPhase::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for BulkTransactionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
