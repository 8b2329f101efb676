//! Hand-off of certified reports to the external ledger.

use attestor_types::{AttestedReportMany, ReportContext};
use thiserror::Error;

/// Errors from transmitting a report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransmitError {
    #[error("transmission rejected: {0}")]
    Rejected(String),

    #[error("transmission failed: {0}")]
    Failed(String),
}

/// Submits a quorum-certified report to wherever it is consumed.
pub trait ContractTransmitter: Send + Sync {
    fn transmit(&self, ctx: &ReportContext, report: &AttestedReportMany)
        -> Result<(), TransmitError>;
}
