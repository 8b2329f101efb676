//! What an oracle persists, and the store it persists to.
//!
//! The state machine never touches storage. It emits `Persist*` actions that
//! the runner applies before executing the actions that follow them, and it
//! is handed a [`RecoveredState`] at construction after a restart.

use attestor_types::{AttestedReportMany, CertifiedPrepareOrCommit, Epoch, ReportContext};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

/// Pacemaker state that must survive a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacemakerSnapshot {
    pub epoch: Epoch,
    pub highest_sent_new_epoch_wish: Epoch,
}

/// An accepted report still waiting for its transmission slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransmission {
    pub ctx: ReportContext,
    pub report: AttestedReportMany,
}

/// State recovered from storage on startup.
///
/// Passed to `OracleStateMachine::new()`. For a fresh start, use
/// `RecoveredState::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveredState {
    /// Last persisted pacemaker state; `None` if the oracle never left its
    /// first epoch.
    pub pacemaker: Option<PacemakerSnapshot>,

    /// Highest certificate this oracle knows of; `None` means genesis.
    pub highest_certified: Option<CertifiedPrepareOrCommit>,

    /// Accepted reports not yet handed to the transmitter, oldest first.
    pub pending_transmissions: Vec<PendingTransmission>,
}

impl RecoveredState {
    pub fn is_fresh(&self) -> bool {
        *self == Self::default()
    }
}

/// Storage failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatabaseError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("stored state is corrupt: {0}")]
    Corrupt(String),
}

/// Durable store for one oracle's protocol state.
///
/// Writes must be durable when they return: the runner relies on that
/// before sending any message that depends on the written state.
pub trait Database: Send + Sync {
    fn write_pacemaker_state(&self, snapshot: PacemakerSnapshot) -> Result<(), DatabaseError>;

    fn write_highest_certified(
        &self,
        certificate: &CertifiedPrepareOrCommit,
    ) -> Result<(), DatabaseError>;

    fn store_pending_transmission(
        &self,
        transmission: &PendingTransmission,
    ) -> Result<(), DatabaseError>;

    /// Removing an absent entry is not an error.
    fn delete_pending_transmission(&self, ctx: &ReportContext) -> Result<(), DatabaseError>;

    /// Everything needed to rebuild the state machine.
    fn load_recovered_state(&self) -> Result<RecoveredState, DatabaseError>;
}

#[derive(Debug, Default)]
struct Stored {
    pacemaker: Option<PacemakerSnapshot>,
    highest_certified: Option<CertifiedPrepareOrCommit>,
    pending: BTreeMap<(Epoch, attestor_types::Round), PendingTransmission>,
}

/// Process-local [`Database`].
///
/// Survives a restart of the state machine but not of the process; used by
/// the simulator and as the production default.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    stored: Mutex<Stored>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_transmission_count(&self) -> usize {
        self.stored.lock().pending.len()
    }
}

impl Database for InMemoryDatabase {
    fn write_pacemaker_state(&self, snapshot: PacemakerSnapshot) -> Result<(), DatabaseError> {
        self.stored.lock().pacemaker = Some(snapshot);
        Ok(())
    }

    fn write_highest_certified(
        &self,
        certificate: &CertifiedPrepareOrCommit,
    ) -> Result<(), DatabaseError> {
        let mut stored = self.stored.lock();
        // Never regress, even if writes arrive out of order.
        let newer = stored
            .highest_certified
            .as_ref()
            .map_or(true, |current| certificate.timestamp() > current.timestamp());
        if newer {
            stored.highest_certified = Some(certificate.clone());
        }
        Ok(())
    }

    fn store_pending_transmission(
        &self,
        transmission: &PendingTransmission,
    ) -> Result<(), DatabaseError> {
        self.stored
            .lock()
            .pending
            .insert(transmission.ctx.timestamp(), transmission.clone());
        Ok(())
    }

    fn delete_pending_transmission(&self, ctx: &ReportContext) -> Result<(), DatabaseError> {
        self.stored.lock().pending.remove(&ctx.timestamp());
        Ok(())
    }

    fn load_recovered_state(&self) -> Result<RecoveredState, DatabaseError> {
        let stored = self.stored.lock();
        let recovered = RecoveredState {
            pacemaker: stored.pacemaker,
            highest_certified: stored.highest_certified.clone(),
            pending_transmissions: stored.pending.values().cloned().collect(),
        };
        info!(
            epoch = recovered.pacemaker.map(|p| p.epoch.0),
            highest_certified = recovered.highest_certified.as_ref().map(|c| c.seq_nr().0),
            pending_transmissions = recovered.pending_transmissions.len(),
            "Loaded recovered state from storage"
        );
        Ok(recovered)
    }
}
