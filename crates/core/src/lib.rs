//! Core types for the attestor reporting protocol.
//!
//! This crate provides the foundational types for the protocol architecture:
//!
//! - [`Event`]: All possible inputs to the state machine
//! - [`Action`]: All possible outputs from the state machine
//! - [`EventPriority`]: Ordering priority for events at the same timestamp
//! - [`StateMachine`]: The trait that all state machines implement
//! - [`ReportingPlugin`] and [`ContractTransmitter`]: external capabilities
//! - [`Database`] and [`RecoveredState`]: what survives a restart
//!
//! # Architecture
//!
//! The core is built on a simple event-driven model:
//!
//! ```text
//! Events → StateMachine::handle() → Actions
//! ```
//!
//! The state machine is:
//! - **Synchronous**: No async, no .await
//! - **Deterministic**: Same state + event = same actions
//! - **Pure-ish**: Mutates self, but performs no I/O
//!
//! All I/O is handled by the runner (simulation or production) which:
//! 1. Delivers events to the state machine
//! 2. Executes the returned actions
//! 3. Converts action results back into events

mod action;
mod event;
mod plugin;
mod storage;
mod traits;
mod transmitter;

use attestor_types::{Epoch, Round};

pub use action::Action;
pub use event::{Event, EventPriority};
pub use plugin::{PluginCall, PluginError, ReportingPlugin};
pub use storage::{
    Database, DatabaseError, InMemoryDatabase, PacemakerSnapshot, PendingTransmission,
    RecoveredState,
};
pub use traits::{StateMachine, SubStateMachine};
pub use transmitter::{ContractTransmitter, TransmitError};

/// Timer identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerId {
    /// Leader suspicion timer (pacemaker)
    Progress,
    /// `NewEpoch` re-broadcast timer (pacemaker)
    Resend,
    /// Round start timer (leader)
    Round,
    /// Observation grace timer (leader)
    Grace,
    /// Staggered transmission of an accepted report
    Transmission { epoch: Epoch, round: Round },
}

impl TimerId {
    /// The event delivered when this timer fires.
    pub fn into_event(self) -> Event {
        match self {
            TimerId::Progress => Event::ProgressTimer,
            TimerId::Resend => Event::ResendTimer,
            TimerId::Round => Event::RoundTimer,
            TimerId::Grace => Event::GraceTimer,
            TimerId::Transmission { epoch, round } => Event::TransmissionTimer { epoch, round },
        }
    }
}
