//! The composed oracle state machine.
//!
//! [`OracleStateMachine`] owns the pacemaker, report generation,
//! transmission and certified sub-state machines. Messages go to the
//! sub-state machine they are addressed to; other events go to every
//! sub-state machine that handles them. Runners (simulation or production)
//! drive it through the [`StateMachine`](attestor_core::StateMachine) trait.

mod certified;
mod state;

pub use certified::CertifiedState;
pub use state::{NodeConfigError, OracleStateMachine};
