//! Deterministic simulation of an oracle set.
//!
//! A single-threaded discrete-event loop drives every oracle's
//! [`OracleStateMachine`](attestor_node::OracleStateMachine) over a simulated
//! network. Plugin calls run inline and complete instantly, so the same seed
//! always yields the same run.

mod event_queue;
mod network;
mod plugin;
mod runner;

pub use event_queue::EventKey;
pub use network::{NetworkConfig, SimulatedNetwork};
pub use plugin::SimPlugin;
pub use runner::{
    FinalizedRecord, RestartError, SimulationRunner, SimulationStats, TransmissionRecord,
};

/// Index of an oracle in the simulation; equal to its `OracleId`.
pub type NodeIndex = u32;
