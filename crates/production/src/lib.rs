//! Production runner with async I/O.
//!
//! This crate wraps the deterministic [`OracleStateMachine`](attestor_node::OracleStateMachine)
//! with real time and real I/O:
//!
//! - Peer frames via a [`Transport`] and an inbound mpsc channel
//! - Timers via tokio tasks
//! - Protocol state written to a [`Database`](attestor_core::Database) before
//!   the actions that depend on it
//! - Plugin calls on the blocking pool, each under its deadline
//! - Certified reports handed to a [`ContractTransmitter`](attestor_core::ContractTransmitter)
//!
//! # Architecture
//!
//! A single task owns the state machine and receives events from dedicated
//! channels. Nothing else touches it, so there is no locking around protocol
//! state.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           ProductionRunner                           │
//! │                                                                      │
//! │   select! { biased;  cancel | timers | callbacks | inbound frames }  │
//! │        │                                                             │
//! │        ▼                                                             │
//! │   OracleStateMachine::handle(event) -> Vec<Action>                   │
//! │        │                                                             │
//! │   ┌────┴────────────┬──────────────────┬───────────────────┐         │
//! │   ▼                 ▼                  ▼                   ▼         │
//! │  Transport      TimerManager     spawn_blocking        spawn_blocking│
//! │  (frames)       (tokio sleep)    (plugin + deadline)   (transmitter) │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
mod runner;
pub mod telemetry;
mod timers;
pub mod transport;

pub use config::{ConfigFile, ConfigFileError};
pub use runner::{ProductionRunner, ProductionRunnerBuilder, RunnerError};
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
pub use timers::{TimerFire, TimerManager};
pub use transport::{InMemoryNetwork, InMemoryTransport, InboundFrame, Transport, TransportError};
