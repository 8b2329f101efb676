//! Transmission of finalized reports.
//!
//! Every oracle that learns a finalized report may transmit it. To avoid all
//! of them doing so at once, each oracle waits
//! `delta_stage × ((index − round) mod n)` before asking the plugin whether to
//! transmit, so one oracle goes first each round and the rest act as backups.
//!
//! ```text
//! ReportFinalized ─▶ ShouldAccept ─▶ stage timer ─▶ ShouldTransmit ─▶ TransmitReport
//! ```

mod state;

pub use state::TransmissionState;
