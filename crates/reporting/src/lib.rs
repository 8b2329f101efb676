//! Report generation for the attestor protocol.
//!
//! Runs one epoch at a time. Every oracle is a follower; the epoch's leader
//! additionally drives rounds:
//!
//! ```text
//! leader                               followers
//!   start_round ── InvokePlugin(Query)
//!   ObserveReq(query) ───────────────▶ InvokePlugin(Observation)
//!   ◀─────────────────────────────── Observe(signed observation)
//!   > 2f observations: grace timer
//!   grace expiry: ReportReq ─────────▶ verify, InvokePlugin(Report)
//!   ◀─────────────────────────────── Report(attestation or skip)
//!   report_quorum matching: Final ───▶ verify certificate
//!                                      FinalEcho to all, ReportFinalized
//! ```
//!
//! | Event | Handler |
//! |-------|---------|
//! | `EpochStarted` | reset roles, start round 1 if leader, replay buffer |
//! | `RoundTimer` | `start_round` (two-call ready flag) |
//! | `GraceTimer` | broadcast `ReportReq` |
//! | `MessageReceived` | leader or follower handler by message kind |
//! | `*Completed` | continue the round with the plugin's result |
//!
//! Messages for a future epoch are held in a bounded per-sender
//! [`MessageBuffer`] and replayed when that epoch starts.

mod buffer;
mod follower;
mod leader;
mod rejection;
mod state;
mod tally;

#[cfg(test)]
mod test_support;

pub use buffer::MessageBuffer;
pub use rejection::MessageRejection;
pub use state::ReportGenerationState;
