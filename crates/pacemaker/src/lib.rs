//! Pacemaker: epoch and leader management.
//!
//! The pacemaker owns the current epoch and derives its leader as
//! `epoch mod n`. It advances epochs when more than `f` peers ask for a newer
//! one, and asks for a newer one itself when the current leader stops making
//! progress.
//!
//! # Events handled
//!
//! | Event | Effect |
//! |-------|--------|
//! | `Progress` | re-arm the progress timer |
//! | `ProgressTimer`, `ChangeLeader` | broadcast `NewEpoch(max(ne, epoch + 1))` |
//! | `ResendTimer` | re-broadcast the pending wish |
//! | `NewEpoch` from a peer | record the vote, maybe switch epochs |

mod state;

pub use state::PacemakerState;
