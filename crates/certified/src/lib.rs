//! Certified state for the stricter agreement variant.
//!
//! - [`BoundedQuorumPool`]: per-key, per-sender message pool with a fixed
//!   per-sender budget, pinned verification results and a monotone
//!   completion watermark.
//! - Carry-over: a new leader gathers signed highest-certified timestamps
//!   from a quorum, picks the highest, and proves to followers which sequence
//!   number the new epoch resumes from.

mod carry_over;
mod pool;

pub use carry_over::{
    outcome_digest, verify_certified, CarryOverDecision, CarryOverError, CertificateError,
    EpochStartCollector, EpochStartProof, EpochStartResponse,
};
pub use pool::{BoundedQuorumPool, PoolEntry, PoolPutResult};
