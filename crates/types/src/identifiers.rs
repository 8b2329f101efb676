//! Identifier newtypes.

use sbor::prelude::*;
use std::fmt;

/// Index of an oracle in the configured oracle set (0..n-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BasicSbor)]
#[sbor(transparent)]
pub struct OracleId(pub u8);

impl OracleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OracleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oracle-{}", self.0)
    }
}

/// Epoch number. One leader per epoch, strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BasicSbor)]
#[sbor(transparent)]
pub struct Epoch(pub u32);

impl Epoch {
    /// The first epoch every oracle starts in.
    pub const INITIAL: Self = Epoch(1);

    /// The next epoch, or `None` at `u32::MAX`.
    ///
    /// Wrapping would resurrect an old epoch identity, so callers must refuse
    /// to proceed instead.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Epoch)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Round within an epoch. Reset to zero at each epoch start; the first round
/// actually run is `Round(1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BasicSbor)]
#[sbor(transparent)]
pub struct Round(pub u8);

impl Round {
    pub const ZERO: Self = Round(0);

    /// The next round, or `None` at `u8::MAX`.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Round)
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequence number used by the certified (PBFT-style) protocol variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BasicSbor)]
#[sbor(transparent)]
pub struct SeqNr(pub u64);

impl SeqNr {
    pub const GENESIS: Self = SeqNr(0);

    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(SeqNr)
    }
}

impl fmt::Display for SeqNr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Digest identifying one protocol configuration (oracle set, keys, params).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BasicSbor)]
#[sbor(transparent)]
pub struct ConfigDigest(pub [u8; 32]);

impl ConfigDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ConfigDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigDigest({})", &hex::encode(self.0)[..16])
    }
}

impl fmt::Display for ConfigDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
