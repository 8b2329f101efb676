//! Frame transport between oracles.
//!
//! The runner encodes every outbound [`ProtocolMessage`](attestor_messages::ProtocolMessage)
//! into a wire frame and hands it to a [`Transport`]. Inbound frames arrive on
//! an mpsc receiver as `(sender, frame)`; the transport authenticates the
//! sender.

use attestor_types::OracleId;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// An authenticated inbound frame.
pub type InboundFrame = (OracleId, Vec<u8>);

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Unknown peer: {0}")]
    UnknownPeer(OracleId),

    #[error("Peer {0} is not keeping up, frame dropped")]
    PeerBacklogged(OracleId),

    #[error("Peer {0} disconnected")]
    Disconnected(OracleId),
}

/// Outbound half of an authenticated point-to-point network.
///
/// Sends are fire-and-forget: delivery is best effort and never blocks the
/// state machine task.
pub trait Transport: Send + Sync {
    /// Send a frame to one peer.
    fn send_to(&self, recipient: OracleId, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Send a frame to every peer except ourselves.
    ///
    /// Returns the errors of the peers that could not be reached.
    fn broadcast(&self, frame: Vec<u8>) -> Vec<TransportError>;
}

/// A full mesh of in-process channels connecting a local oracle set.
///
/// Supports directional partitions for tests.
#[derive(Debug)]
pub struct InMemoryNetwork {
    inboxes: Vec<mpsc::Sender<InboundFrame>>,
    partitions: RwLock<HashSet<(OracleId, OracleId)>>,
}

impl InMemoryNetwork {
    /// Build a network of `n` oracles with per-oracle inbox `capacity`.
    ///
    /// Returns the shared network and each oracle's inbound receiver, indexed
    /// by oracle.
    pub fn new(n: usize, capacity: usize) -> (Arc<Self>, Vec<mpsc::Receiver<InboundFrame>>) {
        let (inboxes, receivers): (Vec<_>, Vec<_>) =
            (0..n).map(|_| mpsc::channel::<InboundFrame>(capacity)).unzip();
        let network = Arc::new(Self {
            inboxes,
            partitions: RwLock::new(HashSet::new()),
        });
        (network, receivers)
    }

    /// The transport used by `local`.
    pub fn transport(self: &Arc<Self>, local: OracleId) -> InMemoryTransport {
        InMemoryTransport {
            local,
            network: Arc::clone(self),
        }
    }

    /// Drop frames from `from` to `to`.
    pub fn partition(&self, from: OracleId, to: OracleId) {
        self.partitions.write().insert((from, to));
    }

    /// Cut `oracle` off from everyone in both directions.
    pub fn isolate(&self, oracle: OracleId) {
        let mut partitions = self.partitions.write();
        for i in 0..self.inboxes.len() {
            let other = OracleId(i as u8);
            if other != oracle {
                partitions.insert((oracle, other));
                partitions.insert((other, oracle));
            }
        }
    }

    pub fn heal_all(&self) {
        self.partitions.write().clear();
    }

    fn deliver(&self, from: OracleId, to: OracleId, frame: Vec<u8>) -> Result<(), TransportError> {
        let inbox = self
            .inboxes
            .get(to.index())
            .ok_or(TransportError::UnknownPeer(to))?;
        if self.partitions.read().contains(&(from, to)) {
            trace!(from = from.0, to = to.0, "Frame dropped by partition");
            return Ok(());
        }
        inbox.try_send((from, frame)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::PeerBacklogged(to),
            mpsc::error::TrySendError::Closed(_) => TransportError::Disconnected(to),
        })
    }
}

/// One oracle's handle on an [`InMemoryNetwork`].
#[derive(Debug, Clone)]
pub struct InMemoryTransport {
    local: OracleId,
    network: Arc<InMemoryNetwork>,
}

impl Transport for InMemoryTransport {
    fn send_to(&self, recipient: OracleId, frame: Vec<u8>) -> Result<(), TransportError> {
        self.network.deliver(self.local, recipient, frame)
    }

    fn broadcast(&self, frame: Vec<u8>) -> Vec<TransportError> {
        (0..self.network.inboxes.len())
            .map(|i| OracleId(i as u8))
            .filter(|peer| *peer != self.local)
            .filter_map(|peer| self.network.deliver(self.local, peer, frame.clone()).err())
            .collect()
    }
}
