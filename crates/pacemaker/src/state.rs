//! Pacemaker state machine.

use attestor_core::{Action, Event, PacemakerSnapshot, SubStateMachine, TimerId};
use attestor_messages::{NewEpochMessage, ProtocolMessage};
use attestor_types::{Epoch, OracleId, ProtocolConfig, Topology};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, trace, warn};

/// Epoch/leader manager for a single oracle.
///
/// Single-threaded: owned by the node state machine and driven only through
/// events.
pub struct PacemakerState {
    /// Network topology (single source of truth for the oracle set).
    topology: Arc<dyn Topology>,

    /// How long the leader may go without progress.
    delta_progress: Duration,

    /// Interval between `NewEpoch` re-broadcasts.
    delta_resend: Duration,

    /// Current epoch.
    epoch: Epoch,

    /// Leader of the current epoch.
    leader: OracleId,

    /// Highest epoch we have asked the others to move to (`ne`).
    highest_sent_new_epoch_wish: Epoch,

    /// Highest `NewEpoch` vote per peer. Never contains the local oracle.
    votes: BTreeMap<OracleId, Epoch>,

    /// Set once the epoch counter is exhausted; we refuse to wrap.
    exhausted: bool,

    /// Started from persisted state rather than fresh.
    resumed: bool,

    /// Current time.
    now: Duration,
}

impl std::fmt::Debug for PacemakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacemakerState")
            .field("oracle", &self.topology.local_oracle_id())
            .field("epoch", &self.epoch)
            .field("leader", &self.leader)
            .field("ne", &self.highest_sent_new_epoch_wish)
            .field("votes", &self.votes.len())
            .finish()
    }
}

impl PacemakerState {
    /// Create a pacemaker, in the initial epoch or at a persisted snapshot.
    pub fn new(
        topology: Arc<dyn Topology>,
        config: &ProtocolConfig,
        recovered: Option<PacemakerSnapshot>,
    ) -> Self {
        let (epoch, ne) = match recovered {
            Some(snapshot) => (
                snapshot.epoch,
                snapshot.highest_sent_new_epoch_wish.max(snapshot.epoch),
            ),
            None => (Epoch::INITIAL, Epoch::INITIAL),
        };
        let leader = topology.leader_for(epoch);
        Self {
            topology,
            delta_progress: config.delta_progress,
            delta_resend: config.delta_resend,
            epoch,
            leader,
            highest_sent_new_epoch_wish: ne,
            votes: BTreeMap::new(),
            exhausted: false,
            resumed: recovered.is_some(),
            now: Duration::ZERO,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Public API
    // ═══════════════════════════════════════════════════════════════════════════

    /// Get the current epoch.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Get the leader of the current epoch.
    pub fn leader(&self) -> OracleId {
        self.leader
    }

    /// Check if the local oracle leads the current epoch.
    pub fn is_leader(&self) -> bool {
        self.leader == self.topology.local_oracle_id()
    }

    /// Highest epoch this oracle has broadcast a `NewEpoch` wish for.
    pub fn highest_sent_new_epoch_wish(&self) -> Epoch {
        self.highest_sent_new_epoch_wish
    }

    /// State to persist whenever the epoch or the wish changes.
    pub fn snapshot(&self) -> PacemakerSnapshot {
        PacemakerSnapshot {
            epoch: self.epoch,
            highest_sent_new_epoch_wish: self.highest_sent_new_epoch_wish,
        }
    }

    /// Start the initial epoch: arm the progress timer and announce the epoch
    /// to report generation.
    ///
    /// After a restart the recovered epoch is not rejoined, since this oracle
    /// may already have signed in it. The pacemaker asks for the next epoch
    /// instead and stays idle until peers move.
    pub fn initialize(&mut self) -> Vec<Action> {
        if self.resumed {
            info!(
                oracle = self.topology.local_oracle_id().0,
                epoch = self.epoch.0,
                ne = self.highest_sent_new_epoch_wish.0,
                "Pacemaker resuming from storage, not rejoining the recovered epoch"
            );
            let mut actions = vec![Action::SetTimer {
                id: TimerId::Progress,
                duration: self.delta_progress,
            }];
            actions.extend(self.on_change_leader());
            return actions;
        }

        info!(
            oracle = self.topology.local_oracle_id().0,
            epoch = self.epoch.0,
            leader = self.leader.0,
            "Pacemaker starting"
        );
        vec![
            // Marks the initial epoch as entered, so a restart cannot rejoin it.
            Action::PersistPacemakerState {
                snapshot: self.snapshot(),
            },
            Action::SetTimer {
                id: TimerId::Progress,
                duration: self.delta_progress,
            },
            Action::EnqueueInternal {
                event: Event::EpochStarted {
                    epoch: self.epoch,
                    leader: self.leader,
                },
            },
        ]
    }

    /// The current round produced output; the leader is alive.
    pub fn on_progress(&mut self) -> Vec<Action> {
        trace!(epoch = self.epoch.0, "Progress, re-arming progress timer");
        vec![Action::SetTimer {
            id: TimerId::Progress,
            duration: self.delta_progress,
        }]
    }

    /// The progress timer expired: the leader looks stuck.
    pub fn on_progress_timer(&mut self) -> Vec<Action> {
        warn!(
            epoch = self.epoch.0,
            leader = self.leader.0,
            timeout = ?self.delta_progress,
            "No progress from leader, requesting leader change"
        );
        self.on_change_leader()
    }

    /// Ask every oracle to move past the current epoch.
    #[instrument(level = "debug", skip(self), fields(epoch = self.epoch.0))]
    pub fn on_change_leader(&mut self) -> Vec<Action> {
        let Some(next) = self.epoch.next() else {
            if !self.exhausted {
                error!(
                    epoch = self.epoch.0,
                    "Epoch counter exhausted, refusing to wrap; no further leader changes"
                );
                self.exhausted = true;
            }
            return vec![];
        };

        let mut actions = Vec::new();
        if next > self.highest_sent_new_epoch_wish {
            self.highest_sent_new_epoch_wish = next;
            actions.push(Action::PersistPacemakerState {
                snapshot: self.snapshot(),
            });
        }

        info!(
            epoch = self.epoch.0,
            ne = self.highest_sent_new_epoch_wish.0,
            "Broadcasting NewEpoch wish"
        );
        actions.extend(self.send_new_epoch());
        actions
    }

    /// Re-broadcast the pending wish while it is still ahead of the epoch.
    pub fn on_resend_timer(&mut self) -> Vec<Action> {
        if self.highest_sent_new_epoch_wish <= self.epoch {
            return vec![];
        }
        debug!(
            epoch = self.epoch.0,
            ne = self.highest_sent_new_epoch_wish.0,
            "Re-broadcasting NewEpoch wish"
        );
        self.send_new_epoch()
    }

    /// Handle a `NewEpoch(epoch)` vote from `sender`.
    #[instrument(level = "debug", skip(self), fields(current = self.epoch.0))]
    pub fn on_new_epoch(&mut self, sender: OracleId, epoch: Epoch) -> Vec<Action> {
        if sender == self.topology.local_oracle_id() {
            // Our own broadcast looping back; only peers count.
            return vec![];
        }
        if !self.topology.contains(sender) {
            warn!(sender = sender.0, msg_type = "NewEpoch", "Vote from unknown oracle");
            return vec![];
        }
        if epoch <= self.epoch {
            trace!(sender = sender.0, epoch = epoch.0, "Stale NewEpoch vote");
            return vec![];
        }

        let entry = self.votes.entry(sender).or_insert(epoch);
        if epoch > *entry {
            *entry = epoch;
        }

        match self.quorum_epoch() {
            Some(target) if target > self.epoch => self.advance_to(target),
            _ => vec![],
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════════════

    /// Highest epoch that more than `f` distinct peers voted for or above.
    fn quorum_epoch(&self) -> Option<Epoch> {
        let threshold = self.topology.f() + 1;
        let mut epochs: Vec<Epoch> = self.votes.values().copied().collect();
        if epochs.len() < threshold {
            return None;
        }
        epochs.sort_unstable_by(|a, b| b.cmp(a));
        Some(epochs[threshold - 1])
    }

    fn advance_to(&mut self, target: Epoch) -> Vec<Action> {
        // Amplify: a quorum of peers wants `target`, so join them.
        let amplify = target > self.highest_sent_new_epoch_wish;
        if amplify {
            self.highest_sent_new_epoch_wish = target;
        }

        let old_epoch = self.epoch;
        self.epoch = target;
        self.leader = self.topology.leader_for(target);
        self.votes.retain(|_, voted| *voted > target);

        let mut actions = vec![Action::PersistPacemakerState {
            snapshot: self.snapshot(),
        }];
        if amplify {
            actions.push(Action::Broadcast {
                message: ProtocolMessage::NewEpoch(NewEpochMessage { epoch: target }),
            });
        }

        info!(
            old_epoch = old_epoch.0,
            epoch = self.epoch.0,
            leader = self.leader.0,
            is_leader = self.is_leader(),
            "Advancing to new epoch"
        );

        actions.push(Action::SetTimer {
            id: TimerId::Progress,
            duration: self.delta_progress,
        });
        if self.highest_sent_new_epoch_wish > self.epoch {
            actions.push(Action::SetTimer {
                id: TimerId::Resend,
                duration: self.delta_resend,
            });
        } else {
            actions.push(Action::CancelTimer { id: TimerId::Resend });
        }
        actions.push(Action::EnqueueInternal {
            event: Event::EpochStarted {
                epoch: self.epoch,
                leader: self.leader,
            },
        });
        actions
    }

    fn send_new_epoch(&mut self) -> Vec<Action> {
        vec![
            Action::Broadcast {
                message: ProtocolMessage::NewEpoch(NewEpochMessage {
                    epoch: self.highest_sent_new_epoch_wish,
                }),
            },
            Action::SetTimer {
                id: TimerId::Resend,
                duration: self.delta_resend,
            },
        ]
    }
}

impl SubStateMachine for PacemakerState {
    fn try_handle(&mut self, event: &Event) -> Option<Vec<Action>> {
        match event {
            Event::Progress => Some(self.on_progress()),
            Event::ProgressTimer => Some(self.on_progress_timer()),
            Event::ChangeLeader => Some(self.on_change_leader()),
            Event::ResendTimer => Some(self.on_resend_timer()),
            Event::MessageReceived {
                sender,
                message: ProtocolMessage::NewEpoch(msg),
            } => Some(self.on_new_epoch(*sender, msg.epoch)),
            _ => None,
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }
}
