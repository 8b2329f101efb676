//! Certified commits and their carry-over across leader changes.
//!
//! Every finalized report is voted on with an offchain signature over its
//! commit digest. A byzantine quorum of matching votes makes a
//! [`CertifiedCommit`], which becomes the oracle's highest certified state.
//! When an epoch starts, each oracle hands that state to the new leader, who
//! proves to everyone where the epoch resumes.

use attestor_certified::{
    outcome_digest, BoundedQuorumPool, CarryOverDecision, EpochStartCollector, EpochStartProof,
    EpochStartResponse, PoolPutResult,
};
use attestor_core::{Action, Event, SubStateMachine};
use attestor_messages::{
    CommitVoteMessage, EpochStartMessage, EpochStartProofMessage, ProtocolMessage, SubProtocol,
};
use attestor_types::signing::commit_message;
use attestor_types::{
    AttestedReportMany, AttributedOffchainSignature, CertifiedCommit, CertifiedPrepareOrCommit,
    ConfigDigest, Epoch, Hash, OracleId, OracleKeys, QuorumCertificate, ReportContext, SeqNr,
    Topology,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Live pooled votes or responses per sender.
const MAX_POOLED_PER_SENDER: usize = 16;

/// A finalized report this oracle voted for, awaiting its certificate.
#[derive(Debug, Clone)]
struct LocalOutcome {
    epoch: Epoch,
    digest: Hash,
    outcome: Vec<u8>,
}

/// Certifies finalized reports and carries the highest certificate into
/// each new epoch.
pub struct CertifiedState {
    topology: Arc<dyn Topology>,
    keys: Arc<OracleKeys>,
    config_digest: ConfigDigest,

    epoch: Epoch,

    highest_certified: CertifiedPrepareOrCommit,

    commit_votes: BoundedQuorumPool<SeqNr, CommitVoteMessage>,
    local_outcomes: BTreeMap<SeqNr, LocalOutcome>,

    epoch_start: EpochStartCollector,

    /// A proof for an epoch this oracle has not started yet. Only the
    /// highest is kept.
    future_proof: Option<EpochStartProof>,

    /// Where the latest proven epoch resumed.
    carried_over: Option<(Epoch, CarryOverDecision)>,

    now: Duration,
}

impl std::fmt::Debug for CertifiedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertifiedState")
            .field("oracle", &self.topology.local_oracle_id())
            .field("epoch", &self.epoch)
            .field("highest_certified", &self.highest_certified.timestamp())
            .field("awaiting", &self.local_outcomes.len())
            .finish()
    }
}

impl CertifiedState {
    /// Start from `recovered`, or genesis for a fresh oracle.
    pub fn new(
        topology: Arc<dyn Topology>,
        keys: Arc<OracleKeys>,
        config_digest: ConfigDigest,
        recovered: Option<CertifiedPrepareOrCommit>,
    ) -> Self {
        let highest_certified = recovered.unwrap_or_else(CertifiedPrepareOrCommit::genesis);
        let mut commit_votes = BoundedQuorumPool::new(MAX_POOLED_PER_SENDER);
        if !highest_certified.is_genesis() {
            commit_votes.reap_completed(highest_certified.seq_nr());
        }
        Self {
            epoch_start: EpochStartCollector::new(
                topology.clone(),
                config_digest,
                MAX_POOLED_PER_SENDER,
            ),
            topology,
            keys,
            config_digest,
            epoch: Epoch(0),
            highest_certified,
            commit_votes,
            local_outcomes: BTreeMap::new(),
            future_proof: None,
            carried_over: None,
            now: Duration::ZERO,
        }
    }

    pub fn highest_certified(&self) -> &CertifiedPrepareOrCommit {
        &self.highest_certified
    }

    /// The most recent verified carry-over decision and its epoch.
    pub fn carried_over(&self) -> Option<&(Epoch, CarryOverDecision)> {
        self.carried_over.as_ref()
    }

    pub fn epoch_start_verifications(&self) -> u64 {
        self.epoch_start.verifications()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Commit votes
    // ═══════════════════════════════════════════════════════════════════════════

    /// Vote to commit a finalized report.
    pub fn on_report_finalized(
        &mut self,
        ctx: ReportContext,
        report: &AttestedReportMany,
    ) -> Vec<Action> {
        let seq_nr = ctx.seq_nr();
        if seq_nr <= self.highest_certified.seq_nr() {
            trace!(%ctx, seq_nr = seq_nr.0, "Finalized report already certified");
            return vec![];
        }

        let digest = outcome_digest(&report.report);
        self.local_outcomes.insert(
            seq_nr,
            LocalOutcome {
                epoch: ctx.epoch,
                digest,
                outcome: report.report.clone(),
            },
        );
        while self.local_outcomes.len() > MAX_POOLED_PER_SENDER {
            self.local_outcomes.pop_first();
        }

        let message = commit_message(&self.config_digest, ctx.epoch, seq_nr, &digest);
        let mut actions = vec![Action::Broadcast {
            message: ProtocolMessage::CommitVote(CommitVoteMessage {
                epoch: ctx.epoch,
                seq_nr,
                outcome_digest: digest,
                signature: self.keys.offchain.sign(message.as_bytes()),
            }),
        }];
        // Votes that arrived before our own finalization.
        self.verify_pooled_votes(seq_nr);
        actions.extend(self.try_certify(seq_nr));
        actions
    }

    fn on_commit_vote(&mut self, sender: OracleId, vote: CommitVoteMessage) -> Vec<Action> {
        let seq_nr = vote.seq_nr;
        if seq_nr <= self.highest_certified.seq_nr() {
            trace!(sender = sender.0, seq_nr = seq_nr.0, "Commit vote for certified sequence number");
            return vec![];
        }
        match self.commit_votes.put(seq_nr, sender, vote) {
            PoolPutResult::Ok => {}
            rejected => {
                debug!(sender = sender.0, seq_nr = seq_nr.0, ?rejected, "Commit vote not pooled");
                return vec![];
            }
        }
        self.verify_pooled_votes(seq_nr);
        self.try_certify(seq_nr)
    }

    /// Check every unverified vote for `seq_nr` against the local outcome.
    ///
    /// Votes stay unverified until this oracle finalized the same report.
    fn verify_pooled_votes(&mut self, seq_nr: SeqNr) {
        let Some(local) = self.local_outcomes.get(&seq_nr) else {
            return;
        };
        let Some(entries) = self.commit_votes.entries(seq_nr) else {
            return;
        };
        let results: Vec<(OracleId, bool)> = entries
            .iter()
            .filter(|(_, entry)| entry.verified.is_none())
            .map(|(&sender, entry)| {
                let vote = &entry.item;
                let valid = vote.epoch == local.epoch
                    && vote.outcome_digest == local.digest
                    && self.topology.offchain_public_key(sender).is_some_and(|key| {
                        let message =
                            commit_message(&self.config_digest, vote.epoch, seq_nr, &vote.outcome_digest);
                        key.verify(message.as_bytes(), &vote.signature).is_ok()
                    });
                (sender, valid)
            })
            .collect();

        for (sender, valid) in results {
            if !valid {
                warn!(sender = sender.0, seq_nr = seq_nr.0, "Invalid commit vote");
            }
            self.commit_votes.store_verified(seq_nr, sender, valid);
        }
    }

    fn try_certify(&mut self, seq_nr: SeqNr) -> Vec<Action> {
        let (Some(local), Some(entries)) =
            (self.local_outcomes.get(&seq_nr), self.commit_votes.entries(seq_nr))
        else {
            return vec![];
        };
        let signatures: Vec<_> = entries
            .iter()
            .filter(|(_, entry)| entry.verified == Some(true))
            .map(|(&signer, entry)| AttributedOffchainSignature {
                signer,
                signature: entry.item.signature.clone(),
            })
            .collect();
        let need = self.topology.byzantine_quorum();
        if signatures.len() < need {
            trace!(seq_nr = seq_nr.0, votes = signatures.len(), need, "Waiting for commit votes");
            return vec![];
        }

        let certificate = CertifiedPrepareOrCommit::Commit(CertifiedCommit {
            epoch: local.epoch,
            seq_nr,
            outcome_digest: local.digest,
            outcome: local.outcome.clone(),
            quorum_certificate: QuorumCertificate { signatures },
        });
        info!(epoch = local.epoch.0, seq_nr = seq_nr.0, "Report certified");
        self.adopt(certificate)
    }

    /// Make `certificate` the highest certified state if it is higher.
    fn adopt(&mut self, certificate: CertifiedPrepareOrCommit) -> Vec<Action> {
        if certificate.timestamp() <= self.highest_certified.timestamp() {
            return vec![];
        }
        let seq_nr = certificate.seq_nr();
        self.commit_votes.reap_completed(seq_nr);
        self.local_outcomes = self.local_outcomes.split_off(&SeqNr(seq_nr.0 + 1));
        self.highest_certified = certificate.clone();
        vec![Action::PersistHighestCertified { certificate }]
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Carry-over
    // ═══════════════════════════════════════════════════════════════════════════

    /// Hand the new leader our highest certified state.
    pub fn on_epoch_started(&mut self, epoch: Epoch, leader: OracleId) -> Vec<Action> {
        self.epoch = epoch;
        let mut actions = Vec::new();

        if self.highest_certified.epoch() < epoch {
            let response = EpochStartResponse::new(
                &self.config_digest,
                epoch,
                self.highest_certified.clone(),
                &self.keys.offchain,
            );
            debug!(
                epoch = epoch.0,
                leader = leader.0,
                seq_nr = self.highest_certified.seq_nr().0,
                "Sending epoch start response"
            );
            actions.push(Action::SendTo {
                recipient: leader,
                message: ProtocolMessage::EpochStart(EpochStartMessage { epoch, response }),
            });
        }

        if let Some(proof) = self.future_proof.take() {
            if proof.epoch == epoch {
                actions.extend(self.apply_proof(proof));
            } else if proof.epoch > epoch {
                self.future_proof = Some(proof);
            }
        }
        actions
    }

    fn on_epoch_start(&mut self, sender: OracleId, message: EpochStartMessage) -> Vec<Action> {
        if message.epoch < self.epoch {
            trace!(sender = sender.0, epoch = message.epoch.0, "Epoch start response for past epoch");
            return vec![];
        }
        match self.epoch_start.add(sender, message.epoch, message.response) {
            Ok(Some(proof)) => vec![Action::Broadcast {
                message: ProtocolMessage::EpochStartProof(EpochStartProofMessage { proof }),
            }],
            Ok(None) => vec![],
            Err(e) => {
                debug!(sender = sender.0, epoch = message.epoch.0, error = %e, "Epoch start response dropped");
                vec![]
            }
        }
    }

    fn on_epoch_start_proof(&mut self, sender: OracleId, proof: EpochStartProof) -> Vec<Action> {
        if self.topology.leader_for(proof.epoch) != sender {
            warn!(sender = sender.0, epoch = proof.epoch.0, "Epoch start proof not from the epoch's leader");
            return vec![];
        }
        if proof.epoch < self.epoch {
            trace!(epoch = proof.epoch.0, "Epoch start proof for past epoch");
            return vec![];
        }
        if proof.epoch > self.epoch {
            if self.future_proof.as_ref().map_or(true, |held| proof.epoch > held.epoch) {
                self.future_proof = Some(proof);
            }
            return vec![];
        }
        self.apply_proof(proof)
    }

    fn apply_proof(&mut self, proof: EpochStartProof) -> Vec<Action> {
        let decision = match proof.verify(self.topology.as_ref(), &self.config_digest) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(epoch = proof.epoch.0, error = %e, "Invalid epoch start proof");
                return vec![];
            }
        };
        self.carried_over = Some((proof.epoch, decision.clone()));
        match decision {
            CarryOverDecision::ResumeAfter(seq_nr) => {
                info!(epoch = proof.epoch.0, seq_nr = seq_nr.0, "Epoch resumes after certified commit");
                self.adopt(proof.highest_certified)
            }
            CarryOverDecision::Repropose { seq_nr, .. } => {
                // Only commits are produced here; a prepare can only come
                // from another implementation.
                warn!(epoch = proof.epoch.0, seq_nr = seq_nr.0, "Carried-over prepare ignored");
                vec![]
            }
        }
    }
}

impl SubStateMachine for CertifiedState {
    fn try_handle(&mut self, event: &Event) -> Option<Vec<Action>> {
        match event {
            Event::ReportFinalized { ctx, report } => Some(self.on_report_finalized(*ctx, report)),
            Event::EpochStarted { epoch, leader } => Some(self.on_epoch_started(*epoch, *leader)),
            Event::MessageReceived { sender, message }
                if message.destination() == SubProtocol::Certified =>
            {
                Some(match message.clone() {
                    ProtocolMessage::CommitVote(vote) => self.on_commit_vote(*sender, vote),
                    ProtocolMessage::EpochStart(m) => self.on_epoch_start(*sender, m),
                    ProtocolMessage::EpochStartProof(m) => self.on_epoch_start_proof(*sender, m.proof),
                    _ => vec![],
                })
            }
            _ => None,
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }
}
