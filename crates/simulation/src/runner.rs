//! Deterministic simulation runner.
//!
//! Each oracle has its own plugin. When an oracle emits
//! `Action::InvokePlugin`, the runner calls that oracle's plugin inline and
//! feeds the callback event back at the same simulated instant.

use crate::event_queue::EventKey;
use crate::network::{NetworkConfig, SimulatedNetwork};
use crate::plugin::SimPlugin;
use crate::NodeIndex;
use attestor_core::{
    Action, Database, DatabaseError, Event, InMemoryDatabase, RecoveredState, ReportingPlugin,
    StateMachine, TimerId,
};
use attestor_messages::ProtocolMessage;
use attestor_node::{NodeConfigError, OracleStateMachine};
use attestor_types::{
    AttestedReportMany, OffchainKeyPair, OnchainKeyPair, OracleId, OracleIdentity, OracleKeys,
    ProtocolConfig, ReportContext, StaticTopology, Topology,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Errors restarting a crashed oracle.
#[derive(Debug, Error)]
pub enum RestartError {
    #[error("oracle {0} does not exist")]
    UnknownNode(NodeIndex),

    #[error("loading recovered state: {0}")]
    Database(#[from] DatabaseError),

    #[error("rebuilding state machine: {0}")]
    Node(#[from] NodeConfigError),
}

/// A report an oracle handed to its contract transmitter.
#[derive(Debug, Clone)]
pub struct TransmissionRecord {
    pub node: NodeIndex,
    pub time: Duration,
    pub ctx: ReportContext,
    pub report: AttestedReportMany,
}

/// A report an oracle accepted as final.
#[derive(Debug, Clone)]
pub struct FinalizedRecord {
    pub node: NodeIndex,
    pub time: Duration,
    pub ctx: ReportContext,
    pub report: AttestedReportMany,
}

/// Statistics collected during simulation.
#[derive(Debug, Default, Clone)]
pub struct SimulationStats {
    /// Total events processed.
    pub events_processed: u64,
    /// Events processed by priority.
    pub events_by_priority: [u64; 3],
    /// Total actions generated.
    pub actions_generated: u64,
    /// Messages sent (successfully scheduled for delivery).
    pub messages_sent: u64,
    /// Messages dropped due to network partition.
    pub messages_dropped_partition: u64,
    /// Messages dropped due to packet loss.
    pub messages_dropped_loss: u64,
    /// Events discarded because their oracle had crashed.
    pub events_dropped_crashed: u64,
    pub timers_set: u64,
    pub timers_cancelled: u64,
    pub plugin_calls: u64,
    /// Storage actions applied to oracle databases.
    pub storage_writes: u64,
}

impl SimulationStats {
    /// Total messages dropped (partition + packet loss).
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped_partition + self.messages_dropped_loss
    }
}

/// Deterministic simulation runner.
///
/// Processes events in deterministic order and executes actions.
/// Given the same seed, produces identical results every run.
pub struct SimulationRunner {
    /// All oracles in the simulation, indexed by NodeIndex.
    nodes: Vec<OracleStateMachine>,

    /// Per-oracle plugin. Index corresponds to node index.
    plugins: Vec<Arc<dyn ReportingPlugin>>,

    /// Per-oracle keys, kept for fault injection in tests.
    keys: Vec<Arc<OracleKeys>>,

    /// Per-oracle topology and storage, kept to rebuild restarted oracles.
    topologies: Vec<Arc<dyn Topology>>,
    databases: Vec<Arc<InMemoryDatabase>>,
    protocol_config: ProtocolConfig,

    /// Oracles that stopped processing events.
    crashed: BTreeSet<NodeIndex>,

    /// Global event queue, ordered deterministically.
    event_queue: BTreeMap<EventKey, Event>,

    /// Sequence counter for deterministic ordering.
    sequence: u64,

    /// Current simulation time.
    now: Duration,

    /// Network simulator.
    network: SimulatedNetwork,

    /// RNG for network conditions (seeded for determinism).
    rng: ChaCha8Rng,

    /// Timer registry for cancellation support.
    /// Maps (node, timer_id) -> event_key for removal.
    timers: HashMap<(NodeIndex, TimerId), EventKey>,

    stats: SimulationStats,
    transmissions: Vec<TransmissionRecord>,
    finalized: Vec<FinalizedRecord>,
}

impl SimulationRunner {
    /// Create a runner for `network_config.num_oracles` oracles.
    ///
    /// Keys are derived from `seed`. Every oracle starts with a
    /// [`SimPlugin`] observing a slightly different value.
    pub fn new(
        network_config: NetworkConfig,
        protocol_config: ProtocolConfig,
        seed: u64,
    ) -> Result<Self, NodeConfigError> {
        let network = SimulatedNetwork::new(network_config.clone());
        let rng = ChaCha8Rng::seed_from_u64(seed);

        let mut key_rng = ChaCha8Rng::seed_from_u64(seed.wrapping_mul(0x517cc1b727220a95));
        let keys: Vec<Arc<OracleKeys>> = (0..network_config.num_oracles)
            .map(|_| {
                let offchain = OffchainKeyPair::generate(&mut key_rng);
                let onchain = OnchainKeyPair::generate(&mut key_rng);
                Arc::new(OracleKeys::new(offchain, onchain))
            })
            .collect();
        let identities: Vec<OracleIdentity> = keys
            .iter()
            .map(|k| OracleIdentity {
                offchain_public_key: k.offchain.public_key(),
                onchain_public_key: k.onchain.public_key(),
            })
            .collect();

        let mut nodes = Vec::with_capacity(keys.len());
        let mut topologies = Vec::with_capacity(keys.len());
        for (i, oracle_keys) in keys.iter().enumerate() {
            let topology = StaticTopology::new(
                OracleId(i as u8),
                protocol_config.f,
                identities.clone(),
            )?
            .into_arc();
            nodes.push(OracleStateMachine::new(
                topology.clone(),
                oracle_keys.clone(),
                protocol_config.clone(),
                RecoveredState::default(),
            )?);
            topologies.push(topology);
        }
        let databases = (0..nodes.len())
            .map(|_| Arc::new(InMemoryDatabase::new()))
            .collect();

        let plugins: Vec<Arc<dyn ReportingPlugin>> = (0..nodes.len())
            .map(|i| Arc::new(SimPlugin::new(1_000 + i as u64)) as Arc<dyn ReportingPlugin>)
            .collect();

        info!(
            num_oracles = nodes.len(),
            f = protocol_config.f,
            report_quorum = protocol_config.report_quorum,
            seed,
            "Created simulation runner"
        );

        Ok(Self {
            nodes,
            plugins,
            keys,
            topologies,
            databases,
            protocol_config,
            crashed: BTreeSet::new(),
            event_queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            network,
            rng,
            timers: HashMap::new(),
            stats: SimulationStats::default(),
            transmissions: Vec::new(),
            finalized: Vec::new(),
        })
    }

    /// Replace an oracle's plugin. Call before [`initialize`](Self::initialize).
    pub fn set_plugin(&mut self, node: NodeIndex, plugin: Arc<dyn ReportingPlugin>) {
        if let Some(slot) = self.plugins.get_mut(node as usize) {
            *slot = plugin;
        }
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn node(&self, index: NodeIndex) -> Option<&OracleStateMachine> {
        self.nodes.get(index as usize)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Keys of an oracle, for crafting byzantine messages in tests.
    pub fn oracle_keys(&self, index: NodeIndex) -> Option<&Arc<OracleKeys>> {
        self.keys.get(index as usize)
    }

    /// What an oracle has persisted so far.
    pub fn database(&self, index: NodeIndex) -> Option<&Arc<InMemoryDatabase>> {
        self.databases.get(index as usize)
    }

    pub fn network_mut(&mut self) -> &mut SimulatedNetwork {
        &mut self.network
    }

    /// Reports handed to contract transmitters, in order.
    pub fn transmissions(&self) -> &[TransmissionRecord] {
        &self.transmissions
    }

    /// Reports accepted as final, by any oracle, in order.
    pub fn finalized(&self) -> &[FinalizedRecord] {
        &self.finalized
    }

    /// Reports accepted as final by one oracle.
    pub fn finalized_by(&self, node: NodeIndex) -> impl Iterator<Item = &FinalizedRecord> {
        self.finalized.iter().filter(move |r| r.node == node)
    }

    /// Stop an oracle: it processes no further events and sends nothing.
    pub fn crash_node(&mut self, node: NodeIndex) {
        info!(node, time = ?self.now, "Crashing oracle");
        self.crashed.insert(node);
    }

    /// Bring a crashed oracle back from its database.
    ///
    /// Everything queued for the old instance is discarded. The new state
    /// machine is built from the recovered state and initialized at the
    /// current simulated time.
    pub fn restart_node(&mut self, node: NodeIndex) -> Result<(), RestartError> {
        let index = node as usize;
        let (Some(topology), Some(keys), Some(database)) = (
            self.topologies.get(index),
            self.keys.get(index),
            self.databases.get(index),
        ) else {
            return Err(RestartError::UnknownNode(node));
        };

        let recovered = database.load_recovered_state()?;
        let mut state = OracleStateMachine::new(
            topology.clone(),
            keys.clone(),
            self.protocol_config.clone(),
            recovered,
        )?;
        state.set_time(self.now);

        self.event_queue.retain(|key, _| key.node_index != node);
        self.timers.retain(|(timer_node, _), _| *timer_node != node);
        self.nodes[index] = state;
        self.crashed.remove(&node);
        info!(node, time = ?self.now, "Restarted oracle from storage");

        let actions = self.nodes[index].initialize();
        for action in actions {
            self.process_action(node, action);
        }
        Ok(())
    }

    /// Deliver `message` from `from` to `to` after `delay`, bypassing the
    /// network.
    pub fn inject_message(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        delay: Duration,
        message: ProtocolMessage,
    ) {
        let event = Event::MessageReceived {
            sender: OracleId(from as u8),
            message,
        };
        self.schedule_event(to, self.now + delay, event);
    }

    /// Start every oracle's pacemaker.
    pub fn initialize(&mut self) {
        for node_index in 0..self.nodes.len() as NodeIndex {
            let actions = self.nodes[node_index as usize].initialize();
            for action in actions {
                self.process_action(node_index, action);
            }
        }
    }

    /// Run simulation until no more events or time limit reached.
    pub fn run_until(&mut self, end_time: Duration) {
        trace!(
            end_time_secs = end_time.as_secs_f64(),
            "Running simulation step"
        );

        while let Some(entry) = self.event_queue.first_entry() {
            if entry.key().time > end_time {
                debug!(
                    remaining_events = self.event_queue.len(),
                    "Time limit reached"
                );
                break;
            }

            let (key, event) = entry.remove_entry();
            self.now = key.time;
            let node_index = key.node_index;

            if self.crashed.contains(&node_index) {
                self.stats.events_dropped_crashed += 1;
                continue;
            }

            trace!(
                time = ?self.now,
                node = node_index,
                "Processing event"
            );

            self.stats.events_processed += 1;
            self.stats.events_by_priority[event.priority() as usize] += 1;

            let node = &mut self.nodes[node_index as usize];
            node.set_time(self.now);
            let actions = node.handle(event);

            self.stats.actions_generated += actions.len() as u64;
            self.stats.storage_writes +=
                actions.iter().filter(|a| a.is_storage_write()).count() as u64;

            for action in actions {
                self.process_action(node_index, action);
            }
        }
        self.now = self.now.max(end_time);

        trace!(
            events_processed = self.stats.events_processed,
            actions_generated = self.stats.actions_generated,
            final_time = ?self.now,
            "Simulation step complete"
        );
    }

    /// Process an action from a node.
    fn process_action(&mut self, from: NodeIndex, action: Action) {
        match action {
            Action::Broadcast { message } => {
                for to in self.network.all_nodes() {
                    self.send(from, to, message.clone());
                }
            }

            Action::SendTo { recipient, message } => {
                self.send(from, recipient.0 as NodeIndex, message);
            }

            Action::SetTimer { id, duration } => {
                let fire_time = self.now + duration;
                let key = self.schedule_event(from, fire_time, id.into_event());
                if let Some(previous) = self.timers.insert((from, id), key) {
                    self.event_queue.remove(&previous);
                }
                self.stats.timers_set += 1;
            }

            Action::CancelTimer { id } => {
                if let Some(key) = self.timers.remove(&(from, id)) {
                    if self.event_queue.remove(&key).is_some() {
                        self.stats.timers_cancelled += 1;
                    }
                }
            }

            Action::EnqueueInternal { event } => {
                if let Event::ReportFinalized { ctx, report } = &event {
                    self.finalized.push(FinalizedRecord {
                        node: from,
                        time: self.now,
                        ctx: *ctx,
                        report: report.clone(),
                    });
                }
                self.schedule_event(from, self.now, event);
            }

            // Plugin calls complete instantly in simulation.
            Action::InvokePlugin { call } => {
                self.stats.plugin_calls += 1;
                let event = call.execute(self.plugins[from as usize].as_ref());
                self.schedule_event(from, self.now, event);
            }

            Action::PersistPacemakerState { .. }
            | Action::PersistHighestCertified { .. }
            | Action::PersistPendingTransmission { .. }
            | Action::DeletePendingTransmission { .. } => {
                if let Err(e) = self.persist(from, &action) {
                    warn!(node = from, error = %e, action = action.type_name(), "Storage write failed");
                }
            }

            Action::TransmitReport { ctx, report } => {
                info!(node = from, %ctx, "Transmitting report");
                self.transmissions.push(TransmissionRecord {
                    node: from,
                    time: self.now,
                    ctx,
                    report,
                });
            }
        }
    }

    /// Apply a storage action to the oracle's database.
    fn persist(&self, node: NodeIndex, action: &Action) -> Result<(), DatabaseError> {
        let database = &self.databases[node as usize];
        match action {
            Action::PersistPacemakerState { snapshot } => database.write_pacemaker_state(*snapshot),
            Action::PersistHighestCertified { certificate } => {
                database.write_highest_certified(certificate)
            }
            Action::PersistPendingTransmission { transmission } => {
                database.store_pending_transmission(transmission)
            }
            Action::DeletePendingTransmission { ctx } => database.delete_pending_transmission(ctx),
            _ => Ok(()),
        }
    }

    /// Send a message; loopback skips the network.
    fn send(&mut self, from: NodeIndex, to: NodeIndex, message: ProtocolMessage) {
        let event = Event::MessageReceived {
            sender: OracleId(from as u8),
            message,
        };
        if from == to {
            self.schedule_event(to, self.now, event);
        } else {
            self.try_deliver_message(from, to, event);
        }
    }

    /// Schedule an event.
    fn schedule_event(&mut self, node: NodeIndex, time: Duration, event: Event) -> EventKey {
        self.sequence += 1;
        let key = EventKey::new(time, &event, node, self.sequence);
        self.event_queue.insert(key, event);
        key
    }

    /// Try to deliver a message, accounting for partitions and packet loss.
    fn try_deliver_message(&mut self, from: NodeIndex, to: NodeIndex, event: Event) {
        // Partition check does not consume RNG.
        if self.network.is_partitioned(from, to) {
            self.stats.messages_dropped_partition += 1;
            trace!(from, to, "Message dropped by partition");
            return;
        }
        if self.network.should_drop_packet(&mut self.rng) {
            self.stats.messages_dropped_loss += 1;
            trace!(from, to, "Message dropped by packet loss");
            return;
        }

        let latency = self.network.sample_latency(&mut self.rng);
        self.stats.messages_sent += 1;
        self.schedule_event(to, self.now + latency, event);
    }
}
