//! Production runner implementation.

use crate::timers::{TimerFire, TimerManager};
use crate::transport::{InboundFrame, Transport};
use attestor_core::{
    Action, ContractTransmitter, Database, DatabaseError, Event, InMemoryDatabase, PluginCall,
    PluginError, ReportingPlugin, StateMachine,
};
use attestor_messages::{decode_message, encode_message, ProtocolMessage};
use attestor_node::{NodeConfigError, OracleStateMachine};
use attestor_types::{
    AttestedReportMany, OracleId, OracleKeys, ProtocolConfig, ReportContext, Topology,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, span, trace, warn, Level};

/// Errors from the production runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Invalid node configuration: {0}")]
    Node(#[from] NodeConfigError),

    #[error("Loading recovered state: {0}")]
    Database(#[from] DatabaseError),
}

/// Builder for constructing a [`ProductionRunner`].
///
/// Required fields:
/// - `topology` - The oracle set as seen by this oracle
/// - `keys` - This oracle's offchain and on-chain keys
/// - `config` - Protocol parameters
/// - `plugin` - The reporting plugin
/// - `transmitter` - Where certified reports go
/// - `transport` - Outbound frames, plus the matching inbound receiver
///
/// Optional fields:
/// - `database` - Durable protocol state (defaults to an in-memory store)
/// - `cancellation` - Parent token (defaults to a fresh one)
/// - `timer_channel_capacity` - Timer event channel capacity (defaults to 64)
pub struct ProductionRunnerBuilder {
    topology: Option<Arc<dyn Topology>>,
    keys: Option<Arc<OracleKeys>>,
    config: Option<ProtocolConfig>,
    plugin: Option<Arc<dyn ReportingPlugin>>,
    transmitter: Option<Arc<dyn ContractTransmitter>>,
    transport: Option<Arc<dyn Transport>>,
    inbound_rx: Option<mpsc::Receiver<InboundFrame>>,
    database: Option<Arc<dyn Database>>,
    cancellation: Option<CancellationToken>,
    timer_channel_capacity: usize,
}

impl Default for ProductionRunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductionRunnerBuilder {
    pub fn new() -> Self {
        Self {
            topology: None,
            keys: None,
            config: None,
            plugin: None,
            transmitter: None,
            transport: None,
            inbound_rx: None,
            database: None,
            cancellation: None,
            timer_channel_capacity: 64,
        }
    }

    pub fn topology(mut self, topology: Arc<dyn Topology>) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn keys(mut self, keys: Arc<OracleKeys>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn config(mut self, config: ProtocolConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn plugin(mut self, plugin: Arc<dyn ReportingPlugin>) -> Self {
        self.plugin = Some(plugin);
        self
    }

    pub fn transmitter(mut self, transmitter: Arc<dyn ContractTransmitter>) -> Self {
        self.transmitter = Some(transmitter);
        self
    }

    /// Set the transport and the receiver its peers deliver into.
    pub fn transport(
        mut self,
        transport: Arc<dyn Transport>,
        inbound_rx: mpsc::Receiver<InboundFrame>,
    ) -> Self {
        self.transport = Some(transport);
        self.inbound_rx = Some(inbound_rx);
        self
    }

    /// Persist protocol state to `database` and recover from it on build.
    pub fn database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    /// Run under `token`: cancelling it stops the runner.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn timer_channel_capacity(mut self, capacity: usize) -> Self {
        self.timer_channel_capacity = capacity;
        self
    }

    /// Build the runner.
    ///
    /// Fails if a required field is missing, the recovered state cannot be
    /// loaded or the node configuration is invalid.
    pub fn build(self) -> Result<ProductionRunner, RunnerError> {
        let topology = self.topology.ok_or(RunnerError::MissingField("topology"))?;
        let keys = self.keys.ok_or(RunnerError::MissingField("keys"))?;
        let config = self.config.ok_or(RunnerError::MissingField("config"))?;
        let plugin = self.plugin.ok_or(RunnerError::MissingField("plugin"))?;
        let transmitter = self
            .transmitter
            .ok_or(RunnerError::MissingField("transmitter"))?;
        let transport = self.transport.ok_or(RunnerError::MissingField("transport"))?;
        let inbound_rx = self.inbound_rx.ok_or(RunnerError::MissingField("transport"))?;

        let database = self
            .database
            .unwrap_or_else(|| Arc::new(InMemoryDatabase::new()));
        let recovered = database.load_recovered_state()?;

        let local = topology.local_oracle_id();
        let state = OracleStateMachine::new(topology, keys, config.clone(), recovered)?;

        // Timers have their own channel so network floods never delay them.
        // Callbacks are unbounded: blocking plugin tasks must never wait on us.
        let (timer_tx, timer_rx) = mpsc::channel(self.timer_channel_capacity);
        let (callback_tx, callback_rx) = mpsc::unbounded_channel();

        Ok(ProductionRunner {
            local,
            state,
            config,
            plugin,
            transmitter,
            transport,
            inbound_rx,
            database,
            timer_rx,
            timer_manager: TimerManager::new(timer_tx),
            callback_tx,
            callback_rx,
            cancellation: self.cancellation.unwrap_or_default(),
            start_time: Instant::now(),
        })
    }
}

/// Drives one [`OracleStateMachine`] with real time, a real transport and
/// real plugin calls.
///
/// A single task owns the state machine and receives events from dedicated
/// channels; nothing else touches it.
pub struct ProductionRunner {
    local: OracleId,
    /// The state machine (owned, not shared).
    state: OracleStateMachine,
    /// Deadlines for plugin calls.
    config: ProtocolConfig,
    plugin: Arc<dyn ReportingPlugin>,
    transmitter: Arc<dyn ContractTransmitter>,
    transport: Arc<dyn Transport>,
    /// Authenticated frames from peers.
    inbound_rx: mpsc::Receiver<InboundFrame>,
    database: Arc<dyn Database>,
    /// Timer fires, checked against the live arming before dispatch.
    timer_rx: mpsc::Receiver<TimerFire>,
    timer_manager: TimerManager,
    /// Plugin results and loopback messages.
    callback_tx: mpsc::UnboundedSender<Event>,
    callback_rx: mpsc::UnboundedReceiver<Event>,
    cancellation: CancellationToken,
    /// Start time for calculating elapsed duration.
    start_time: Instant,
}

impl ProductionRunner {
    /// Create a new builder for constructing a production runner.
    pub fn builder() -> ProductionRunnerBuilder {
        ProductionRunnerBuilder::new()
    }

    pub fn oracle_id(&self) -> OracleId {
        self.local
    }

    /// Token that stops this runner when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Run until cancelled or until the inbound channel closes.
    ///
    /// Channels are polled with a biased select in priority order:
    /// cancellation, timers, callbacks, then network frames.
    pub async fn run(mut self) -> Result<(), RunnerError> {
        info!(
            oracle = self.local.0,
            f = self.config.f,
            r_max = self.config.r_max,
            "Starting production runner"
        );

        let actions = self.state.initialize();
        self.process_actions(actions);

        loop {
            tokio::select! {
                biased;

                _ = self.cancellation.cancelled() => {
                    info!(oracle = self.local.0, "Cancellation received");
                    break;
                }

                Some(fire) = self.timer_rx.recv() => {
                    let Some(event) = self.timer_manager.accept(fire) else {
                        continue;
                    };
                    let event_span = span!(
                        Level::DEBUG,
                        "handle_timer",
                        event.type = event.type_name(),
                        oracle = self.local.0,
                    );
                    let _guard = event_span.enter();
                    self.dispatch(event);
                }

                Some(event) = self.callback_rx.recv() => {
                    let event_span = span!(
                        Level::DEBUG,
                        "handle_callback",
                        event.type = event.type_name(),
                        oracle = self.local.0,
                    );
                    let _guard = event_span.enter();
                    self.dispatch(event);
                }

                frame = self.inbound_rx.recv() => {
                    let Some((sender, bytes)) = frame else {
                        info!(oracle = self.local.0, "Inbound channel closed");
                        break;
                    };
                    match decode_message(&bytes) {
                        Ok(message) => {
                            let event_span = span!(
                                Level::DEBUG,
                                "handle_message",
                                msg_type = message.type_name(),
                                sender = sender.0,
                                oracle = self.local.0,
                            );
                            let _guard = event_span.enter();
                            self.dispatch(Event::MessageReceived { sender, message });
                        }
                        Err(e) => {
                            warn!(sender = sender.0, error = %e, len = bytes.len(), "Dropping undecodable frame");
                        }
                    }
                }
            }
        }

        self.timer_manager.cancel_all();
        info!(oracle = self.local.0, "Production runner stopped");
        Ok(())
    }

    /// Handle an event and everything it enqueues internally.
    ///
    /// Internal events run to completion before the next external input,
    /// matching the simulation's priority ordering.
    fn dispatch(&mut self, event: Event) {
        let mut internal = VecDeque::from([event]);
        while let Some(event) = internal.pop_front() {
            self.state.set_time(self.start_time.elapsed());
            let actions = self.state.handle(event);
            for action in actions {
                match action {
                    Action::EnqueueInternal { event } => internal.push_back(event),
                    other => self.process_action(other),
                }
            }
        }
    }

    fn process_actions(&mut self, actions: Vec<Action>) {
        let mut internal = Vec::new();
        for action in actions {
            match action {
                Action::EnqueueInternal { event } => internal.push(event),
                other => self.process_action(other),
            }
        }
        for event in internal {
            self.dispatch(event);
        }
    }

    /// Execute one non-internal action.
    fn process_action(&mut self, action: Action) {
        match action {
            Action::Broadcast { message } => {
                if let Some(frame) = self.encode(&message) {
                    for e in self.transport.broadcast(frame) {
                        debug!(error = %e, msg_type = message.type_name(), "Broadcast incomplete");
                    }
                }
                self.loopback(message);
            }

            Action::SendTo { recipient, message } => {
                if recipient == self.local {
                    self.loopback(message);
                } else if let Some(frame) = self.encode(&message) {
                    if let Err(e) = self.transport.send_to(recipient, frame) {
                        debug!(error = %e, msg_type = message.type_name(), "Send failed");
                    }
                }
            }

            Action::SetTimer { id, duration } => self.timer_manager.set_timer(id, duration),
            Action::CancelTimer { id } => self.timer_manager.cancel_timer(id),

            Action::EnqueueInternal { event } => {
                // Normally intercepted by `dispatch`; keep ordering if not.
                let _ = self.callback_tx.send(event);
            }

            Action::InvokePlugin { call } => self.spawn_plugin_call(call),

            Action::PersistPacemakerState { .. }
            | Action::PersistHighestCertified { .. }
            | Action::PersistPendingTransmission { .. }
            | Action::DeletePendingTransmission { .. } => {
                // Must be durable before the next action of the batch runs.
                if let Err(e) = self.persist(&action) {
                    error!(error = %e, action = action.type_name(), "Storage write failed");
                }
            }

            Action::TransmitReport { ctx, report } => self.spawn_transmission(ctx, report),
        }
    }

    fn persist(&self, action: &Action) -> Result<(), DatabaseError> {
        match action {
            Action::PersistPacemakerState { snapshot } => {
                self.database.write_pacemaker_state(*snapshot)
            }
            Action::PersistHighestCertified { certificate } => {
                self.database.write_highest_certified(certificate)
            }
            Action::PersistPendingTransmission { transmission } => {
                self.database.store_pending_transmission(transmission)
            }
            Action::DeletePendingTransmission { ctx } => {
                self.database.delete_pending_transmission(ctx)
            }
            _ => Ok(()),
        }
    }

    fn encode(&self, message: &ProtocolMessage) -> Option<Vec<u8>> {
        match encode_message(message) {
            Ok(frame) => Some(frame),
            Err(e) => {
                error!(error = %e, msg_type = message.type_name(), "Failed to encode message");
                None
            }
        }
    }

    /// Deliver our own message to ourselves without the transport.
    fn loopback(&self, message: ProtocolMessage) {
        let _ = self.callback_tx.send(Event::MessageReceived {
            sender: self.local,
            message,
        });
    }

    /// Run a plugin call on the blocking pool under its deadline.
    ///
    /// The result (or the failure) comes back as a callback event.
    fn spawn_plugin_call(&self, call: PluginCall) {
        let deadline = call.deadline(&self.config);
        let plugin = Arc::clone(&self.plugin);
        let callback_tx = self.callback_tx.clone();
        let cancellation = self.cancellation.child_token();
        let name = call.name();
        let ctx = *call.ctx();
        let fallback = call.clone();

        trace!(call = name, %ctx, ?deadline, "Invoking plugin");
        tokio::spawn(async move {
            let task = tokio::task::spawn_blocking(move || call.execute(plugin.as_ref()));
            let event = tokio::select! {
                _ = cancellation.cancelled() => return,
                result = tokio::time::timeout(deadline, task) => match result {
                    Ok(Ok(event)) => event,
                    Ok(Err(join_error)) => {
                        warn!(call = name, %ctx, error = %join_error, "Plugin call panicked");
                        fallback.failed(PluginError::Aborted(join_error.to_string()))
                    }
                    Err(_) => {
                        warn!(call = name, %ctx, ?deadline, "Plugin call exceeded its deadline");
                        fallback.failed(PluginError::DeadlineExceeded(deadline))
                    }
                },
            };
            let _ = callback_tx.send(event);
        });
    }

    fn spawn_transmission(&self, ctx: ReportContext, report: AttestedReportMany) {
        let transmitter = Arc::clone(&self.transmitter);
        tokio::spawn(async move {
            let result =
                tokio::task::spawn_blocking(move || transmitter.transmit(&ctx, &report)).await;
            match result {
                Ok(Ok(())) => info!(%ctx, "Report transmitted"),
                Ok(Err(e)) => warn!(%ctx, error = %e, "Report transmission failed"),
                Err(e) => error!(%ctx, error = %e, "Transmitter task panicked"),
            }
        });
    }
}
