//! Integration tests running real-time oracle sets over the in-memory
//! transport.
//!
//! Protocol intervals are scaled down so a few rounds fit in about a second.

use attestor_core::{ContractTransmitter, PluginError, ReportingPlugin, TransmitError};
use attestor_production::{InMemoryNetwork, ProductionRunner, Transport};
use attestor_types::test_utils::{test_oracle_set, TestOracleSet};
use attestor_types::{
    AttestedReportMany, AttributedObservation, OffchainKeyPair, OnchainKeyPair, OracleId,
    OracleKeys, ProtocolConfig, ReportContext,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn fast_config() -> ProtocolConfig {
    ProtocolConfig::default()
        .with_delta_progress(Duration::from_secs(3))
        .with_delta_resend(Duration::from_millis(300))
        .with_delta_round(Duration::from_millis(200))
        .with_delta_grace(Duration::from_millis(50))
        .with_delta_stage(Duration::from_millis(50))
        .with_plugin_deadline(Duration::from_millis(100))
}

/// Reports the median of `u64` observations.
struct MedianPlugin {
    value: u64,
    observation_delay: Duration,
}

impl MedianPlugin {
    fn new(value: u64) -> Self {
        Self {
            value,
            observation_delay: Duration::ZERO,
        }
    }

    fn decode(bytes: &[u8]) -> Option<u64> {
        Some(u64::from_be_bytes(bytes.try_into().ok()?))
    }
}

impl ReportingPlugin for MedianPlugin {
    fn query(&self, _ctx: &ReportContext) -> Result<Vec<u8>, PluginError> {
        Ok(b"price".to_vec())
    }

    fn observation(&self, _ctx: &ReportContext, _query: &[u8]) -> Result<Vec<u8>, PluginError> {
        std::thread::sleep(self.observation_delay);
        Ok(self.value.to_be_bytes().to_vec())
    }

    fn report(
        &self,
        _ctx: &ReportContext,
        _query: &[u8],
        observations: &[AttributedObservation],
    ) -> Result<(bool, Vec<u8>), PluginError> {
        let mut values: Vec<u64> = observations
            .iter()
            .filter_map(|o| Self::decode(&o.observation))
            .collect();
        values.sort_unstable();
        match values.get(values.len() / 2) {
            Some(median) => Ok((true, median.to_be_bytes().to_vec())),
            None => Err(PluginError::Failed("no observations".into())),
        }
    }

    fn should_accept_finalized_report(
        &self,
        _ctx: &ReportContext,
        _report: &AttestedReportMany,
    ) -> Result<bool, PluginError> {
        Ok(true)
    }

    fn should_transmit_accepted_report(
        &self,
        _ctx: &ReportContext,
        _report: &AttestedReportMany,
    ) -> Result<bool, PluginError> {
        Ok(true)
    }
}

type Transmitted = Arc<Mutex<Vec<(OracleId, ReportContext, AttestedReportMany)>>>;

struct RecordingTransmitter {
    oracle: OracleId,
    log: Transmitted,
}

impl ContractTransmitter for RecordingTransmitter {
    fn transmit(
        &self,
        ctx: &ReportContext,
        report: &AttestedReportMany,
    ) -> Result<(), TransmitError> {
        self.log.lock().push((self.oracle, *ctx, report.clone()));
        Ok(())
    }
}

/// Private keys matching `test_oracle_set`'s public identities.
fn oracle_keys(index: usize) -> Arc<OracleKeys> {
    let seed = [index as u8 + 1; 32];
    Arc::new(OracleKeys::new(
        OffchainKeyPair::from_seed(seed),
        OnchainKeyPair::from_secret(seed).unwrap(),
    ))
}

struct Cluster {
    set: TestOracleSet,
    network: Arc<InMemoryNetwork>,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<Result<(), attestor_production::RunnerError>>>,
    transmitted: Transmitted,
}

impl Cluster {
    fn start(n: usize, config: ProtocolConfig, plugin_for: impl Fn(usize) -> MedianPlugin) -> Self {
        let set = test_oracle_set(n);
        let (network, receivers) = InMemoryNetwork::new(n, 256);
        let shutdown = CancellationToken::new();
        let transmitted: Transmitted = Arc::default();

        let handles = receivers
            .into_iter()
            .enumerate()
            .map(|(index, inbound_rx)| {
                let oracle = OracleId(index as u8);
                let runner = ProductionRunner::builder()
                    .topology(set.topology(oracle).into_arc())
                    .keys(oracle_keys(index))
                    .config(config.clone())
                    .plugin(Arc::new(plugin_for(index)))
                    .transmitter(Arc::new(RecordingTransmitter {
                        oracle,
                        log: Arc::clone(&transmitted),
                    }))
                    .transport(Arc::new(network.transport(oracle)), inbound_rx)
                    .cancellation(shutdown.child_token())
                    .build()
                    .unwrap();
                tokio::spawn(runner.run())
            })
            .collect();

        Self {
            set,
            network,
            shutdown,
            handles,
            transmitted,
        }
    }

    async fn stop(self) -> Transmitted {
        self.shutdown.cancel();
        for handle in self.handles {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .expect("runner did not stop")
                .expect("runner panicked")
                .expect("runner failed");
        }
        self.transmitted
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cluster_certifies_and_transmits() {
    let config = fast_config();
    let quorum = config.report_quorum;
    let cluster = Cluster::start(4, config, |i| MedianPlugin::new(100 + i as u64));
    let set_topology = cluster.set.topology(OracleId(0));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let transmitted = cluster.stop().await;
    let transmitted = transmitted.lock();

    assert!(!transmitted.is_empty(), "no report was transmitted");
    for (_, ctx, report) in transmitted.iter() {
        report
            .verify(ctx, &set_topology, quorum)
            .expect("transmitted report is certified");
        let median = MedianPlugin::decode(&report.report).unwrap();
        assert!((100..=103).contains(&median));
    }

    // Every oracle eventually transmits the first round's report.
    let mut first_round: Vec<_> = transmitted
        .iter()
        .filter(|(_, ctx, _)| ctx.round.0 == 1 && ctx.epoch.0 == 1)
        .map(|(oracle, _, _)| oracle.0)
        .collect();
    first_round.sort_unstable();
    first_round.dedup();
    assert_eq!(first_round, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_cancellation_stops_runners() {
    let cluster = Cluster::start(4, fast_config(), |_| MedianPlugin::new(1));
    tokio::time::sleep(Duration::from_millis(50)).await;
    // `stop` asserts every runner exits cleanly within the timeout.
    cluster.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_garbage_frames_are_ignored() {
    let cluster = Cluster::start(4, fast_config(), |_| MedianPlugin::new(7));

    // An authenticated peer sending undecodable frames is only logged.
    let peer = cluster.network.transport(OracleId(3));
    for _ in 0..10 {
        let _ = peer.broadcast(vec![0xff; 16]);
    }

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let transmitted = cluster.stop().await;
    assert!(!transmitted.lock().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_observer_misses_deadline_without_stalling() {
    // Oracle 0 always overruns the 100ms plugin deadline; three timely
    // observations still reach the 2f+1 threshold.
    let cluster = Cluster::start(4, fast_config(), |i| {
        let mut plugin = MedianPlugin::new(50);
        if i == 0 {
            plugin.observation_delay = Duration::from_millis(400);
        }
        plugin
    });

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let transmitted = cluster.stop().await;
    let transmitted = transmitted.lock();
    assert!(!transmitted.is_empty());
    for (_, _, report) in transmitted.iter() {
        assert_eq!(MedianPlugin::decode(&report.report), Some(50));
    }
}
