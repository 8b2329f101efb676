//! Attestor local cluster
//!
//! Runs a full oracle set in one process over an in-memory network, with a
//! demo price plugin and a transmitter that logs every certified report.
//!
//! # Usage
//!
//! ```bash
//! # Four oracles for 30 seconds
//! attestor-cluster --oracles 4 --duration-secs 30
//!
//! # Protocol parameters from a file, run until Ctrl-C
//! attestor-cluster --config attestor.toml --duration-secs 0
//! ```
//!
//! Only the `[protocol]` table of the config file is used; keys are derived
//! from `--seed`.

use anyhow::{bail, Context, Result};
use attestor_core::{ContractTransmitter, PluginError, ReportingPlugin, TransmitError};
use attestor_production::{
    init_telemetry, ConfigFile, InMemoryNetwork, ProductionRunner, TelemetryConfig,
};
use attestor_types::{
    AttestedReportMany, AttributedObservation, OffchainKeyPair, OnchainKeyPair, OracleId,
    OracleIdentity, OracleKeys, ProtocolConfig, ReportContext, StaticTopology,
};
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Attestor local cluster
///
/// Runs an in-process oracle set producing certified reports.
#[derive(Parser, Debug)]
#[command(name = "attestor-cluster")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Number of oracles
    #[arg(short = 'n', long, default_value_t = 4)]
    oracles: usize,

    /// Path to a configuration file (TOML); only `[protocol]` is read
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for key generation
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// How long to run; 0 runs until Ctrl-C
    #[arg(long, default_value_t = 30)]
    duration_secs: u64,

    /// Per-oracle inbound channel capacity
    #[arg(long, default_value_t = 1024)]
    channel_capacity: usize,

    /// Log filter (RUST_LOG takes precedence)
    #[arg(long)]
    log_filter: Option<String>,
}

/// Observes a synthetic price that drifts with wall-clock time and reports
/// the median.
struct DemoPricePlugin {
    oracle: OracleId,
}

impl DemoPricePlugin {
    fn decode(bytes: &[u8]) -> Option<u64> {
        Some(u64::from_be_bytes(bytes.try_into().ok()?))
    }
}

impl ReportingPlugin for DemoPricePlugin {
    fn query(&self, ctx: &ReportContext) -> Result<Vec<u8>, PluginError> {
        Ok(format!("ETH-USD/{}/{}", ctx.epoch.0, ctx.round.0).into_bytes())
    }

    fn observation(&self, _ctx: &ReportContext, _query: &[u8]) -> Result<Vec<u8>, PluginError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| PluginError::Failed(e.to_string()))?;
        let price = 3_000_000 + (now.as_secs() % 600) * 100 + u64::from(self.oracle.0);
        Ok(price.to_be_bytes().to_vec())
    }

    fn report(
        &self,
        _ctx: &ReportContext,
        _query: &[u8],
        observations: &[AttributedObservation],
    ) -> Result<(bool, Vec<u8>), PluginError> {
        let mut prices: Vec<u64> = observations
            .iter()
            .filter_map(|o| Self::decode(&o.observation))
            .collect();
        if prices.is_empty() {
            return Err(PluginError::Failed("no decodable observations".into()));
        }
        prices.sort_unstable();
        Ok((true, prices[prices.len() / 2].to_be_bytes().to_vec()))
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

/// Logs each certified report in place of submitting it on-chain.
struct LoggingTransmitter {
    oracle: OracleId,
}

impl ContractTransmitter for LoggingTransmitter {
    fn transmit(
        &self,
        ctx: &ReportContext,
        report: &AttestedReportMany,
    ) -> Result<(), TransmitError> {
        let price = DemoPricePlugin::decode(&report.report)
            .ok_or_else(|| TransmitError::Rejected("report is not a price".into()))?;
        info!(
            oracle = self.oracle.0,
            %ctx,
            price,
            signatures = report.attributed_signatures.len(),
            "Transmitting certified report"
        );
        Ok(())
    }
}

fn protocol_config(cli: &Cli) -> Result<ProtocolConfig> {
    match &cli.config {
        Some(path) => {
            let file = ConfigFile::load(path)?;
            if !file.oracles.is_empty() {
                warn!("Ignoring [[oracles]]: cluster keys are derived from --seed");
            }
            Ok(file.protocol_config()?)
        }
        None => {
            let f = cli.oracles.saturating_sub(1) / 3;
            Ok(ProtocolConfig::new(f, f + 1))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(&TelemetryConfig {
        filter: cli.log_filter.clone(),
        ..Default::default()
    })
    .context("failed to initialize logging")?;

    if cli.oracles == 0 || cli.oracles > usize::from(u8::MAX) {
        bail!("--oracles must be between 1 and {}", u8::MAX);
    }
    let config = protocol_config(&cli)?;

    let mut rng = ChaCha8Rng::seed_from_u64(cli.seed);
    let keys: Vec<Arc<OracleKeys>> = (0..cli.oracles)
        .map(|_| {
            let offchain = OffchainKeyPair::generate(&mut rng);
            let onchain = OnchainKeyPair::generate(&mut rng);
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

    let (network, receivers) = InMemoryNetwork::new(cli.oracles, cli.channel_capacity);
    let shutdown = CancellationToken::new();
    let mut handles = Vec::with_capacity(cli.oracles);

    for (index, inbound_rx) in receivers.into_iter().enumerate() {
        let oracle = OracleId(index as u8);
        let topology = StaticTopology::new(oracle, config.f, identities.clone())
            .with_context(|| format!("invalid oracle set for oracle {index}"))?;

        let runner = ProductionRunner::builder()
            .topology(topology.into_arc())
            .keys(Arc::clone(&keys[index]))
            .config(config.clone())
            .plugin(Arc::new(DemoPricePlugin { oracle }))
            .transmitter(Arc::new(LoggingTransmitter { oracle }))
            .transport(Arc::new(network.transport(oracle)), inbound_rx)
            .cancellation(shutdown.child_token())
            .build()
            .with_context(|| format!("failed to build oracle {index}"))?;

        handles.push(tokio::spawn(runner.run()));
    }

    info!(
        oracles = cli.oracles,
        f = config.f,
        report_quorum = config.report_quorum,
        "Cluster started"
    );

    if cli.duration_secs == 0 {
        signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
        info!("Ctrl-C received, shutting down");
    } else {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(cli.duration_secs)) => {
                info!(duration_secs = cli.duration_secs, "Run complete, shutting down");
            }
            result = signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                info!("Ctrl-C received, shutting down");
            }
        }
    }

    shutdown.cancel();
    for handle in handles {
        handle.await.context("oracle task panicked")??;
    }
    Ok(())
}
