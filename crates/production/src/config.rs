//! TOML configuration files.
//!
//! ```toml
//! [protocol]
//! f = 1
//! report_quorum = 2
//! delta_round_ms = 2000
//! config_digest = "00...00"   # 64 hex chars
//!
//! [[oracles]]
//! offchain_public_key = "..."
//! onchain_public_key = "..."
//! ```
//!
//! Every `[protocol]` key is optional and falls back to
//! [`ProtocolConfig::default`]. Durations are in milliseconds. The oracle
//! list order defines oracle ids.

use attestor_types::{
    ConfigDigest, CryptoError, OffchainPublicKey, OnchainPublicKey, OracleId, OracleIdentity,
    ProtocolConfig, StaticTopology, TopologyError,
};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config_digest must be 32 hex-encoded bytes")]
    InvalidDigest,

    #[error("oracle {index}: invalid {field}: {source}")]
    InvalidKey {
        index: usize,
        field: &'static str,
        #[source]
        source: CryptoError,
    },

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// `[protocol]` table. Unset keys keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolSection {
    pub f: Option<usize>,
    pub report_quorum: Option<usize>,
    pub r_max: Option<u8>,

    pub delta_progress_ms: Option<u64>,
    pub delta_resend_ms: Option<u64>,
    pub delta_round_ms: Option<u64>,
    pub delta_grace_ms: Option<u64>,
    pub delta_stage_ms: Option<u64>,

    /// Applied to every plugin call.
    pub plugin_deadline_ms: Option<u64>,

    pub max_query_length: Option<usize>,
    pub max_observation_length: Option<usize>,
    pub max_report_length: Option<usize>,
    pub message_buffer_capacity: Option<usize>,
    pub max_pending_transmissions: Option<usize>,

    pub config_digest: Option<String>,
}

/// One `[[oracles]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleEntry {
    pub offchain_public_key: String,
    pub onchain_public_key: String,
}

/// A parsed configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub protocol: ProtocolSection,
    #[serde(default)]
    pub oracles: Vec<OracleEntry>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigFileError> {
        Ok(toml::from_str(contents)?)
    }

    /// Protocol parameters with defaults filled in.
    ///
    /// Not validated here; the node validates against the oracle set.
    pub fn protocol_config(&self) -> Result<ProtocolConfig, ConfigFileError> {
        let p = &self.protocol;
        let mut config = ProtocolConfig::default();

        if let Some(f) = p.f {
            config.f = f;
        }
        if let Some(quorum) = p.report_quorum {
            config.report_quorum = quorum;
        }
        if let Some(r_max) = p.r_max {
            config.r_max = r_max;
        }

        let ms = Duration::from_millis;
        if let Some(v) = p.delta_progress_ms {
            config.delta_progress = ms(v);
        }
        if let Some(v) = p.delta_resend_ms {
            config.delta_resend = ms(v);
        }
        if let Some(v) = p.delta_round_ms {
            config.delta_round = ms(v);
        }
        if let Some(v) = p.delta_grace_ms {
            config.delta_grace = ms(v);
        }
        if let Some(v) = p.delta_stage_ms {
            config.delta_stage = ms(v);
        }
        if let Some(v) = p.plugin_deadline_ms {
            config = config.with_plugin_deadline(ms(v));
        }

        if let Some(v) = p.max_query_length {
            config.max_query_length = v;
        }
        if let Some(v) = p.max_observation_length {
            config.max_observation_length = v;
        }
        if let Some(v) = p.max_report_length {
            config.max_report_length = v;
        }
        if let Some(v) = p.message_buffer_capacity {
            config.message_buffer_capacity = v;
        }
        if let Some(v) = p.max_pending_transmissions {
            config.max_pending_transmissions = v;
        }

        if let Some(digest) = &p.config_digest {
            let bytes: [u8; 32] = hex::decode(digest)
                .ok()
                .and_then(|b| b.try_into().ok())
                .ok_or(ConfigFileError::InvalidDigest)?;
            config.config_digest = ConfigDigest(bytes);
        }

        Ok(config)
    }

    /// Decode the oracle list, in id order.
    pub fn identities(&self) -> Result<Vec<OracleIdentity>, ConfigFileError> {
        self.oracles
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let offchain_public_key = OffchainPublicKey::from_hex(&entry.offchain_public_key)
                    .map_err(|source| ConfigFileError::InvalidKey {
                        index,
                        field: "offchain_public_key",
                        source,
                    })?;
                let onchain_public_key = OnchainPublicKey::from_hex(&entry.onchain_public_key)
                    .map_err(|source| ConfigFileError::InvalidKey {
                        index,
                        field: "onchain_public_key",
                        source,
                    })?;
                Ok(OracleIdentity {
                    offchain_public_key,
                    onchain_public_key,
                })
            })
            .collect()
    }

    /// The oracle set as seen by `local`.
    pub fn topology(&self, local: OracleId) -> Result<StaticTopology, ConfigFileError> {
        let f = self.protocol_config()?.f;
        Ok(StaticTopology::new(local, f, self.identities()?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attestor_types::{OffchainKeyPair, OnchainKeyPair, Topology};

    fn oracle_table(count: u8) -> String {
        (0..count)
            .map(|i| {
                let offchain = OffchainKeyPair::from_seed([i + 1; 32]).public_key();
                let onchain = OnchainKeyPair::from_secret([i + 1; 32])
                    .unwrap()
                    .public_key();
                format!(
                    "[[oracles]]\noffchain_public_key = \"{}\"\nonchain_public_key = \"{}\"\n\n",
                    offchain.to_hex(),
                    onchain.to_hex()
                )
            })
            .collect()
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = ConfigFile::parse("").unwrap();
        let config = file.protocol_config().unwrap();
        let default = ProtocolConfig::default();
        assert_eq!(config.f, default.f);
        assert_eq!(config.delta_round, default.delta_round);
        assert!(file.identities().unwrap().is_empty());
    }

    #[test]
    fn test_protocol_overrides() {
        let file = ConfigFile::parse(
            r#"
            [protocol]
            r_max = 3
            delta_round_ms = 250
            plugin_deadline_ms = 50
            max_report_length = 64
            config_digest = "0101010101010101010101010101010101010101010101010101010101010101"
            "#,
        )
        .unwrap();
        let config = file.protocol_config().unwrap();
        assert_eq!(config.r_max, 3);
        assert_eq!(config.delta_round, Duration::from_millis(250));
        assert_eq!(config.max_duration_query, Duration::from_millis(50));
        assert_eq!(config.max_duration_should_transmit, Duration::from_millis(50));
        assert_eq!(config.max_report_length, 64);
        assert_eq!(config.config_digest, ConfigDigest([1; 32]));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ConfigFile::parse("[protocol]\ndelta_rounds_ms = 1\n").unwrap_err();
        assert!(matches!(err, ConfigFileError::Parse(_)));
    }

    #[test]
    fn test_bad_digest_rejected() {
        let file = ConfigFile::parse("[protocol]\nconfig_digest = \"abcd\"\n").unwrap();
        assert!(matches!(
            file.protocol_config(),
            Err(ConfigFileError::InvalidDigest)
        ));
    }

    #[test]
    fn test_topology_from_oracle_table() {
        let file = ConfigFile::parse(&oracle_table(4)).unwrap();
        let topology = file.topology(OracleId(2)).unwrap();
        assert_eq!(topology.local_oracle_id(), OracleId(2));
        assert_eq!(topology.n(), 4);
        assert_eq!(
            topology.offchain_public_key(OracleId(0)),
            Some(OffchainKeyPair::from_seed([1; 32]).public_key())
        );
    }

    #[test]
    fn test_bad_key_names_the_oracle() {
        let mut toml = oracle_table(1);
        toml.push_str("[[oracles]]\noffchain_public_key = \"zz\"\nonchain_public_key = \"00\"\n");
        let file = ConfigFile::parse(&toml).unwrap();
        match file.identities() {
            Err(ConfigFileError::InvalidKey { index, field, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(field, "offchain_public_key");
            }
            other => panic!("expected invalid key, got {other:?}"),
        }
    }
}
