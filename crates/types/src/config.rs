//! Protocol configuration.

use crate::ConfigDigest;
use std::time::Duration;
use thiserror::Error;

/// Errors detected when validating a [`ProtocolConfig`] against an oracle set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("n = {n} oracles cannot tolerate f = {f} faults (need n > 3f)")]
    TooFewOracles { n: usize, f: usize },

    #[error("report_quorum = {quorum} must be greater than f = {f} and at most n = {n}")]
    InvalidReportQuorum { quorum: usize, f: usize, n: usize },

    #[error("r_max must be at least 1")]
    ZeroRMax,

    #[error("duration {0} must be non-zero")]
    ZeroDuration(&'static str),

    #[error("limit {0} must be non-zero")]
    ZeroLimit(&'static str),
}

/// Size bounds enforced on every inbound message before any processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLimits {
    /// Number of oracles; bounds attributed observation and signature lists.
    pub n: usize,
    pub max_query_length: usize,
    pub max_observation_length: usize,
    pub max_report_length: usize,
}

/// Parameters of the reporting protocol.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Maximum number of faulty oracles.
    pub f: usize,
    /// Matching report attestations the leader needs before finalizing.
    pub report_quorum: usize,
    /// Maximum number of rounds per epoch.
    pub r_max: u8,

    /// How long without progress before the leader is suspected.
    pub delta_progress: Duration,
    /// Interval between `NewEpoch` re-broadcasts.
    pub delta_resend: Duration,
    /// Minimum time between round starts.
    pub delta_round: Duration,
    /// Time to wait for slow observations after reaching 2f+1.
    pub delta_grace: Duration,
    /// Per-position delay between oracles' transmission attempts.
    pub delta_stage: Duration,

    /// Deadlines for plugin calls.
    pub max_duration_query: Duration,
    pub max_duration_observation: Duration,
    pub max_duration_report: Duration,
    pub max_duration_should_accept: Duration,
    pub max_duration_should_transmit: Duration,

    pub max_query_length: usize,
    pub max_observation_length: usize,
    pub max_report_length: usize,

    /// Capacity of each per-sender buffer for future-epoch messages.
    pub message_buffer_capacity: usize,
    /// Maximum accepted reports waiting for their transmission slot.
    pub max_pending_transmissions: usize,

    pub config_digest: ConfigDigest,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            f: 1,
            report_quorum: 2,
            r_max: 10,
            delta_progress: Duration::from_secs(10),
            delta_resend: Duration::from_secs(2),
            delta_round: Duration::from_secs(2),
            delta_grace: Duration::from_millis(500),
            delta_stage: Duration::from_secs(1),
            max_duration_query: Duration::from_secs(1),
            max_duration_observation: Duration::from_secs(1),
            max_duration_report: Duration::from_secs(1),
            max_duration_should_accept: Duration::from_secs(1),
            max_duration_should_transmit: Duration::from_secs(1),
            max_query_length: 1024,
            max_observation_length: 1024,
            max_report_length: 4096,
            message_buffer_capacity: 10,
            max_pending_transmissions: 16,
            config_digest: ConfigDigest([0u8; 32]),
        }
    }
}

impl ProtocolConfig {
    /// Create a configuration tolerating `f` faults with the given report quorum.
    pub fn new(f: usize, report_quorum: usize) -> Self {
        Self {
            f,
            report_quorum,
            ..Default::default()
        }
    }

    /// Set the config digest.
    pub fn with_config_digest(mut self, config_digest: ConfigDigest) -> Self {
        self.config_digest = config_digest;
        self
    }

    /// Set the maximum number of rounds per epoch.
    pub fn with_r_max(mut self, r_max: u8) -> Self {
        self.r_max = r_max;
        self
    }

    /// Set the progress timeout.
    pub fn with_delta_progress(mut self, delta: Duration) -> Self {
        self.delta_progress = delta;
        self
    }

    /// Set the `NewEpoch` resend interval.
    pub fn with_delta_resend(mut self, delta: Duration) -> Self {
        self.delta_resend = delta;
        self
    }

    /// Set the round interval.
    pub fn with_delta_round(mut self, delta: Duration) -> Self {
        self.delta_round = delta;
        self
    }

    /// Set the grace period.
    pub fn with_delta_grace(mut self, delta: Duration) -> Self {
        self.delta_grace = delta;
        self
    }

    /// Set the transmission stagger step.
    pub fn with_delta_stage(mut self, delta: Duration) -> Self {
        self.delta_stage = delta;
        self
    }

    /// Set one deadline for every plugin call.
    pub fn with_plugin_deadline(mut self, deadline: Duration) -> Self {
        self.max_duration_query = deadline;
        self.max_duration_observation = deadline;
        self.max_duration_report = deadline;
        self.max_duration_should_accept = deadline;
        self.max_duration_should_transmit = deadline;
        self
    }

    /// Set query, observation and report length limits.
    pub fn with_length_limits(mut self, query: usize, observation: usize, report: usize) -> Self {
        self.max_query_length = query;
        self.max_observation_length = observation;
        self.max_report_length = report;
        self
    }

    /// Set the per-sender future-epoch buffer capacity.
    pub fn with_message_buffer_capacity(mut self, capacity: usize) -> Self {
        self.message_buffer_capacity = capacity;
        self
    }

    /// Size limits for an oracle set of `n` members.
    pub fn message_limits(&self, n: usize) -> MessageLimits {
        MessageLimits {
            n,
            max_query_length: self.max_query_length,
            max_observation_length: self.max_observation_length,
            max_report_length: self.max_report_length,
        }
    }

    /// Check the configuration against an oracle set of `n` members.
    pub fn validate(&self, n: usize) -> Result<(), ConfigError> {
        if n <= 3 * self.f {
            return Err(ConfigError::TooFewOracles { n, f: self.f });
        }
        if self.report_quorum <= self.f || self.report_quorum > n {
            return Err(ConfigError::InvalidReportQuorum {
                quorum: self.report_quorum,
                f: self.f,
                n,
            });
        }
        if self.r_max == 0 {
            return Err(ConfigError::ZeroRMax);
        }

        let durations = [
            ("delta_progress", self.delta_progress),
            ("delta_resend", self.delta_resend),
            ("delta_round", self.delta_round),
            ("delta_grace", self.delta_grace),
            ("max_duration_query", self.max_duration_query),
            ("max_duration_observation", self.max_duration_observation),
            ("max_duration_report", self.max_duration_report),
            ("max_duration_should_accept", self.max_duration_should_accept),
            ("max_duration_should_transmit", self.max_duration_should_transmit),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::ZeroDuration(*name));
        }

        let limits = [
            ("max_query_length", self.max_query_length),
            ("max_observation_length", self.max_observation_length),
            ("max_report_length", self.max_report_length),
            ("message_buffer_capacity", self.message_buffer_capacity),
            ("max_pending_transmissions", self.max_pending_transmissions),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, l)| *l == 0) {
            return Err(ConfigError::ZeroLimit(*name));
        }

        Ok(())
    }
}
