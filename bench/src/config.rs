use anyhow::{Context, Result};
use ledger::ContractRef;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::tracker::Strategy;

fn default_repetitions() -> usize {
    1
}

fn default_round_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_strategy() -> Strategy {
    Strategy::Events
}

/// Full run configuration, loaded from a JSON file with CLI overrides on top.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// Operation counts to benchmark, in order.
    pub counts: Vec<usize>,
    /// How many times the whole count list is repeated.
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,
    /// Commitment deadline per round.
    #[serde(default = "default_round_timeout_ms")]
    pub round_timeout_ms: u64,
    /// Tick interval of the polling strategy.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,
    /// The deployed contract this run drives.
    pub contract: ContractRef,
    /// Replica that receives the writes.
    pub write_target: SocketAddr,
    /// Replica the reads go to. Defaults to the write target.
    #[serde(default)]
    pub read_target: Option<SocketAddr>,
    /// Replicas whose commitment events confirm a write (events strategy).
    /// Defaults to the write target.
    #[serde(default)]
    pub commit_targets: Vec<SocketAddr>,
    /// Replica whose blocks are polled (polling strategy). Defaults to the
    /// write target.
    #[serde(default)]
    pub poll_target: Option<SocketAddr>,
    /// Where to write the JSON run report.
    #[serde(default)]
    pub report_path: Option<PathBuf>,
    /// Seed for key generation; fresh entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        let config: RunConfig = serde_json::from_str(&raw)
            .with_context(|| format!("malformed configuration file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.counts.is_empty() {
            anyhow::bail!("configuration must list at least one operation count");
        }
        if self.counts.iter().any(|count| *count == 0) {
            anyhow::bail!("operation counts must be positive");
        }
        if self.repetitions == 0 {
            anyhow::bail!("repetition count must be positive");
        }
        Ok(())
    }

    pub fn read_target(&self) -> SocketAddr {
        self.read_target.unwrap_or(self.write_target)
    }

    pub fn poll_target(&self) -> SocketAddr {
        self.poll_target.unwrap_or(self.write_target)
    }

    pub fn commit_targets(&self) -> Vec<SocketAddr> {
        if self.commit_targets.is_empty() {
            vec![self.write_target]
        } else {
            self.commit_targets.clone()
        }
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Outer abandonment ceiling per round: well above the commitment
    /// deadline, so the tracker always gets to return a partial result first.
    pub fn round_ceiling(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms.saturating_mul(2) + 10_000)
    }
}
