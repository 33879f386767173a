//! Node configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config file.
//! The binary layers `--bind`/`--member` flags on top of what the file holds.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::invocation::types::InvocationPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Number of fixed partitions the keyspace is split into.
    #[serde(default = "default_partition_count")]
    pub partition_count: u32,

    /// Synchronous backups kept per partition.
    #[serde(default = "default_backup_count")]
    pub backup_count: usize,

    #[serde(default)]
    pub invocation: InvocationConfig,

    #[serde(default)]
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationConfig {
    #[serde(default = "default_try_count")]
    pub try_count: u32,

    /// Fixed pause between retries; it never grows.
    #[serde(default = "default_try_pause_ms")]
    pub try_pause_ms: u64,

    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// How long a completed primary waits for its backup acks.
    #[serde(default = "default_backup_timeout_ms")]
    pub backup_timeout_ms: u64,

    #[serde(default)]
    pub fail_on_indeterminate_operation_state: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Upper bound on a single HTTP hand-off.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

fn default_partition_count() -> u32 {
    271
}

fn default_backup_count() -> usize {
    1
}

fn default_try_count() -> u32 {
    250
}

fn default_try_pause_ms() -> u64 {
    500
}

fn default_call_timeout_ms() -> u64 {
    60_000
}

fn default_backup_timeout_ms() -> u64 {
    5_000
}

fn default_send_timeout_ms() -> u64 {
    1_000
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            partition_count: default_partition_count(),
            backup_count: default_backup_count(),
            invocation: InvocationConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            try_count: default_try_count(),
            try_pause_ms: default_try_pause_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            backup_timeout_ms: default_backup_timeout_ms(),
            fail_on_indeterminate_operation_state: false,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl GridConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: GridConfig = serde_json::from_str(raw).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.partition_count == 0 {
            bail!("partition_count must be positive");
        }
        if self.invocation.try_count == 0 {
            bail!("invocation.try_count must be positive");
        }
        if self.invocation.call_timeout_ms == 0 {
            bail!("invocation.call_timeout_ms must be positive");
        }
        if self.invocation.backup_timeout_ms == 0 {
            bail!("invocation.backup_timeout_ms must be positive");
        }
        if self.transport.send_timeout_ms == 0 {
            bail!("transport.send_timeout_ms must be positive");
        }
        Ok(())
    }

    /// The policy every invocation starts from unless a caller overrides it.
    pub fn default_policy(&self) -> InvocationPolicy {
        InvocationPolicy {
            try_count: self.invocation.try_count,
            try_pause: Duration::from_millis(self.invocation.try_pause_ms),
            call_timeout: Duration::from_millis(self.invocation.call_timeout_ms),
            backup_timeout: Duration::from_millis(self.invocation.backup_timeout_ms),
            deserialize_response: true,
            fail_on_indeterminate_operation_state: self
                .invocation
                .fail_on_indeterminate_operation_state,
        }
    }
}
