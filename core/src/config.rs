use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::errors::{self, ConfigError};

/// Environment variable holding an inline YAML configuration.
pub const CONFIG_ENV_VAR: &str = "INGEST_CONFIG";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    pub batching: BatchingConfig,
    pub ladder: LadderConfig,
    pub sink: SinkConfig,
    pub record: RecordConfig,
    /// Emit a progress line every this many seen records. Zero disables it.
    pub progress_interval: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batching: BatchingConfig::default(),
            ladder: LadderConfig::default(),
            sink: SinkConfig::default(),
            record: RecordConfig::default(),
            progress_interval: 100_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// Starting target size, also the upper bound the controller recovers to.
    pub initial_batch_size: usize,
    pub floor_batch_size: usize,
    pub increase_step: usize,
    /// Batches at or below this length are never split.
    pub min_splittable_size: usize,
    pub split_factor: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            initial_batch_size: 10_000,
            floor_batch_size: 1_000,
            increase_step: 2_000,
            min_splittable_size: 1_000,
            split_factor: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LadderConfig {
    /// Resource ceilings in bytes, largest first.
    pub ceilings: Vec<u64>,
    pub recovery_pause_ms: u64,
    /// First rung of the ladder used for split sub-batches. When unset the
    /// sub-batches only get the smallest ceiling.
    pub split_start_ceiling: Option<u64>,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            ceilings: vec![500_000_000, 300_000_000, 150_000_000, 100_000_000],
            recovery_pause_ms: 1_000,
            split_start_ceiling: None,
        }
    }
}

impl LadderConfig {
    pub fn recovery_pause(&self) -> Duration {
        Duration::from_millis(self.recovery_pause_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Program and leading arguments of the client, e.g. `["clickhouse", "client"]`.
    pub command: Vec<String>,
    pub max_parser_depth: u32,
    /// Extra client settings passed as `--key=value`.
    pub settings: BTreeMap<String, String>,
    /// Substrings of the client's stderr that signal resource exhaustion.
    pub resource_exhausted_markers: Vec<String>,
    pub submit_timeout_secs: Option<u64>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            command: vec!["clickhouse".to_string(), "client".to_string()],
            max_parser_depth: 10_000,
            settings: BTreeMap::new(),
            resource_exhausted_markers: vec!["MEMORY_LIMIT_EXCEEDED".to_string()],
            submit_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Field each record is wrapped under. `None` sends records unwrapped.
    pub envelope_field: Option<String>,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            envelope_field: Some("data".to_string()),
        }
    }
}

pub fn load_config(config_path: Option<&str>) -> errors::Result<IngestConfig> {
    match config_path {
        Some(path) => IngestConfig::from_file(path),
        None => match std::env::var(CONFIG_ENV_VAR) {
            Ok(_) => IngestConfig::from_env(),
            Err(_) => Ok(IngestConfig::default()),
        },
    }
}

impl IngestConfig {
    pub fn from_file(path: &str) -> errors::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            location: path.to_string(),
            error: Box::new(e),
        })?;
        let config: IngestConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn from_env() -> errors::Result<Self> {
        let config_str = std::env::var(CONFIG_ENV_VAR).map_err(|e| ConfigError::LoadFailed {
            location: CONFIG_ENV_VAR.to_string(),
            error: Box::new(e),
        })?;
        let config: IngestConfig = serde_yaml::from_str(&config_str)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let batching = &self.batching;
        if batching.floor_batch_size == 0 {
            return Err(invalid("floor_batch_size must be at least 1"));
        }
        if batching.floor_batch_size > batching.initial_batch_size {
            return Err(invalid(format!(
                "floor_batch_size ({}) cannot exceed initial_batch_size ({})",
                batching.floor_batch_size, batching.initial_batch_size
            )));
        }
        if batching.split_factor < 2 {
            return Err(invalid("split_factor must be at least 2"));
        }

        if self.ladder.ceilings.is_empty() {
            return Err(invalid("ladder.ceilings cannot be empty"));
        }
        if self.ladder.ceilings.contains(&0) {
            return Err(invalid("ladder.ceilings must be positive"));
        }
        if self.ladder.ceilings.windows(2).any(|w| w[0] <= w[1]) {
            return Err(invalid("ladder.ceilings must be strictly decreasing"));
        }
        match self.ladder.split_start_ceiling {
            Some(0) => return Err(invalid("ladder.split_start_ceiling must be positive")),
            Some(start) if start >= self.ladder.ceilings[0] => {
                return Err(invalid(format!(
                    "ladder.split_start_ceiling ({start}) must be below the largest ceiling ({})",
                    self.ladder.ceilings[0]
                )));
            }
            _ => {}
        }

        if self.sink.command.is_empty() || self.sink.command[0].is_empty() {
            return Err(invalid("sink.command must name a program"));
        }
        if self.sink.resource_exhausted_markers.iter().any(|m| m.is_empty()) {
            return Err(invalid("sink.resource_exhausted_markers cannot contain empty strings"));
        }
        if let Some(field) = &self.record.envelope_field {
            if field.is_empty() {
                return Err(invalid("record.envelope_field cannot be empty"));
            }
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::ValidationFailed {
        reason: reason.into(),
    }
}
