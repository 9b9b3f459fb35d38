use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::batch::Batch;
use crate::config::LadderConfig;
use crate::errors::ConfigError;
use crate::sink::{Outcome, SinkClient};

/// How much the sink may consume while processing one batch, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceCeiling(u64);

impl ResourceCeiling {
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn bytes(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceCeiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LadderOutcome {
    /// The batch went in. `ceiling` is `None` only for empty batches, which
    /// never reach the sink.
    Committed {
        committed: usize,
        ceiling: Option<ResourceCeiling>,
    },
    /// Every rung reported resource exhaustion; carries the last detail.
    Exhausted { detail: String },
    /// A non-resource failure stopped the descent.
    Failed { detail: String },
}

/// Strictly decreasing resource ceilings tried in order for a single batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ladder {
    rungs: Vec<ResourceCeiling>,
    pause: Duration,
}

impl Ladder {
    pub fn new(ceilings: &[u64], pause: Duration) -> Result<Self, ConfigError> {
        if ceilings.is_empty() {
            return Err(ConfigError::Invalid {
                message: "resource ladder needs at least one ceiling".to_string(),
            });
        }
        if ceilings.contains(&0) || ceilings.windows(2).any(|w| w[0] <= w[1]) {
            return Err(ConfigError::Invalid {
                message: format!("resource ladder must be positive and strictly decreasing: {ceilings:?}"),
            });
        }
        Ok(Self {
            rungs: ceilings.iter().copied().map(ResourceCeiling::new).collect(),
            pause,
        })
    }

    pub fn from_config(config: &LadderConfig) -> Result<Self, ConfigError> {
        Self::new(&config.ceilings, config.recovery_pause())
    }

    pub fn rungs(&self) -> &[ResourceCeiling] {
        &self.rungs
    }

    pub fn smallest(&self) -> ResourceCeiling {
        // non-empty by construction
        self.rungs[self.rungs.len() - 1]
    }

    /// The shorter ladder used for split sub-batches: `start` followed by
    /// every rung strictly below it, or only the smallest rung when no start
    /// is given.
    pub fn reduced(&self, start: Option<ResourceCeiling>) -> Ladder {
        let rungs = match start {
            None => vec![self.smallest()],
            Some(start) => std::iter::once(start)
                .chain(self.rungs.iter().copied().filter(|c| *c < start))
                .collect(),
        };
        Ladder {
            rungs,
            pause: self.pause,
        }
    }

    /// Walks the ladder until the batch commits, a non-resource failure
    /// occurs, or the rungs run out. Pauses between resource failures so the
    /// sink can recover.
    pub async fn submit<S: SinkClient>(&self, sink: &S, batch: &Batch) -> LadderOutcome {
        if batch.is_empty() {
            return LadderOutcome::Committed {
                committed: 0,
                ceiling: None,
            };
        }

        let mut last_detail = String::new();
        for (step, &ceiling) in self.rungs.iter().enumerate() {
            match sink.submit(batch, ceiling).await {
                Outcome::Success { committed } => {
                    if step > 0 {
                        info!(%ceiling, records = batch.len(), "batch committed at reduced ceiling");
                    }
                    return LadderOutcome::Committed {
                        committed,
                        ceiling: Some(ceiling),
                    };
                }
                Outcome::ResourceExhausted { detail } => {
                    warn!(%ceiling, records = batch.len(), "resource ceiling exceeded");
                    last_detail = detail;
                    if step + 1 < self.rungs.len() && !self.pause.is_zero() {
                        tokio::time::sleep(self.pause).await;
                    }
                }
                Outcome::OtherFailure { detail } => {
                    warn!(%ceiling, records = batch.len(), %detail, "sink rejected batch");
                    return LadderOutcome::Failed { detail };
                }
            }
        }
        LadderOutcome::Exhausted {
            detail: last_detail,
        }
    }
}
