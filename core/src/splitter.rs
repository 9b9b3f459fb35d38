use tracing::{info, warn};

use crate::batch::Batch;
use crate::config::BatchingConfig;
use crate::ladder::{Ladder, LadderOutcome};
use crate::sink::SinkClient;

/// Totals for one split of a failing batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitReport {
    pub parts: usize,
    pub committed: usize,
    pub lost: usize,
    pub parts_lost: usize,
}

/// Single-level split of a batch that failed at the smallest ceiling.
///
/// Every part gets one pass through the reduced ladder. Parts that still fail
/// are lost; they are never split again.
#[derive(Debug, Clone)]
pub struct Splitter {
    min_splittable: usize,
    split_factor: usize,
}

impl Splitter {
    pub fn new(min_splittable: usize, split_factor: usize) -> Self {
        Self {
            min_splittable,
            split_factor: split_factor.max(2),
        }
    }

    pub fn from_config(config: &BatchingConfig) -> Self {
        Self::new(config.min_splittable_size, config.split_factor)
    }

    pub fn should_split(&self, batch: &Batch) -> bool {
        batch.len() > self.min_splittable
    }

    pub async fn resolve<S: SinkClient>(
        &self,
        sink: &S,
        batch: &Batch,
        ladder: &Ladder,
    ) -> SplitReport {
        let parts = batch.split(self.split_factor);
        let total = parts.len();
        info!(records = batch.len(), parts = total, "splitting failed batch");

        let mut report = SplitReport {
            parts: total,
            ..SplitReport::default()
        };
        for (idx, part) in parts.iter().enumerate() {
            match ladder.submit(sink, part).await {
                LadderOutcome::Committed { committed, .. } => {
                    let shortfall = part.len().saturating_sub(committed);
                    report.committed += part.len() - shortfall;
                    report.lost += shortfall;
                    info!(part = idx + 1, parts = total, records = part.len(), "split part loaded");
                }
                LadderOutcome::Exhausted { detail } | LadderOutcome::Failed { detail } => {
                    report.lost += part.len();
                    report.parts_lost += 1;
                    warn!(part = idx + 1, parts = total, records = part.len(), %detail, "split part failed");
                }
            }
        }
        report
    }
}
