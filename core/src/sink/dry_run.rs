use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

use crate::batch::Batch;
use crate::ladder::ResourceCeiling;
use crate::sink::{Outcome, SinkClient};

/// Accepts every batch without sending it anywhere.
#[derive(Debug, Default)]
pub struct DryRunSink {
    submissions: AtomicUsize,
}

impl DryRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::Relaxed)
    }
}

impl SinkClient for DryRunSink {
    async fn submit(&self, batch: &Batch, ceiling: ResourceCeiling) -> Outcome {
        self.submissions.fetch_add(1, Ordering::Relaxed);
        info!(records = batch.len(), %ceiling, "DRY RUN: would insert batch");
        Outcome::Success {
            committed: batch.len(),
        }
    }
}
