pub mod clickhouse;
pub mod dry_run;

use std::future::Future;

use crate::batch::Batch;
use crate::ladder::ResourceCeiling;

pub use clickhouse::ClickHouseSink;
pub use dry_run::DryRunSink;

/// Result of one attempt to commit a batch under one resource ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { committed: usize },
    /// The sink ran out of the budget it was given. Worth retrying with a
    /// smaller batch or a different ceiling.
    ResourceExhausted { detail: String },
    /// Anything else. Not retried at this batch size.
    OtherFailure { detail: String },
}

/// The `SinkClient` trait defines the contract for any bulk-insert destination.
///
/// A submission is a single attempt: implementations must not retry on their
/// own, the resource ladder owns the retry policy. A failed submission is
/// assumed to have committed nothing.
pub trait SinkClient: Send + Sync {
    fn submit(
        &self,
        batch: &Batch,
        ceiling: ResourceCeiling,
    ) -> impl Future<Output = Outcome> + Send;
}
