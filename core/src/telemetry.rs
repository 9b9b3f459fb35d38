use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Log to stderr so stdout stays free for the JSON report.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ingest_core=info,adaptive_load=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Run-wide record and batch counts. Only ever incremented.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Non-blank input lines.
    pub seen: u64,
    /// Lines rejected by validation.
    pub dropped: u64,
    pub committed: u64,
    /// Valid records that exhausted every retry avenue.
    pub lost: u64,
    pub batches: u64,
    pub batches_split: u64,
    pub sub_batches_lost: u64,
}

impl Counters {
    /// `seen == committed + lost + dropped` once every batch is resolved.
    pub fn is_balanced(&self) -> bool {
        self.seen == self.committed + self.lost + self.dropped
    }

    pub fn success_rate(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.committed as f64 / self.seen as f64
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    #[serde(flatten)]
    pub counters: Counters,
    pub success_rate: f64,
    pub final_batch_size: usize,
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
}

impl IngestReport {
    pub fn new(
        counters: Counters,
        final_batch_size: usize,
        interrupted: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        let finished_at = Utc::now();
        let elapsed_seconds = (finished_at - started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Self {
            success_rate: counters.success_rate(),
            counters,
            final_batch_size,
            interrupted,
            started_at,
            finished_at,
            elapsed_seconds,
        }
    }

    pub fn log_summary(&self) {
        let c = &self.counters;
        info!("FINAL SUMMARY:");
        info!("- Processed: {} input records", c.seen);
        info!("- Loaded: {} records", c.committed);
        info!("- Failed: {} records", c.lost);
        info!("- Invalid: {} records", c.dropped);
        info!("- Batches: {} ({} split)", c.batches, c.batches_split);
        if c.seen > 0 {
            info!("- Success rate: {:.1}%", self.success_rate * 100.0);
        }
        if self.interrupted {
            info!("- Run was interrupted; counts cover the input read so far");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let counters = Counters {
            seen: 12,
            dropped: 2,
            committed: 9,
            lost: 1,
            ..Counters::default()
        };
        assert!(counters.is_balanced());
        assert!((counters.success_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(Counters::default().success_rate(), 0.0);
    }

    #[test]
    fn test_report_serializes_flat() {
        let counters = Counters {
            seen: 4,
            committed: 4,
            batches: 1,
            ..Counters::default()
        };
        let report = IngestReport::new(counters, 5, false, Utc::now());
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["seen"], 4);
        assert_eq!(value["committed"], 4);
        assert_eq!(value["success_rate"], 1.0);
        assert_eq!(value["final_batch_size"], 5);
        assert_eq!(value["interrupted"], false);
        assert!(value["started_at"].is_string());
        assert!(report.elapsed_seconds >= 0.0);
    }
}
