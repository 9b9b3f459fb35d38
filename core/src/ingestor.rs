use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch::{Batch, BatchAssembler};
use crate::config::IngestConfig;
use crate::controller::BatchSizeController;
use crate::errors;
use crate::ladder::{Ladder, LadderOutcome, ResourceCeiling};
use crate::record::{RecordValidator, preview};
use crate::sink::SinkClient;
use crate::source::LineSource;
use crate::splitter::{SplitReport, Splitter};
use crate::telemetry::{Counters, IngestReport};

/// How a top-level batch was finally settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Committed { records: usize },
    Split(SplitReport),
    Lost { records: usize },
}

/// The ingestor orchestrates the data flow from source -> sink.
///
/// Batches are resolved strictly one at a time: each goes through the
/// resource ladder, then the splitter if needed, before the next one is
/// assembled. The controller is updated once per top-level batch.
pub struct Ingestor<S> {
    sink: S,
    validator: RecordValidator,
    ladder: Ladder,
    split_ladder: Ladder,
    splitter: Splitter,
    controller: BatchSizeController,
    progress_interval: u64,
    counters: Counters,
}

impl<S: SinkClient> Ingestor<S> {
    pub fn new(config: &IngestConfig, sink: S) -> errors::Result<Self> {
        config.validate()?;
        let ladder = Ladder::from_config(&config.ladder)?;
        let split_ladder = ladder.reduced(
            config
                .ladder
                .split_start_ceiling
                .map(ResourceCeiling::new),
        );

        Ok(Self {
            sink,
            validator: RecordValidator::new(config.record.envelope_field.as_deref()),
            ladder,
            split_ladder,
            splitter: Splitter::from_config(&config.batching),
            controller: BatchSizeController::from_config(&config.batching),
            progress_interval: config.progress_interval,
            counters: Counters::default(),
        })
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn controller(&self) -> &BatchSizeController {
        &self.controller
    }

    /// Reads `source` to the end, or until `cancel` fires, and returns the
    /// final report. Records already assembled when input stops are still
    /// submitted. Per-batch failures are counted, never returned.
    pub async fn run<L: LineSource>(
        &mut self,
        source: &mut L,
        cancel: &CancellationToken,
    ) -> IngestReport {
        let started_at = Utc::now();
        let mut assembler = BatchAssembler::new();
        let mut interrupted = false;

        info!(
            batch_size = self.controller.target(),
            ceilings = ?self.ladder.rungs(),
            "starting ingestion"
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("interrupted, finishing the current batch");
                    interrupted = true;
                    break;
                }
                line = source.next_line() => line,
            };
            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "input failed, finishing with the records read so far");
                    break;
                }
            };
            if let Some(batch) = self.accept(&line, &mut assembler) {
                self.resolve(batch).await;
            }
        }

        let tail = assembler.finish();
        if !tail.is_empty() {
            info!(records = tail.len(), "loading final batch");
            self.resolve(tail).await;
        }

        let report = IngestReport::new(
            self.counters.clone(),
            self.controller.target(),
            interrupted,
            started_at,
        );
        report.log_summary();
        report
    }

    fn accept(&mut self, line: &[u8], assembler: &mut BatchAssembler) -> Option<Batch> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return None;
        }
        self.counters.seen += 1;
        if self.progress_interval > 0 && self.counters.seen % self.progress_interval == 0 {
            info!("Processed {} records so far...", self.counters.seen);
        }

        match self.validator.validate_bytes(line) {
            Some(record) => assembler.push(record, self.controller.target()),
            None => {
                self.counters.dropped += 1;
                debug!(
                    line = preview(&String::from_utf8_lossy(line)),
                    "invalid record skipped"
                );
                None
            }
        }
    }

    /// Settles one batch: ladder first, then controller feedback, then the
    /// splitter when every ceiling was exhausted.
    pub async fn resolve(&mut self, batch: Batch) -> Resolution {
        let records = batch.len();
        self.counters.batches += 1;
        info!(
            records,
            first = self.counters.committed + 1,
            "loading batch"
        );

        match self.ladder.submit(&self.sink, &batch).await {
            LadderOutcome::Committed { committed, ceiling } => {
                let committed = committed.min(records);
                let shortfall = records - committed;
                if shortfall > 0 {
                    warn!(records, committed, "sink committed fewer records than submitted");
                }
                self.counters.committed += committed as u64;
                self.counters.lost += shortfall as u64;
                self.controller.on_success();
                info!(
                    ceiling = ?ceiling.map(ResourceCeiling::bytes),
                    total = self.counters.committed,
                    "batch loaded"
                );
                Resolution::Committed { records: committed }
            }
            LadderOutcome::Exhausted { detail } => {
                self.controller.on_exhausted();
                warn!(
                    records,
                    %detail,
                    next_batch_size = self.controller.target(),
                    "batch failed at every resource ceiling"
                );
                if self.splitter.should_split(&batch) {
                    let report = self
                        .splitter
                        .resolve(&self.sink, &batch, &self.split_ladder)
                        .await;
                    self.counters.batches_split += 1;
                    self.counters.committed += report.committed as u64;
                    self.counters.lost += report.lost as u64;
                    self.counters.sub_batches_lost += report.parts_lost as u64;
                    Resolution::Split(report)
                } else {
                    self.counters.lost += records as u64;
                    Resolution::Lost { records }
                }
            }
            LadderOutcome::Failed { detail } => {
                error!(records, %detail, "batch abandoned");
                self.counters.lost += records as u64;
                Resolution::Lost { records }
            }
        }
    }
}
