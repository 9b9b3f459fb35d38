use anyhow::{Context, Result, bail};
use clap::Parser;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ingest_core::config::{IngestConfig, load_config};
use ingest_core::ingestor::Ingestor;
use ingest_core::sink::clickhouse::validate_table_name;
use ingest_core::sink::{ClickHouseSink, DryRunSink, SinkClient};
use ingest_core::source::{FileChainSource, ReaderSource};
use ingest_core::telemetry::{IngestReport, init_tracing};

/// Stream newline-delimited JSON into a ClickHouse table with adaptive
/// batch sizing.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Destination table, optionally qualified as `database.table`
    table: String,

    /// YAML configuration file. Falls back to $INGEST_CONFIG, then defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input files read in order. Reads stdin when none are given
    #[arg(short, long = "input")]
    inputs: Vec<PathBuf>,

    /// Validate and batch without contacting the database
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    json: bool,

    #[arg(long)]
    initial_batch_size: Option<usize>,

    #[arg(long)]
    floor_batch_size: Option<usize>,

    #[arg(long)]
    increase_step: Option<usize>,

    #[arg(long)]
    min_splittable_size: Option<usize>,

    #[arg(long)]
    split_factor: Option<usize>,

    /// Resource ceilings in bytes, largest first, e.g. 500000000,300000000
    #[arg(long, value_delimiter = ',')]
    ladder: Option<Vec<u64>>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut IngestConfig) {
        let batching = &mut config.batching;
        if let Some(size) = self.initial_batch_size {
            batching.initial_batch_size = size;
        }
        if let Some(size) = self.floor_batch_size {
            batching.floor_batch_size = size;
        }
        if let Some(step) = self.increase_step {
            batching.increase_step = step;
        }
        if let Some(size) = self.min_splittable_size {
            batching.min_splittable_size = size;
        }
        if let Some(factor) = self.split_factor {
            batching.split_factor = factor;
        }
        if let Some(ladder) = &self.ladder {
            config.ladder.ceilings = ladder.clone();
        }
    }
}

/// Entry point for a one-shot load.
///
/// What it does at a high-level:
///     Load config, apply command-line overrides.
///     Stream input lines through the ingestor until input ends or Ctrl-C.
///     Report seen/loaded/lost/success rate.
#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config_path = cli.config.as_ref().map(|p| p.display().to_string());
    let mut config =
        load_config(config_path.as_deref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;
    validate_table_name(&cli.table).context("Invalid destination table")?;

    let cancel = CancellationToken::new();
    info!(table = %cli.table, dry_run = cli.dry_run, "Starting streaming data loading");

    let load = async {
        let report = if cli.dry_run {
            run_with_sink(&cli, &config, DryRunSink::new(), &cancel).await?
        } else {
            let sink = ClickHouseSink::new(&cli.table, &config.sink)
                .context("Failed to set up ClickHouse sink")?;
            run_with_sink(&cli, &config, sink, &cancel).await?
        };
        Ok::<_, anyhow::Error>(report)
    };

    // dropping `load` kills the sink client of the in-flight batch
    let report = tokio::select! {
        report = load => report?,
        _ = interrupted_twice(tokio::signal::ctrl_c, cancel.clone()) => {
            bail!("interrupted twice, abandoned the in-flight batch");
        }
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    }
    Ok(())
}

/// Resolves on the second interrupt. The first one only cancels `cancel`, so
/// the ingestor stops reading and finishes the batch it is loading.
async fn interrupted_twice<F, Fut>(mut signal: F, cancel: CancellationToken)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal().await {
        warn!(error = %e, "cannot listen for interrupts");
        return std::future::pending().await;
    }
    warn!("received interrupt, stopping after the current batch (interrupt again to abort it)");
    cancel.cancel();

    if signal().await.is_err() {
        return std::future::pending().await;
    }
    warn!("received second interrupt, aborting");
}

async fn run_with_sink<S: SinkClient>(
    cli: &Cli,
    config: &IngestConfig,
    sink: S,
    cancel: &CancellationToken,
) -> Result<IngestReport> {
    let mut ingestor = Ingestor::new(config, sink).context("Failed to initialize ingestor")?;

    let report = if cli.inputs.is_empty() {
        info!("Loading from stdin");
        ingestor.run(&mut ReaderSource::stdin(), cancel).await
    } else {
        info!(files = cli.inputs.len(), "Loading from input files");
        ingestor
            .run(&mut FileChainSource::new(cli.inputs.clone()), cancel)
            .await
    };
    Ok(report)
}
