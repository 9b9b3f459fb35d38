pub mod batch;
pub mod config;
pub mod controller;
pub mod errors;
pub mod ingestor;
pub mod ladder;
pub mod record;
pub mod sink;
pub mod source;
pub mod splitter;
pub mod telemetry;

pub use config::IngestConfig;
pub use errors::{IngestionError, Result};
pub use ingestor::Ingestor;
