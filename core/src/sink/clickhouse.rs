use std::collections::BTreeMap;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::batch::Batch;
use crate::config::SinkConfig;
use crate::errors::{ConfigError, SinkError};
use crate::ladder::ResourceCeiling;
use crate::sink::{Outcome, SinkClient};

/// Bulk inserts through the ClickHouse command-line client.
///
/// Each submission spawns `<command> --max_memory_usage=<ceiling> ... --query
/// "INSERT INTO <table> FORMAT JSONEachRow"` and streams the batch to the
/// child's stdin, one enveloped record per line.
#[derive(Debug, Clone)]
pub struct ClickHouseSink {
    table: String,
    program: String,
    leading_args: Vec<String>,
    max_parser_depth: u32,
    settings: BTreeMap<String, String>,
    markers: Vec<String>,
    timeout: Option<Duration>,
}

impl ClickHouseSink {
    pub fn new(table: &str, config: &SinkConfig) -> Result<Self, ConfigError> {
        validate_table_name(table)?;
        let (program, leading_args) = config.command.split_first().ok_or_else(|| {
            ConfigError::Invalid {
                message: "sink.command must name a program".to_string(),
            }
        })?;

        Ok(Self {
            table: table.to_string(),
            program: program.clone(),
            leading_args: leading_args.to_vec(),
            max_parser_depth: config.max_parser_depth,
            settings: config.settings.clone(),
            markers: config.resource_exhausted_markers.clone(),
            timeout: config.submit_timeout_secs.map(Duration::from_secs),
        })
    }

    pub fn insert_query(&self) -> String {
        format!("INSERT INTO {} FORMAT JSONEachRow", self.table)
    }

    /// Full argument list for one submission, excluding the program.
    pub fn args(&self, ceiling: ResourceCeiling) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.push(format!("--max_memory_usage={ceiling}"));
        args.push(format!("--max_parser_depth={}", self.max_parser_depth));
        for (key, value) in &self.settings {
            args.push(format!("--{key}={value}"));
        }
        args.push("--query".to_string());
        args.push(self.insert_query());
        args
    }

    async fn run(&self, batch: &Batch, ceiling: ResourceCeiling) -> Result<Output, SinkError> {
        let mut command = Command::new(&self.program);
        command
            .args(self.args(ceiling))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own process group: a terminal Ctrl-C reaches only the loader, which
        // lets the in-flight insert finish
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command
            .spawn()
            .map_err(|e| SinkError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| SinkError::Pipe {
            reason: "child stdin was not captured".to_string(),
        })?;
        let payload = batch.to_payload();
        let write = async move {
            let result = stdin.write_all(payload.as_bytes()).await;
            drop(stdin);
            result
        };

        // stdin is fed while stdout/stderr drain, so a chatty client cannot
        // block on a full pipe
        let exchange = async { tokio::join!(write, child.wait_with_output()) };
        let (written, output) = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| SinkError::Timeout {
                    seconds: limit.as_secs(),
                })?,
            None => exchange.await,
        };

        let output = output.map_err(|e| SinkError::Pipe {
            reason: e.to_string(),
        })?;
        if let Err(e) = written {
            // a client that bails out early closes its stdin; its exit status
            // and stderr say why
            if output.status.success() {
                return Err(SinkError::Pipe {
                    reason: e.to_string(),
                });
            }
            debug!(error = %e, "sink client closed stdin early");
        }
        Ok(output)
    }
}

impl SinkClient for ClickHouseSink {
    async fn submit(&self, batch: &Batch, ceiling: ResourceCeiling) -> Outcome {
        debug!(table = %self.table, records = batch.len(), %ceiling, "submitting batch");
        match self.run(batch, ceiling).await {
            Ok(output) if output.status.success() => Outcome::Success {
                committed: batch.len(),
            },
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let detail = match stderr.trim() {
                    "" => format!("client exited with {}", output.status),
                    text => text.to_string(),
                };
                classify_failure(detail, &self.markers)
            }
            Err(e) => Outcome::OtherFailure {
                detail: e.to_string(),
            },
        }
    }
}

/// Maps a failed client run to an outcome by looking for the
/// resource-exhaustion markers in its error text.
pub fn classify_failure(detail: String, markers: &[String]) -> Outcome {
    if markers.iter().any(|marker| detail.contains(marker.as_str())) {
        Outcome::ResourceExhausted { detail }
    } else {
        Outcome::OtherFailure { detail }
    }
}

/// Table names end up inside the query text, so only plain identifiers and a
/// single `database.table` qualifier are accepted.
pub fn validate_table_name(table: &str) -> Result<(), ConfigError> {
    let valid_part = |part: &str| {
        !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|p| valid_part(p)) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            message: format!("invalid table name `{table}`"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::tests::records;

    fn markers() -> Vec<String> {
        vec!["MEMORY_LIMIT_EXCEEDED".to_string()]
    }

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("bluesky").is_ok());
        assert!(validate_table_name("bluesky_100m.bluesky").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("a.b.c").is_err());
        assert!(validate_table_name("db.").is_err());
        assert!(validate_table_name("t; DROP TABLE x").is_err());
        assert!(validate_table_name("t'").is_err());
    }

    #[test]
    fn test_args_layout() {
        let mut config = SinkConfig::default();
        config.settings.insert(
            "input_format_json_read_objects_as_strings".to_string(),
            "1".to_string(),
        );
        let sink = ClickHouseSink::new("bluesky_100m.bluesky", &config).unwrap();

        assert_eq!(
            sink.args(ResourceCeiling::new(300_000_000)),
            vec![
                "client",
                "--max_memory_usage=300000000",
                "--max_parser_depth=10000",
                "--input_format_json_read_objects_as_strings=1",
                "--query",
                "INSERT INTO bluesky_100m.bluesky FORMAT JSONEachRow",
            ]
        );
    }

    #[test]
    fn test_rejects_bad_table() {
        assert!(ClickHouseSink::new("x y", &SinkConfig::default()).is_err());
    }

    #[test]
    fn test_classify_memory_limit() {
        let detail = "Code: 241. DB::Exception: Memory limit (for query) exceeded: would use 9.32 GiB. (MEMORY_LIMIT_EXCEEDED)";
        assert!(matches!(
            classify_failure(detail.to_string(), &markers()),
            Outcome::ResourceExhausted { .. }
        ));
    }

    #[test]
    fn test_classify_other_failure() {
        let detail = "Code: 60. DB::Exception: Table default.nope does not exist. (UNKNOWN_TABLE)";
        assert_eq!(
            classify_failure(detail.to_string(), &markers()),
            Outcome::OtherFailure {
                detail: detail.to_string()
            }
        );
    }

    fn shell_sink(script: &str, timeout: Option<u64>) -> ClickHouseSink {
        let config = SinkConfig {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            submit_timeout_secs: timeout,
            ..SinkConfig::default()
        };
        ClickHouseSink::new("events", &config).unwrap()
    }

    // With `sh -c`, the first argument after the script lands in $0, which
    // is the --max_memory_usage flag.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_success() {
        let sink = shell_sink("cat > /dev/null", None);
        let outcome = sink
            .submit(&Batch::new(records(3)), ResourceCeiling::new(100))
            .await;
        assert_eq!(outcome, Outcome::Success { committed: 3 });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_memory_limit() {
        let sink = shell_sink(
            r#"cat > /dev/null; case "$0" in --max_memory_usage=100) exit 0;; esac; echo "Code: 241. DB::Exception: (MEMORY_LIMIT_EXCEEDED)" >&2; exit 241"#,
            None,
        );
        let batch = Batch::new(records(2));

        let outcome = sink.submit(&batch, ResourceCeiling::new(500)).await;
        assert!(matches!(outcome, Outcome::ResourceExhausted { ref detail } if detail.contains("MEMORY_LIMIT_EXCEEDED")));

        let outcome = sink.submit(&batch, ResourceCeiling::new(100)).await;
        assert_eq!(outcome, Outcome::Success { committed: 2 });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_early_exit_is_other_failure() {
        let sink = shell_sink("echo 'Code: 60. UNKNOWN_TABLE' >&2; exit 60", None);
        let outcome = sink
            .submit(&Batch::new(records(500)), ResourceCeiling::new(100))
            .await;
        assert!(matches!(outcome, Outcome::OtherFailure { ref detail } if detail.contains("UNKNOWN_TABLE")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_without_stderr_reports_status() {
        let sink = shell_sink("cat > /dev/null; exit 3", None);
        let outcome = sink
            .submit(&Batch::new(records(1)), ResourceCeiling::new(100))
            .await;
        assert!(matches!(outcome, Outcome::OtherFailure { ref detail } if detail.contains("exited")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runs_in_its_own_group() {
        let sink = shell_sink(
            r#"cat > /dev/null; echo "$(ps -o pgid= -p $$) $(ps -o pgid= -p $PPID)" >&2; exit 1"#,
            None,
        );
        let outcome = sink
            .submit(&Batch::new(records(1)), ResourceCeiling::new(100))
            .await;
        let Outcome::OtherFailure { detail } = outcome else {
            panic!("expected the script's failure, got {outcome:?}");
        };
        let groups: Vec<&str> = detail.split_whitespace().collect();
        assert_eq!(groups.len(), 2, "unexpected output {detail:?}");
        let (child, loader) = (groups[0], groups[1]);
        assert_ne!(child, loader);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_timeout() {
        let sink = shell_sink("sleep 5", Some(1));
        let outcome = sink
            .submit(&Batch::new(records(1)), ResourceCeiling::new(100))
            .await;
        assert_eq!(
            outcome,
            Outcome::OtherFailure {
                detail: "Sink client did not finish within 1s".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_other_failure() {
        let config = SinkConfig {
            command: vec!["definitely-not-a-clickhouse-binary".to_string()],
            ..SinkConfig::default()
        };
        let sink = ClickHouseSink::new("events", &config).unwrap();
        let outcome = sink
            .submit(&Batch::new(records(1)), ResourceCeiling::new(100))
            .await;
        assert!(matches!(outcome, Outcome::OtherFailure { ref detail } if detail.contains("spawn")));
    }
}
