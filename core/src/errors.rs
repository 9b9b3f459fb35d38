use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Failed to load configuration from {location}: {error}")]
    LoadFailed {
        location: String,
        #[source]
        error: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open input {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Failed to read from input {input}: {reason}")]
    Read { input: String, reason: String },
}

/// Transport-level failures of a sink client. These never escape a
/// submission: the sink folds them into an `Outcome::OtherFailure`.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to spawn sink client `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Failed to stream batch to sink client: {reason}")]
    Pipe { reason: String },

    #[error("Sink client did not finish within {seconds}s")]
    Timeout { seconds: u64 },
}

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("YAML serialization failed: {reason}")]
    Yaml { reason: String },
}

pub type Result<T> = std::result::Result<T, IngestionError>;

impl From<serde_yaml::Error> for IngestionError {
    fn from(err: serde_yaml::Error) -> Self {
        IngestionError::Serialization(SerializationError::Yaml {
            reason: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::Invalid {
            message: "Test message".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid configuration: Test message");
    }

    #[test]
    fn test_sink_error_display() {
        let error = SinkError::Spawn {
            program: "clickhouse".to_string(),
            reason: "No such file or directory".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to spawn sink client `clickhouse`: No such file or directory"
        );
        assert_eq!(
            SinkError::Timeout { seconds: 30 }.to_string(),
            "Sink client did not finish within 30s"
        );
    }

    #[test]
    fn test_source_error_display() {
        let error = SourceError::Open {
            path: "file_0001.json".to_string(),
            reason: "not found".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to open input file_0001.json: not found"
        );
    }

    #[test]
    fn test_ingestion_error_from_config_error() {
        let config_error = ConfigError::ValidationFailed {
            reason: "Test validation".to_string(),
        };
        let ingestion_error = IngestionError::from(config_error);

        match ingestion_error {
            IngestionError::Config(ConfigError::ValidationFailed { reason }) => {
                assert_eq!(reason, "Test validation");
            }
            _ => panic!("Expected Config error"),
        }
    }

    #[test]
    fn test_ingestion_error_from_serde_yaml_error() {
        let yaml_str = r#"
invalid yaml content:
  - missing quotes
  - "improper: structure
"#;
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>(yaml_str).unwrap_err();
        let ingestion_error = IngestionError::from(yaml_error);

        match ingestion_error {
            IngestionError::Serialization(SerializationError::Yaml { .. }) => {}
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_chain_display() {
        let inner_error = ConfigError::Invalid {
            message: "ladder must not be empty".to_string(),
        };
        let outer_error = IngestionError::Config(inner_error);

        let error_string = outer_error.to_string();
        assert!(error_string.contains("Configuration error"));
        assert!(error_string.contains("ladder must not be empty"));
    }
}
