use serde::de::IgnoredAny;

/// A well-formed input line, ready to be sent to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    raw: String,
    payload: String,
}

impl Record {
    /// The trimmed input line.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The line wrapped in the sink's envelope.
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Checks that a line is one JSON value and wraps it in the envelope the
/// destination table expects (`{"data": <line>}` by default).
#[derive(Debug, Clone)]
pub struct RecordValidator {
    envelope_prefix: Option<String>,
}

impl RecordValidator {
    pub fn new(envelope_field: Option<&str>) -> Self {
        // serializing a &str cannot fail
        let envelope_prefix = envelope_field.map(|field| {
            format!(
                "{{{}:",
                serde_json::to_string(field).unwrap_or_else(|_| format!("\"{field}\""))
            )
        });
        Self { envelope_prefix }
    }

    /// Like [`validate`](Self::validate) for an undecoded line. Lines that
    /// are not valid UTF-8 are rejected, never repaired.
    pub fn validate_bytes(&self, line: &[u8]) -> Option<Record> {
        std::str::from_utf8(line).ok().and_then(|text| self.validate(text))
    }

    pub fn validate(&self, line: &str) -> Option<Record> {
        let raw = line.trim();
        if raw.is_empty() {
            return None;
        }
        serde_json::from_str::<IgnoredAny>(raw).ok()?;

        let payload = match &self.envelope_prefix {
            Some(prefix) => {
                let mut wrapped = String::with_capacity(prefix.len() + raw.len() + 1);
                wrapped.push_str(prefix);
                wrapped.push_str(raw);
                wrapped.push('}');
                wrapped
            }
            None => raw.to_string(),
        };
        Some(Record {
            raw: raw.to_string(),
            payload,
        })
    }
}

/// Short prefix of a rejected line for log output.
pub fn preview(line: &str) -> &str {
    match line.char_indices().nth(100) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
