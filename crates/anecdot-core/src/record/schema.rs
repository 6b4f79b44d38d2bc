//! JSONL schema for training records.
//!
//! Every stream (documentation, logic, synthetic) writes records with this
//! exact field set and order.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AnecdotError, AnecdotResult};
use crate::ident::generate_id;
use crate::validation::result::{ValidationResult, VerificationStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    NlToDot,
    CodeToDot,
}

/// One training example: an instruction or source snippet paired with the
/// DOT graph it should produce.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    /// `"{source}-{hash16}"`, see [`generate_id`].
    pub id: String,
    pub source: String,
    pub source_url: String,
    pub license: String,
    pub task_type: TaskType,
    pub input_text: String,
    #[serde(default)]
    pub context_snippet: Option<String>,
    pub output_dot: String,
    pub verification_status: VerificationStatus,
    /// ISO 8601 timestamp.
    pub scraped_at: String,
}

impl DataRecord {
    /// Build a record from a validated DOT graph, deriving the id from
    /// `output_dot` with `source` as the prefix and stamping the current time.
    pub fn new(
        source: impl Into<String>,
        source_url: impl Into<String>,
        license: impl Into<String>,
        task_type: TaskType,
        input_text: impl Into<String>,
        output_dot: impl Into<String>,
        validation: &ValidationResult,
    ) -> Self {
        let source = source.into();
        let output_dot = output_dot.into();
        Self {
            id: generate_id(&output_dot, &source),
            source,
            source_url: source_url.into(),
            license: license.into(),
            task_type,
            input_text: input_text.into(),
            context_snippet: None,
            output_dot,
            verification_status: validation.to_schema_status(),
            scraped_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }

    pub fn with_context(mut self, snippet: impl Into<String>) -> Self {
        self.context_snippet = Some(snippet.into());
        self
    }

    /// Single-line JSON suitable for a JSONL file.
    pub fn to_json(&self) -> AnecdotResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(line: &str) -> AnecdotResult<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// Check the field invariants a typed record cannot express on its own.
    pub fn validate(&self) -> AnecdotResult<()> {
        let required = [
            ("id", &self.id),
            ("source", &self.source),
            ("source_url", &self.source_url),
            ("license", &self.license),
            ("input_text", &self.input_text),
            ("output_dot", &self.output_dot),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(AnecdotError::Schema(format!("{field} cannot be empty")));
            }
        }
        if parse_timestamp(&self.scraped_at).is_none() {
            return Err(AnecdotError::Schema(format!(
                "scraped_at must be valid ISO 8601 timestamp, got {}",
                self.scraped_at
            )));
        }
        Ok(())
    }
}

/// Validate an untyped JSON object against the record schema.
pub fn validate_record(value: &serde_json::Value) -> AnecdotResult<()> {
    let record: DataRecord = serde_json::from_value(value.clone())
        .map_err(|e| AnecdotError::Schema(format!("Missing or invalid fields: {e}")))?;
    record.validate()
}

/// Parse the ISO 8601 forms Python's `fromisoformat` accepts once a trailing
/// `Z` is normalised: offset datetimes, naive datetimes and plain dates.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if value.trim() != value {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
