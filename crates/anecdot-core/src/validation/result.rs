//! Outcome of a single DOT validation attempt.

use serde::{Deserialize, Serialize};

/// Provenance tag recorded on every result.
pub const VALIDATION_METHOD: &str = "graphviz_compiler";

/// Schema value stored in a record's `verification_status` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    PassedCompiler,
    FailedCompiler,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::PassedCompiler => "passed_compiler",
            VerificationStatus::FailedCompiler => "failed_compiler",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of DOT validation.
///
/// `error_message` is present exactly when `is_valid` is false; the
/// constructors are the only way to build one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidationResult {
    is_valid: bool,
    error_message: Option<String>,
    validation_method: &'static str,
    compiler_version: Option<String>,
    validation_duration: f64,
}

impl ValidationResult {
    pub fn passed(compiler_version: Option<String>, duration_secs: f64) -> Self {
        Self {
            is_valid: true,
            error_message: None,
            validation_method: VALIDATION_METHOD,
            compiler_version,
            validation_duration: duration_secs.max(0.0),
        }
    }

    pub fn failed(
        error_message: impl Into<String>,
        compiler_version: Option<String>,
        duration_secs: f64,
    ) -> Self {
        Self {
            is_valid: false,
            error_message: Some(error_message.into()),
            validation_method: VALIDATION_METHOD,
            compiler_version,
            validation_duration: duration_secs.max(0.0),
        }
    }

    /// Failure produced before the compiler ran (empty or oversized input).
    pub fn rejected(error_message: impl Into<String>) -> Self {
        Self::failed(error_message, None, 0.0)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn validation_method(&self) -> &str {
        self.validation_method
    }

    pub fn compiler_version(&self) -> Option<&str> {
        self.compiler_version.as_deref()
    }

    pub fn duration_secs(&self) -> f64 {
        self.validation_duration
    }

    pub fn to_schema_status(&self) -> VerificationStatus {
        if self.is_valid {
            VerificationStatus::PassedCompiler
        } else {
            VerificationStatus::FailedCompiler
        }
    }
}
