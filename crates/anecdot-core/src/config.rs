//! Environment-driven validator configuration.

use std::time::Duration;

use regex::Regex;

use crate::errors::{AnecdotError, AnecdotResult};
use crate::validation::cache::DEFAULT_CACHE_CAPACITY;
use crate::validation::compiler::WarningPolicy;

pub const ENV_DOT_PROGRAM: &str = "ANECDOT_DOT_PROGRAM";
pub const ENV_CACHE_CAPACITY: &str = "ANECDOT_CACHE_CAPACITY";
pub const ENV_TIMEOUT_SECS: &str = "ANECDOT_TIMEOUT_SECS";
pub const ENV_STRICT_IGNORE: &str = "ANECDOT_STRICT_IGNORE";

#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    pub dot_program: String,
    pub cache_capacity: usize,
    pub default_timeout: Duration,
    pub version_timeout: Duration,
    /// Stderr lines matching any of these are not escalated in strict mode.
    pub ignore_stderr_patterns: Vec<Regex>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            dot_program: "dot".to_string(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            default_timeout: Duration::from_secs(10),
            version_timeout: Duration::from_secs(5),
            ignore_stderr_patterns: Vec::new(),
        }
    }
}

impl ValidatorConfig {
    /// Read `ANECDOT_*` overrides from the process environment.
    pub fn from_env() -> AnecdotResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> AnecdotResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(program) = lookup(ENV_DOT_PROGRAM) {
            let program = program.trim();
            if !program.is_empty() {
                config.dot_program = program.to_string();
            }
        }

        if let Some(raw) = lookup(ENV_CACHE_CAPACITY) {
            config.cache_capacity = raw.trim().parse::<usize>().map_err(|e| {
                AnecdotError::Config(format!("{ENV_CACHE_CAPACITY}={raw:?}: {e}"))
            })?;
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs = raw.trim().parse::<f64>().map_err(|e| {
                AnecdotError::Config(format!("{ENV_TIMEOUT_SECS}={raw:?}: {e}"))
            })?;
            config.default_timeout = Duration::try_from_secs_f64(secs)
                .ok()
                .filter(|t| !t.is_zero())
                .ok_or_else(|| {
                    AnecdotError::Config(format!(
                        "{ENV_TIMEOUT_SECS} must be a positive number of seconds, got {raw:?}"
                    ))
                })?;
        }

        if let Some(raw) = lookup(ENV_STRICT_IGNORE) {
            config.ignore_stderr_patterns = raw
                .split(';')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| {
                    Regex::new(p).map_err(|e| {
                        AnecdotError::Config(format!("{ENV_STRICT_IGNORE} pattern {p:?}: {e}"))
                    })
                })
                .collect::<AnecdotResult<Vec<_>>>()?;
        }

        Ok(config)
    }

    pub fn warning_policy(&self) -> WarningPolicy {
        if self.ignore_stderr_patterns.is_empty() {
            WarningPolicy::AnyStderr
        } else {
            WarningPolicy::IgnoreMatching(self.ignore_stderr_patterns.clone())
        }
    }
}
