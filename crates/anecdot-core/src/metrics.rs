//! Run-scoped counters shared by every scraper and generator.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::errors::AnecdotResult;
use crate::validation::result::ValidationResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    TotalFound,
    TotalScraped,
    ValidationPassed,
    ValidationFailed,
    DuplicatesSkipped,
    ExamplesWritten,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScraperMetrics {
    pub total_found: u64,
    pub total_scraped: u64,
    pub validation_passed: u64,
    pub validation_failed: u64,
    pub duplicates_skipped: u64,
    pub examples_written: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Default for ScraperMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScraperMetrics {
    pub fn new() -> Self {
        Self {
            total_found: 0,
            total_scraped: 0,
            validation_passed: 0,
            validation_failed: 0,
            duplicates_skipped: 0,
            examples_written: 0,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn increment(&mut self, metric: Metric, count: u64) {
        let counter = match metric {
            Metric::TotalFound => &mut self.total_found,
            Metric::TotalScraped => &mut self.total_scraped,
            Metric::ValidationPassed => &mut self.validation_passed,
            Metric::ValidationFailed => &mut self.validation_failed,
            Metric::DuplicatesSkipped => &mut self.duplicates_skipped,
            Metric::ExamplesWritten => &mut self.examples_written,
        };
        *counter += count;
    }

    pub fn record_validation(&mut self, result: &ValidationResult) {
        if result.is_valid() {
            self.increment(Metric::ValidationPassed, 1);
        } else {
            self.increment(Metric::ValidationFailed, 1);
        }
    }

    /// Count the outcome of a `RecordStore::append` call.
    pub fn record_append(&mut self, written: bool) {
        if written {
            self.increment(Metric::ExamplesWritten, 1);
        } else {
            self.increment(Metric::DuplicatesSkipped, 1);
        }
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// Validation pass rate as a percentage; 0 when nothing was validated.
    pub fn pass_rate(&self) -> f64 {
        let total = self.validation_passed + self.validation_failed;
        if total == 0 {
            return 0.0;
        }
        self.validation_passed as f64 * 100.0 / total as f64
    }

    pub fn duration_seconds(&self) -> f64 {
        match self.end_time {
            Some(end) => (end - self.start_time).num_milliseconds() as f64 / 1000.0,
            None => 0.0,
        }
    }

    /// Log a warning and return true when the pass rate is under
    /// `threshold_pct`. Runs that validated nothing never warn.
    pub fn warn_if_below(&self, threshold_pct: f64) -> bool {
        let validated = self.validation_passed + self.validation_failed;
        if validated == 0 || self.pass_rate() >= threshold_pct {
            return false;
        }
        warn!(
            pass_rate = self.pass_rate(),
            threshold = threshold_pct,
            passed = self.validation_passed,
            failed = self.validation_failed,
            "validation pass rate below threshold"
        );
        true
    }

    pub fn summary(&self) -> String {
        format!(
            "Scraper Run Summary\n\
             ===================\n\
             Total examples found:    {}\n\
             Examples scraped:        {}\n\
             Validation passed:       {}\n\
             Validation failed:       {}\n\
             Pass rate:               {:.1}%\n\
             Duplicates skipped:      {}\n\
             Examples written:        {}\n\
             Duration:                {:.1}s",
            self.total_found,
            self.total_scraped,
            self.validation_passed,
            self.validation_failed,
            self.pass_rate(),
            self.duplicates_skipped,
            self.examples_written,
            self.duration_seconds(),
        )
    }

    pub fn to_json(&self) -> AnecdotResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
