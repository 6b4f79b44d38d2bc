//! Python bindings for the scraper and generator scripts.
//!
//! Module-level functions share one validator built from the environment on
//! first use; Rust callers construct their own [`Validator`] instead.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::Mutex;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::config::ValidatorConfig;
use crate::errors::GraphvizNotFoundError;
use crate::ident;
use crate::metrics::{Metric, ScraperMetrics};
use crate::record::{DataRecord, RecordStore, TaskType};
use crate::validation::validator::MAX_DOT_BYTES;
use crate::validation::{
    BatchOptions, ValidateOptions, ValidationResult, Validator, VerificationStatus,
};

static DEFAULT_VALIDATOR: OnceLock<Validator> = OnceLock::new();

fn default_validator() -> PyResult<&'static Validator> {
    if let Some(validator) = DEFAULT_VALIDATOR.get() {
        return Ok(validator);
    }
    let config = ValidatorConfig::from_env()?;
    Ok(DEFAULT_VALIDATOR.get_or_init(|| Validator::from_config(&config)))
}

/// `timeout=None` falls back to the validator's configured default.
fn validate_options(
    validator: &Validator,
    timeout: Option<f64>,
    strict: bool,
    use_cache: bool,
    output_format: &str,
) -> PyResult<ValidateOptions> {
    let mut options = validator.default_options();
    if let Some(secs) = timeout {
        options.timeout = Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|t| !t.is_zero())
            .ok_or_else(|| {
                PyValueError::new_err(format!(
                    "timeout must be a positive number of seconds, got {secs}"
                ))
            })?;
    }
    options.strict = strict;
    options.use_cache = use_cache;
    options.output_format = output_format.to_string();
    Ok(options)
}

fn parse_enum<T: serde::de::DeserializeOwned>(field: &str, value: &str) -> PyResult<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| PyValueError::new_err(format!("invalid {field}: {value}")))
}

// ---------------------------------------------------------------------------
// ValidationResult
// ---------------------------------------------------------------------------

#[pyclass(name = "ValidationResult", frozen)]
#[derive(Clone)]
pub struct PyValidationResult {
    inner: ValidationResult,
}

#[pymethods]
impl PyValidationResult {
    #[new]
    #[pyo3(signature = (is_valid, error_message=None, compiler_version=None, validation_duration=0.0))]
    fn new(
        is_valid: bool,
        error_message: Option<String>,
        compiler_version: Option<String>,
        validation_duration: f64,
    ) -> PyResult<Self> {
        let inner = match (is_valid, error_message) {
            (true, None) => ValidationResult::passed(compiler_version, validation_duration),
            (true, Some(_)) => {
                return Err(PyValueError::new_err(
                    "error_message must be None when is_valid is True",
                ))
            }
            (false, message) => ValidationResult::failed(
                message.unwrap_or_else(|| "Validation failed".to_string()),
                compiler_version,
                validation_duration,
            ),
        };
        Ok(Self { inner })
    }

    #[getter]
    fn is_valid(&self) -> bool {
        self.inner.is_valid()
    }

    #[getter]
    fn error_message(&self) -> Option<String> {
        self.inner.error_message().map(str::to_string)
    }

    #[getter]
    fn validation_method(&self) -> String {
        self.inner.validation_method().to_string()
    }

    #[getter]
    fn compiler_version(&self) -> Option<String> {
        self.inner.compiler_version().map(str::to_string)
    }

    #[getter]
    fn validation_duration(&self) -> f64 {
        self.inner.duration_secs()
    }

    fn to_schema_status(&self) -> &'static str {
        self.inner.to_schema_status().as_str()
    }

    fn to_dict<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new(py);
        dict.set_item("is_valid", self.inner.is_valid())?;
        dict.set_item("error_message", self.inner.error_message())?;
        dict.set_item("validation_method", self.inner.validation_method())?;
        dict.set_item("compiler_version", self.inner.compiler_version())?;
        dict.set_item("validation_duration", self.inner.duration_secs())?;
        Ok(dict)
    }

    fn __repr__(&self) -> String {
        format!(
            "ValidationResult(is_valid={}, error_message={:?}, compiler_version={:?}, validation_duration={})",
            self.inner.is_valid(),
            self.inner.error_message(),
            self.inner.compiler_version(),
            self.inner.duration_secs(),
        )
    }
}

impl From<ValidationResult> for PyValidationResult {
    fn from(inner: ValidationResult) -> Self {
        Self { inner }
    }
}

// ---------------------------------------------------------------------------
// Validation functions
// ---------------------------------------------------------------------------

#[pyfunction]
#[pyo3(signature = (dot_code, timeout=None, strict=false, use_cache=true, output_format="png"))]
pub fn validate_dot(
    py: Python<'_>,
    dot_code: String,
    timeout: Option<f64>,
    strict: bool,
    use_cache: bool,
    output_format: &str,
) -> PyResult<PyValidationResult> {
    let validator = default_validator()?;
    let options = validate_options(validator, timeout, strict, use_cache, output_format)?;
    let result = py.allow_threads(|| validator.validate(&dot_code, &options))?;
    Ok(result.into())
}

#[pyfunction]
#[pyo3(signature = (
    dot_codes,
    parallel=false,
    max_workers=4,
    progress_callback=None,
    timeout=None,
    strict=false,
    use_cache=true,
    output_format="png",
))]
#[allow(clippy::too_many_arguments)]
pub fn validate_batch(
    py: Python<'_>,
    dot_codes: Vec<String>,
    parallel: bool,
    max_workers: usize,
    progress_callback: Option<PyObject>,
    timeout: Option<f64>,
    strict: bool,
    use_cache: bool,
    output_format: &str,
) -> PyResult<Vec<PyValidationResult>> {
    let validator = default_validator()?;
    let options = validate_options(validator, timeout, strict, use_cache, output_format)?;
    let batch = BatchOptions {
        parallel,
        max_workers,
    };

    // First exception raised by the callback, re-raised after the batch.
    let callback_error: Mutex<Option<PyErr>> = Mutex::new(None);
    let callback = progress_callback.map(|cb| {
        let callback_error = &callback_error;
        move |done: usize, total: usize| {
            Python::with_gil(|py| {
                if let Err(err) = cb.call1(py, (done, total)) {
                    callback_error.lock().get_or_insert(err);
                }
            })
        }
    });
    let progress = callback
        .as_ref()
        .map(|f| f as &(dyn Fn(usize, usize) + Sync));

    let results =
        py.allow_threads(|| validator.validate_batch(&dot_codes, &options, batch, progress))?;

    drop(callback);
    if let Some(err) = callback_error.into_inner() {
        return Err(err);
    }
    Ok(results.into_iter().map(PyValidationResult::from).collect())
}

#[pyfunction]
pub fn get_cache_stats(py: Python<'_>) -> PyResult<Bound<'_, PyDict>> {
    let stats = default_validator()?.cache_stats();
    let dict = PyDict::new(py);
    dict.set_item("hits", stats.hits)?;
    dict.set_item("misses", stats.misses)?;
    dict.set_item("size", stats.size)?;
    dict.set_item("maxsize", stats.max_size)?;
    dict.set_item("hit_rate", stats.hit_rate)?;
    Ok(dict)
}

#[pyfunction]
pub fn clear_cache() -> PyResult<()> {
    default_validator()?.clear_cache();
    Ok(())
}

#[pyfunction]
#[pyo3(signature = (output_dot, source_prefix=""))]
pub fn generate_id(output_dot: &str, source_prefix: &str) -> String {
    ident::generate_id(output_dot, source_prefix)
}

#[pyfunction]
pub fn extract_hash_from_id(id_string: &str) -> String {
    ident::extract_hash(id_string).to_string()
}

// ---------------------------------------------------------------------------
// DataRecord
// ---------------------------------------------------------------------------

#[pyclass(name = "DataRecord", frozen)]
#[derive(Clone)]
pub struct PyDataRecord {
    inner: DataRecord,
}

#[pymethods]
impl PyDataRecord {
    #[new]
    #[pyo3(signature = (
        id,
        source,
        source_url,
        license,
        task_type,
        input_text,
        output_dot,
        verification_status,
        scraped_at,
        context_snippet=None,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: String,
        source: String,
        source_url: String,
        license: String,
        task_type: &str,
        input_text: String,
        output_dot: String,
        verification_status: &str,
        scraped_at: String,
        context_snippet: Option<String>,
    ) -> PyResult<Self> {
        let task_type: TaskType = parse_enum("task_type", task_type)?;
        let verification_status: VerificationStatus =
            parse_enum("verification_status", verification_status)?;
        Ok(Self {
            inner: DataRecord {
                id,
                source,
                source_url,
                license,
                task_type,
                input_text,
                context_snippet,
                output_dot,
                verification_status,
                scraped_at,
            },
        })
    }

    #[staticmethod]
    fn from_json(line: &str) -> PyResult<Self> {
        Ok(Self {
            inner: DataRecord::from_json(line)?,
        })
    }

    #[getter]
    fn id(&self) -> String {
        self.inner.id.clone()
    }

    #[getter]
    fn source(&self) -> String {
        self.inner.source.clone()
    }

    #[getter]
    fn output_dot(&self) -> String {
        self.inner.output_dot.clone()
    }

    #[getter]
    fn verification_status(&self) -> &'static str {
        self.inner.verification_status.as_str()
    }

    fn to_json(&self) -> PyResult<String> {
        Ok(self.inner.to_json()?)
    }

    /// `(is_valid, error_message)` like the dataclass it replaces.
    fn validate(&self) -> (bool, Option<String>) {
        match self.inner.validate() {
            Ok(()) => (true, None),
            Err(err) => (false, Some(err.to_string())),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "DataRecord(id={:?}, source={:?}, verification_status={:?})",
            self.inner.id,
            self.inner.source,
            self.inner.verification_status.as_str(),
        )
    }
}

// ---------------------------------------------------------------------------
// JSONLWriter
// ---------------------------------------------------------------------------

#[pyclass(name = "JSONLWriter")]
pub struct PyJsonlWriter {
    store: RecordStore,
}

#[pymethods]
impl PyJsonlWriter {
    #[new]
    fn new(output_path: PathBuf) -> PyResult<Self> {
        Ok(Self {
            store: RecordStore::open(output_path)?,
        })
    }

    fn append(&self, record: &PyDataRecord) -> PyResult<bool> {
        Ok(self.store.append(&record.inner)?)
    }

    fn is_duplicate(&self, record_id: &str) -> bool {
        self.store.is_duplicate(record_id)
    }

    fn count_existing(&self) -> usize {
        self.store.count_existing()
    }

    fn get_output_path(&self) -> PathBuf {
        self.store.path().to_path_buf()
    }
}

// ---------------------------------------------------------------------------
// ScraperMetrics
// ---------------------------------------------------------------------------

#[pyclass(name = "ScraperMetrics")]
pub struct PyScraperMetrics {
    inner: ScraperMetrics,
}

#[pymethods]
impl PyScraperMetrics {
    #[new]
    fn new() -> Self {
        Self {
            inner: ScraperMetrics::new(),
        }
    }

    #[pyo3(signature = (metric, count=1))]
    fn increment(&mut self, metric: &str, count: u64) -> PyResult<()> {
        let metric = match metric {
            "total_found" => Metric::TotalFound,
            "total_scraped" => Metric::TotalScraped,
            "validation_passed" => Metric::ValidationPassed,
            "validation_failed" => Metric::ValidationFailed,
            "duplicates_skipped" => Metric::DuplicatesSkipped,
            "examples_written" => Metric::ExamplesWritten,
            other => return Err(PyValueError::new_err(format!("unknown metric: {other}"))),
        };
        self.inner.increment(metric, count);
        Ok(())
    }

    fn finish(&mut self) {
        self.inner.finish();
    }

    fn pass_rate(&self) -> f64 {
        self.inner.pass_rate()
    }

    fn duration_seconds(&self) -> f64 {
        self.inner.duration_seconds()
    }

    fn summary(&self) -> String {
        self.inner.summary()
    }

    fn to_json(&self) -> PyResult<String> {
        Ok(self.inner.to_json()?)
    }

    #[getter]
    fn examples_written(&self) -> u64 {
        self.inner.examples_written
    }

    #[getter]
    fn duplicates_skipped(&self) -> u64 {
        self.inner.duplicates_skipped
    }
}

/// Populate the `_anecdot_core` extension module.
pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("MAX_DOT_BYTES", MAX_DOT_BYTES)?;
    m.add(
        "GraphvizNotFoundError",
        m.py().get_type::<GraphvizNotFoundError>(),
    )?;

    m.add_class::<PyValidationResult>()?;
    m.add_class::<PyDataRecord>()?;
    m.add_class::<PyJsonlWriter>()?;
    m.add_class::<PyScraperMetrics>()?;

    m.add_function(wrap_pyfunction!(validate_dot, m)?)?;
    m.add_function(wrap_pyfunction!(validate_batch, m)?)?;
    m.add_function(wrap_pyfunction!(get_cache_stats, m)?)?;
    m.add_function(wrap_pyfunction!(clear_cache, m)?)?;
    m.add_function(wrap_pyfunction!(generate_id, m)?)?;
    m.add_function(wrap_pyfunction!(extract_hash_from_id, m)?)?;
    Ok(())
}
