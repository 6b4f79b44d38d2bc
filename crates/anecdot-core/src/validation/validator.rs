//! Validation entry point: pre-checks, cache lookup and compiler dispatch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::ValidatorConfig;
use crate::errors::AnecdotResult;
use crate::validation::cache::{CacheKey, CacheStats, ValidationCache};
use crate::validation::compiler::{CompileOptions, CompilerInvoker, GraphvizCompiler};
use crate::validation::result::ValidationResult;

/// Inputs larger than this (in UTF-8 bytes) are rejected without compiling.
pub const MAX_DOT_BYTES: usize = 10 * 1024 * 1024;

pub const EMPTY_INPUT_MESSAGE: &str = "Empty DOT code provided";
pub const OVERSIZED_INPUT_MESSAGE: &str = "DOT code exceeds maximum size limit (10MB)";

#[derive(Clone, Debug)]
pub struct ValidateOptions {
    pub timeout: Duration,
    pub strict: bool,
    pub use_cache: bool,
    pub output_format: String,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            strict: false,
            use_cache: true,
            output_format: "png".to_string(),
        }
    }
}

impl ValidateOptions {
    fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            timeout: self.timeout,
            output_format: self.output_format.clone(),
            strict: self.strict,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BatchOptions {
    pub parallel: bool,
    pub max_workers: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            max_workers: 4,
        }
    }
}

/// Progress callback receiving `(completed, total)`.
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Sync);

/// Validator façade owning its compiler and cache.
pub struct Validator {
    compiler: Arc<dyn CompilerInvoker>,
    cache: ValidationCache,
    default_timeout: Duration,
}

impl Validator {
    pub fn new(compiler: Arc<dyn CompilerInvoker>, cache: ValidationCache) -> Self {
        Self {
            compiler,
            cache,
            default_timeout: Duration::from_secs(10),
        }
    }

    /// Production wiring: Graphviz `dot` resolved from `PATH`, default cache.
    pub fn graphviz() -> Self {
        Self::new(Arc::new(GraphvizCompiler::default()), ValidationCache::default())
    }

    pub fn from_config(config: &ValidatorConfig) -> Self {
        let compiler = GraphvizCompiler::new(config.dot_program.clone())
            .with_warning_policy(config.warning_policy())
            .with_version_timeout(config.version_timeout);
        let mut validator = Self::new(
            Arc::new(compiler),
            ValidationCache::new(config.cache_capacity),
        );
        validator.default_timeout = config.default_timeout;
        validator
    }

    /// Options with this validator's configured timeout and all other
    /// fields at their defaults.
    pub fn default_options(&self) -> ValidateOptions {
        ValidateOptions {
            timeout: self.default_timeout,
            ..ValidateOptions::default()
        }
    }

    pub fn compiler(&self) -> &Arc<dyn CompilerInvoker> {
        &self.compiler
    }

    /// Validate one DOT snippet.
    ///
    /// Only a missing compiler surfaces as `Err`; every content-level failure
    /// is an invalid [`ValidationResult`].
    pub fn validate(
        &self,
        dot_source: &str,
        options: &ValidateOptions,
    ) -> AnecdotResult<ValidationResult> {
        if dot_source.trim().is_empty() {
            return Ok(ValidationResult::rejected(EMPTY_INPUT_MESSAGE));
        }
        if dot_source.len() > MAX_DOT_BYTES {
            debug!(bytes = dot_source.len(), "DOT input over size limit");
            return Ok(ValidationResult::rejected(OVERSIZED_INPUT_MESSAGE));
        }

        let compile_options = options.compile_options();
        if options.use_cache {
            let key = CacheKey::new(dot_source, &compile_options);
            self.cache
                .get_or_compute(key, || self.compiler.run(dot_source, &compile_options))
        } else {
            self.compiler.run(dot_source, &compile_options)
        }
    }

    /// Validate many snippets, returning results in input order.
    ///
    /// With `parallel` set, work is spread over a pool of `max_workers`
    /// threads and `on_progress` fires in completion order. A setup error
    /// from any item aborts the batch.
    pub fn validate_batch<S>(
        &self,
        dot_sources: &[S],
        options: &ValidateOptions,
        batch: BatchOptions,
        on_progress: Option<ProgressFn<'_>>,
    ) -> AnecdotResult<Vec<ValidationResult>>
    where
        S: AsRef<str> + Sync,
    {
        let total = dot_sources.len();
        if total == 0 {
            return Ok(vec![]);
        }

        if !batch.parallel {
            return self.validate_sequential(dot_sources, options, on_progress);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(batch.max_workers.max(1))
            .build();
        let completed = AtomicUsize::new(0);

        match pool {
            Ok(pool) => pool.install(|| {
                dot_sources
                    .par_iter()
                    .map(|dot| {
                        let result = self.validate(dot.as_ref(), options);
                        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                        if let Some(callback) = on_progress {
                            callback(done, total);
                        }
                        result
                    })
                    .collect::<AnecdotResult<Vec<_>>>()
            }),
            Err(e) => {
                warn!(error = %e, "failed to build validation pool, running sequentially");
                self.validate_sequential(dot_sources, options, on_progress)
            }
        }
    }

    fn validate_sequential<S: AsRef<str>>(
        &self,
        dot_sources: &[S],
        options: &ValidateOptions,
        on_progress: Option<ProgressFn<'_>>,
    ) -> AnecdotResult<Vec<ValidationResult>> {
        let total = dot_sources.len();
        let mut results = Vec::with_capacity(total);
        for (idx, dot) in dot_sources.iter().enumerate() {
            results.push(self.validate(dot.as_ref(), options)?);
            if let Some(callback) = on_progress {
                callback(idx + 1, total);
            }
        }
        Ok(results)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AnecdotError;
    use parking_lot::Mutex;

    /// Scripted compiler: sources containing `--` inside a digraph fail,
    /// `MISSING` simulates an absent executable, everything else passes.
    #[derive(Default)]
    struct FakeCompiler {
        calls: AtomicUsize,
    }

    impl CompilerInvoker for FakeCompiler {
        fn run(
            &self,
            dot_source: &str,
            options: &CompileOptions,
        ) -> AnecdotResult<ValidationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if dot_source.contains("MISSING") {
                return Err(AnecdotError::compiler_not_found("dot"));
            }
            if dot_source.contains("TIMEOUT") {
                return Ok(ValidationResult::failed(
                    format!(
                        "Compilation timeout after {} seconds",
                        options.timeout.as_secs_f64()
                    ),
                    self.version(),
                    options.timeout.as_secs_f64(),
                ));
            }
            if dot_source.starts_with("digraph") && dot_source.contains("--") {
                return Ok(ValidationResult::failed(
                    "Error: <stdin>: syntax error in line 1 near '--'",
                    self.version(),
                    0.01,
                ));
            }
            Ok(ValidationResult::passed(self.version(), 0.01))
        }

        fn version(&self) -> Option<String> {
            Some("dot - graphviz version 9.0.0 (fake)".to_string())
        }
    }

    fn fake_validator() -> (Arc<FakeCompiler>, Validator) {
        let fake = Arc::new(FakeCompiler::default());
        let validator = Validator::new(fake.clone(), ValidationCache::new(16));
        (fake, validator)
    }

    #[test]
    fn test_validate_valid_and_invalid() {
        let (_, validator) = fake_validator();
        let opts = ValidateOptions::default();

        let ok = validator.validate("digraph { A -> B; }", &opts).unwrap();
        assert!(ok.is_valid());
        assert!(ok.error_message().is_none());
        assert_eq!(ok.validation_method(), "graphviz_compiler");
        assert!(ok.compiler_version().is_some());

        let bad = validator.validate("digraph { A -- B; }", &opts).unwrap();
        assert!(!bad.is_valid());
        assert!(!bad.error_message().unwrap().is_empty());
    }

    #[test]
    fn test_empty_input_short_circuits() {
        let (fake, validator) = fake_validator();
        for input in ["", "   ", "\n\t "] {
            let result = validator.validate(input, &ValidateOptions::default()).unwrap();
            assert!(!result.is_valid());
            assert!(result.error_message().unwrap().to_lowercase().contains("empty"));
            assert_eq!(result.duration_secs(), 0.0);
        }
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
        assert_eq!(validator.cache_stats().misses, 0);
    }

    #[test]
    fn test_oversized_input_short_circuits() {
        let (fake, validator) = fake_validator();
        let body = "A -> B; ".repeat(MAX_DOT_BYTES / 8 + 1);
        let dot = format!("digraph {{{body}}}");
        assert!(dot.len() > MAX_DOT_BYTES);

        let result = validator.validate(&dot, &ValidateOptions::default()).unwrap();
        assert!(!result.is_valid());
        assert!(result.error_message().unwrap().contains("size limit"));
        assert_eq!(result.duration_secs(), 0.0);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_size_limit_counts_utf8_bytes() {
        let (fake, validator) = fake_validator();
        // 'é' is two bytes, so this is under the limit in chars but over it in bytes
        let label = "é".repeat(MAX_DOT_BYTES / 2 + 1);
        let dot = format!("digraph {{ a [label=\"{label}\"] }}");
        assert!(dot.chars().count() < MAX_DOT_BYTES);

        let result = validator.validate(&dot, &ValidateOptions::default()).unwrap();
        assert!(result.error_message().unwrap().contains("size limit"));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cache_hit_skips_compiler() {
        let (fake, validator) = fake_validator();
        let opts = ValidateOptions::default();

        let first = validator.validate("digraph { A -- B; }", &opts).unwrap();
        let hits_before = validator.cache_stats().hits;
        let second = validator.validate("digraph { A -- B; }", &opts).unwrap();

        assert_eq!(first.is_valid(), second.is_valid());
        assert_eq!(first.error_message(), second.error_message());
        assert_eq!(validator.cache_stats().hits, hits_before + 1);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_without_cache_always_invokes() {
        let (fake, validator) = fake_validator();
        let opts = ValidateOptions {
            use_cache: false,
            ..ValidateOptions::default()
        };
        validator.validate("digraph { A -> B; }", &opts).unwrap();
        validator.validate("digraph { A -> B; }", &opts).unwrap();
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
        assert_eq!(validator.cache_stats().size, 0);
    }

    #[test]
    fn test_strict_flag_changes_cache_key() {
        let (fake, validator) = fake_validator();
        let lenient = ValidateOptions::default();
        let strict = ValidateOptions {
            strict: true,
            ..ValidateOptions::default()
        };
        validator.validate("digraph { A -> B; }", &lenient).unwrap();
        validator.validate("digraph { A -> B; }", &strict).unwrap();
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clear_cache_forces_revalidation() {
        let (fake, validator) = fake_validator();
        let opts = ValidateOptions::default();
        validator.validate("digraph { A -> B; }", &opts).unwrap();
        validator.clear_cache();
        assert_eq!(validator.cache_stats().size, 0);
        validator.validate("digraph { A -> B; }", &opts).unwrap();
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_compiler_propagates() {
        let (_, validator) = fake_validator();
        let err = validator
            .validate("digraph { MISSING }", &ValidateOptions::default())
            .unwrap_err();
        assert!(matches!(err, AnecdotError::CompilerNotFound { .. }));
    }

    #[test]
    fn test_timeout_is_a_result() {
        let (_, validator) = fake_validator();
        let opts = ValidateOptions {
            timeout: Duration::from_secs(2),
            ..ValidateOptions::default()
        };
        let result = validator.validate("digraph { TIMEOUT }", &opts).unwrap();
        assert!(!result.is_valid());
        assert_eq!(
            result.error_message(),
            Some("Compilation timeout after 2 seconds")
        );
    }

    #[test]
    fn test_batch_sequential_order_and_progress() {
        let (_, validator) = fake_validator();
        let inputs = ["digraph { A -> B; }", "graph { A -- B; }", "digraph { A -- B; }"];
        let progress = Mutex::new(Vec::new());
        let record = |done: usize, total: usize| progress.lock().push((done, total));
        let callback: ProgressFn<'_> = &record;

        let results = validator
            .validate_batch(
                &inputs,
                &ValidateOptions::default(),
                BatchOptions::default(),
                Some(callback),
            )
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_valid());
        assert!(results[1].is_valid());
        assert!(!results[2].is_valid());
        assert_eq!(*progress.lock(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn test_batch_parallel_preserves_positions() {
        let (_, validator) = fake_validator();
        let inputs: Vec<String> = (0..50)
            .map(|i| {
                if i % 3 == 0 {
                    format!("digraph {{ n{i} -- m{i}; }}")
                } else if i % 7 == 0 {
                    String::new()
                } else {
                    format!("digraph {{ n{i} -> m{i}; }}")
                }
            })
            .collect();
        let progress = Mutex::new(Vec::new());
        let record = |done: usize, total: usize| progress.lock().push((done, total));
        let callback: ProgressFn<'_> = &record;

        let results = validator
            .validate_batch(
                &inputs,
                &ValidateOptions::default(),
                BatchOptions {
                    parallel: true,
                    max_workers: 4,
                },
                Some(callback),
            )
            .unwrap();

        assert_eq!(results.len(), inputs.len());
        for (i, result) in results.iter().enumerate() {
            let expected = !(i % 3 == 0 || i % 7 == 0);
            assert_eq!(result.is_valid(), expected, "input {i}");
        }
        let mut done: Vec<usize> = progress.lock().iter().map(|(d, _)| *d).collect();
        done.sort_unstable();
        assert_eq!(done, (1..=50).collect::<Vec<_>>());
        assert!(progress.lock().iter().all(|(_, total)| *total == 50));
    }

    #[test]
    fn test_batch_parallel_aborts_on_setup_error() {
        let (_, validator) = fake_validator();
        let inputs = ["digraph { A -> B; }", "digraph { MISSING }"];
        let err = validator
            .validate_batch(
                &inputs,
                &ValidateOptions::default(),
                BatchOptions {
                    parallel: true,
                    max_workers: 2,
                },
                None,
            )
            .unwrap_err();
        assert!(err.is_setup_error());
    }

    #[test]
    fn test_empty_batch() {
        let (_, validator) = fake_validator();
        let inputs: [&str; 0] = [];
        let results = validator
            .validate_batch(&inputs, &ValidateOptions::default(), BatchOptions::default(), None)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_validator_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Validator>();
    }
}
