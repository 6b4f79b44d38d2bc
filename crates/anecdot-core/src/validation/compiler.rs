//! Graphviz compiler invocation.
//!
//! The compiler is a black box: DOT goes in on stdin, the rendered artifact
//! goes to the null device, and only the exit code and stderr are inspected.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, warn};

use crate::errors::{AnecdotError, AnecdotResult};
use crate::validation::result::ValidationResult;

const NULL_DEVICE: &str = if cfg!(windows) { "NUL" } else { "/dev/null" };
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Parameters of one compiler run.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompileOptions {
    pub timeout: Duration,
    pub output_format: String,
    pub strict: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            output_format: "png".to_string(),
            strict: false,
        }
    }
}

/// Something that can judge DOT source.
///
/// `run` returns `Err` only for setup problems such as a missing executable;
/// every content-level outcome is a [`ValidationResult`].
pub trait CompilerInvoker: Send + Sync {
    fn run(&self, dot_source: &str, options: &CompileOptions) -> AnecdotResult<ValidationResult>;

    fn version(&self) -> Option<String>;
}

/// Which stderr output counts as a warning in strict mode.
#[derive(Clone, Debug, Default)]
pub enum WarningPolicy {
    /// Any stderr output at all.
    #[default]
    AnyStderr,
    /// Lines matching one of the patterns are informational; only the
    /// remaining non-blank lines are escalated.
    IgnoreMatching(Vec<Regex>),
}

impl WarningPolicy {
    /// Stderr text that strict mode should escalate, if any.
    pub fn escalated(&self, stderr: &str) -> Option<String> {
        match self {
            WarningPolicy::AnyStderr => {
                if stderr.is_empty() {
                    None
                } else {
                    Some(stderr.trim().to_string())
                }
            }
            WarningPolicy::IgnoreMatching(patterns) => {
                let kept: Vec<&str> = stderr
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .filter(|line| !patterns.iter().any(|p| p.is_match(line)))
                    .collect();
                if kept.is_empty() {
                    None
                } else {
                    Some(kept.join("\n"))
                }
            }
        }
    }
}

/// Map an exit code and stderr to pass (`Ok`) or the failure message.
fn classify(
    exit_code: Option<i32>,
    stderr: &str,
    strict: bool,
    policy: &WarningPolicy,
) -> Result<(), String> {
    match exit_code {
        Some(0) => {}
        Some(code) => {
            let trimmed = stderr.trim();
            return Err(if trimmed.is_empty() {
                format!("Compilation failed with exit code {code}")
            } else {
                trimmed.to_string()
            });
        }
        None => {
            let trimmed = stderr.trim();
            return Err(if trimmed.is_empty() {
                "Compilation failed: terminated by signal".to_string()
            } else {
                trimmed.to_string()
            });
        }
    }
    if strict {
        if let Some(warnings) = policy.escalated(stderr) {
            return Err(format!("Warnings treated as errors (strict mode): {warnings}"));
        }
    }
    Ok(())
}

/// Production invoker bound to the Graphviz `dot` executable.
#[derive(Debug)]
pub struct GraphvizCompiler {
    program: String,
    warning_policy: WarningPolicy,
    version_timeout: Duration,
    version: OnceLock<Option<String>>,
}

impl Default for GraphvizCompiler {
    fn default() -> Self {
        Self::new("dot")
    }
}

impl GraphvizCompiler {
    /// `program` is either a bare command name looked up on `PATH` or a path
    /// to the executable.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            warning_policy: WarningPolicy::default(),
            version_timeout: Duration::from_secs(5),
            version: OnceLock::new(),
        }
    }

    pub fn with_warning_policy(mut self, policy: WarningPolicy) -> Self {
        self.warning_policy = policy;
        self
    }

    pub fn with_version_timeout(mut self, timeout: Duration) -> Self {
        self.version_timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Locate the executable, failing with install guidance when absent.
    pub fn resolve_program(&self) -> AnecdotResult<PathBuf> {
        find_executable(&self.program).ok_or_else(|| {
            warn!(program = %self.program, "graphviz executable not found");
            AnecdotError::compiler_not_found(&self.program)
        })
    }

    fn query_version(&self) -> Option<String> {
        let program = find_executable(&self.program)?;
        let mut command = Command::new(program);
        command.arg("-V");
        // dot -V writes its banner to stderr
        match run_with_timeout(command, Vec::new(), self.version_timeout) {
            Ok(ProcessOutcome::Exited { stderr, .. }) => {
                let version = stderr.trim();
                if version.is_empty() {
                    None
                } else {
                    Some(version.to_string())
                }
            }
            Ok(ProcessOutcome::TimedOut) => None,
            Err(e) => {
                debug!(error = %e, "graphviz version query failed");
                None
            }
        }
    }
}

impl CompilerInvoker for GraphvizCompiler {
    fn run(&self, dot_source: &str, options: &CompileOptions) -> AnecdotResult<ValidationResult> {
        let program = self.resolve_program()?;
        let compiler_version = self.version();

        let mut command = Command::new(&program);
        command
            .arg(format!("-T{}", options.output_format))
            .arg("-o")
            .arg(NULL_DEVICE);

        let started = Instant::now();
        let outcome = run_with_timeout(command, dot_source.as_bytes().to_vec(), options.timeout);
        let duration = started.elapsed().as_secs_f64();

        match outcome {
            Ok(ProcessOutcome::Exited { status, stderr }) => {
                match classify(status.code(), &stderr, options.strict, &self.warning_policy) {
                    Ok(()) => Ok(ValidationResult::passed(compiler_version, duration)),
                    Err(message) => {
                        debug!(status = %status, "dot rejected input");
                        Ok(ValidationResult::failed(message, compiler_version, duration))
                    }
                }
            }
            Ok(ProcessOutcome::TimedOut) => {
                warn!(timeout_secs = options.timeout.as_secs_f64(), "dot compilation timed out");
                Ok(ValidationResult::failed(
                    format!(
                        "Compilation timeout after {} seconds",
                        options.timeout.as_secs_f64()
                    ),
                    compiler_version,
                    duration,
                ))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(program = %program.display(), "graphviz executable vanished before spawn");
                Err(AnecdotError::compiler_not_found(&self.program))
            }
            Err(e) => {
                warn!(error = %e, "dot invocation failed");
                Ok(ValidationResult::failed(
                    format!("Unexpected error: {e}"),
                    compiler_version,
                    duration,
                ))
            }
        }
    }

    fn version(&self) -> Option<String> {
        self.version.get_or_init(|| self.query_version()).clone()
    }
}

// ---------------------------------------------------------------------------
// Process plumbing
// ---------------------------------------------------------------------------

enum ProcessOutcome {
    Exited { status: ExitStatus, stderr: String },
    TimedOut,
}

/// Spawn `command`, feed `input` on stdin, and wait up to `timeout`.
///
/// On timeout the child is killed and reaped before returning.
fn run_with_timeout(
    mut command: Command,
    input: Vec<u8>,
    timeout: Duration,
) -> io::Result<ProcessOutcome> {
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    let mut child = command.spawn()?;

    let writer = child.stdin.take().map(|mut pipe| {
        thread::spawn(move || match pipe.write_all(&input) {
            // the compiler may bail out before reading everything
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            other => other,
        })
    });
    let reader = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf).map(|_| buf)
        })
    });

    // a timeout past the representable range means no deadline
    let deadline = Instant::now().checked_add(timeout);
    let status = match wait_until(&mut child, deadline) {
        Ok(Some(status)) => status,
        Ok(None) => {
            terminate(&mut child);
            return Ok(ProcessOutcome::TimedOut);
        }
        Err(e) => {
            terminate(&mut child);
            return Err(e);
        }
    };

    if let Some(handle) = writer {
        if let Ok(Err(e)) = handle.join() {
            debug!(error = %e, "writing DOT to compiler stdin failed");
        }
    }
    let stderr = match reader.map(|handle| handle.join()) {
        Some(Ok(Ok(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
        Some(Ok(Err(e))) => return Err(e),
        _ => String::new(),
    };

    Ok(ProcessOutcome::Exited { status, stderr })
}

fn wait_until(child: &mut Child, deadline: Option<Instant>) -> io::Result<Option<ExitStatus>> {
    let Some(deadline) = deadline else {
        return child.wait().map(Some);
    };
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

fn terminate(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(error = %e, "kill failed, child already exited");
    }
    if let Err(e) = child.wait() {
        warn!(error = %e, "failed to reap compiler process");
    }
}

/// Resolve `program` against `PATH` unless it already names a path.
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    find_in_path(program, &paths)
}

fn find_in_path(program: &str, paths: &std::ffi::OsStr) -> Option<PathBuf> {
    std::env::split_paths(paths).find_map(|dir| {
        let full = dir.join(program);
        if is_executable(&full) {
            return Some(full);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{program}.exe"));
            if is_executable(&exe) {
                return Some(exe);
            }
        }
        None
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
