//! Process-level tests for the Graphviz invoker using shell scripts as
//! stand-in compilers.
//!
//! All scripts are written before any of them is spawned; writing an
//! executable while another thread forks can fail the exec with ETXTBSY.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use _anecdot_core::config::ValidatorConfig;
use _anecdot_core::validation::{
    CompileOptions, CompilerInvoker, GraphvizCompiler, ValidateOptions, ValidationCache,
    Validator, WarningPolicy,
};
use regex::Regex;

const VERSION_HEADER: &str = r#"#!/bin/sh
if [ "$1" = "-V" ]; then
  echo "dot - graphviz version 0.0.0 (fake)" >&2
  exit 0
fi
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("{VERSION_HEADER}{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn compiler(path: &Path) -> GraphvizCompiler {
    GraphvizCompiler::new(path.to_string_lossy().into_owned())
}

fn process_alive(pid: &str) -> bool {
    std::process::Command::new("kill")
        .args(["-0", pid])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn options(timeout: Duration, strict: bool) -> CompileOptions {
    CompileOptions {
        timeout,
        strict,
        ..CompileOptions::default()
    }
}

#[test]
fn scripted_compiler_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("spawns.log");

    let ok = write_script(
        dir.path(),
        "ok.sh",
        &format!("echo run >> '{}'\ncat > /dev/null\nexit 0", log.display()),
    );
    let warns = write_script(
        dir.path(),
        "warns.sh",
        "cat > /dev/null\necho 'Warning: node a, port x unrecognized' >&2\nexit 0",
    );
    let fontconfig = write_script(
        dir.path(),
        "fontconfig.sh",
        "cat > /dev/null\necho 'Fontconfig error: no writable cache' >&2\nexit 0",
    );
    let syntax = write_script(
        dir.path(),
        "syntax.sh",
        "cat > /dev/null\necho \"Error: <stdin>: syntax error in line 1 near '--'\" >&2\nexit 1",
    );
    let silent = write_script(dir.path(), "silent.sh", "cat > /dev/null\nexit 2");
    let early_exit = write_script(dir.path(), "early.sh", "exit 0");
    let pid_file = dir.path().join("hang.pid");
    let hang = write_script(
        dir.path(),
        "hang.sh",
        &format!("echo $$ > '{}'\nexec sleep 30", pid_file.display()),
    );

    let dot = "digraph { A -> B; }";
    let lenient = options(Duration::from_secs(10), false);
    let strict = options(Duration::from_secs(10), true);

    // clean pass, version captured from stderr of -V
    let result = compiler(&ok).run(dot, &lenient).unwrap();
    assert!(result.is_valid(), "{result:?}");
    assert_eq!(
        result.compiler_version(),
        Some("dot - graphviz version 0.0.0 (fake)")
    );

    // warnings only matter in strict mode
    assert!(compiler(&warns).run(dot, &lenient).unwrap().is_valid());
    let escalated = compiler(&warns).run(dot, &strict).unwrap();
    assert!(!escalated.is_valid());
    assert_eq!(
        escalated.error_message(),
        Some("Warnings treated as errors (strict mode): Warning: node a, port x unrecognized")
    );

    // informational stderr can be whitelisted
    let tolerant = compiler(&fontconfig).with_warning_policy(WarningPolicy::IgnoreMatching(vec![
        Regex::new("^Fontconfig").unwrap(),
    ]));
    assert!(tolerant.run(dot, &strict).unwrap().is_valid());
    assert!(!compiler(&fontconfig).run(dot, &strict).unwrap().is_valid());

    // diagnostics are passed through verbatim
    let rejected = compiler(&syntax).run("digraph { A -- B; }", &lenient).unwrap();
    assert!(!rejected.is_valid());
    assert_eq!(
        rejected.error_message(),
        Some("Error: <stdin>: syntax error in line 1 near '--'")
    );

    let silent_fail = compiler(&silent).run(dot, &lenient).unwrap();
    assert_eq!(
        silent_fail.error_message(),
        Some("Compilation failed with exit code 2")
    );

    // a compiler that never reads stdin must not wedge the writer
    let big = format!("digraph {{ {} }}", "A -> B; ".repeat(200_000));
    assert!(compiler(&early_exit).run(&big, &lenient).unwrap().is_valid());
    assert!(compiler(&ok).run(&big, &lenient).unwrap().is_valid());

    // timeouts are results, and the child is killed rather than awaited
    let started = Instant::now();
    let timed_out = compiler(&hang)
        .run(dot, &options(Duration::from_millis(300), false))
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!timed_out.is_valid());
    assert_eq!(
        timed_out.error_message(),
        Some("Compilation timeout after 0.3 seconds")
    );
    assert!(timed_out.duration_secs() >= 0.3);
    let pid = std::fs::read_to_string(&pid_file).unwrap();
    assert!(!process_alive(pid.trim()), "compiler pid {pid} still running");

    // the configured default timeout reaches the compiler
    let config = ValidatorConfig {
        dot_program: hang.to_string_lossy().into_owned(),
        default_timeout: Duration::from_millis(200),
        ..ValidatorConfig::default()
    };
    let configured = Validator::from_config(&config);
    let defaults = configured.default_options();
    assert_eq!(defaults.timeout, Duration::from_millis(200));
    let started = Instant::now();
    let result = configured.validate(dot, &defaults).unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(
        result.error_message(),
        Some("Compilation timeout after 0.2 seconds")
    );

    // a timeout too large for a deadline waits for the compiler instead of panicking
    let unbounded = ValidateOptions {
        timeout: Duration::from_secs(u64::MAX / 2),
        use_cache: false,
        ..ValidateOptions::default()
    };
    let validator = Validator::new(Arc::new(compiler(&early_exit)), ValidationCache::new(8));
    assert!(validator.validate(dot, &unbounded).unwrap().is_valid());
    let unbounded = options(Duration::MAX, true);
    assert!(!compiler(&warns).run(dot, &unbounded).unwrap().is_valid());

    // the cache prevents a second spawn for the same content
    std::fs::remove_file(&log).unwrap();
    let validator = Validator::new(Arc::new(compiler(&ok)), ValidationCache::new(8));
    let opts = ValidateOptions::default();
    let first = validator.validate(dot, &opts).unwrap();
    let second = validator.validate(dot, &opts).unwrap();
    assert_eq!(first, second);
    assert_eq!(validator.cache_stats().hits, 1);
    let spawns = std::fs::read_to_string(&log).unwrap();
    assert_eq!(spawns.lines().count(), 1);
}
