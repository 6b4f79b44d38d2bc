//! Error types for the AnecDOT core library.
//!
//! Only setup and persistence problems are errors. A DOT snippet that fails
//! to compile, times out, or is rejected by a pre-check is reported as a
//! [`ValidationResult`](crate::validation::ValidationResult) instead.

/// Top-level error enum for the AnecDOT core library.
#[derive(Debug, thiserror::Error)]
pub enum AnecdotError {
    #[error("Graphviz '{program}' command not found in PATH.\nInstall with: {install_hint}")]
    CompilerNotFound {
        program: String,
        install_hint: String,
    },

    #[error("Invalid record: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnecdotError {
    /// Build a `CompilerNotFound` error carrying the install command for the
    /// host platform.
    pub fn compiler_not_found(program: impl Into<String>) -> Self {
        AnecdotError::CompilerNotFound {
            program: program.into(),
            install_hint: install_hint().to_string(),
        }
    }

    /// True for errors that mean the run cannot continue at all.
    pub fn is_setup_error(&self) -> bool {
        matches!(self, AnecdotError::CompilerNotFound { .. } | AnecdotError::Config(_))
    }
}

/// Platform-specific command for installing Graphviz.
pub fn install_hint() -> &'static str {
    match std::env::consts::OS {
        "linux" => "sudo apt-get install graphviz",
        "macos" => "brew install graphviz",
        "windows" => "choco install graphviz or download from graphviz.org",
        _ => "See graphviz.org for installation instructions",
    }
}

pub type AnecdotResult<T> = Result<T, AnecdotError>;

#[cfg(feature = "python")]
mod py {
    use super::AnecdotError;
    use pyo3::exceptions::{PyException, PyIOError, PyValueError};
    use pyo3::PyErr;

    pyo3::create_exception!(
        _anecdot_core,
        GraphvizNotFoundError,
        PyException,
        "Raised when the Graphviz dot command is not found."
    );

    impl From<AnecdotError> for PyErr {
        fn from(err: AnecdotError) -> PyErr {
            match &err {
                AnecdotError::CompilerNotFound { .. } => {
                    GraphvizNotFoundError::new_err(err.to_string())
                }
                AnecdotError::Schema(_) | AnecdotError::Config(_) | AnecdotError::Json(_) => {
                    PyValueError::new_err(err.to_string())
                }
                AnecdotError::Io(_) => PyIOError::new_err(err.to_string()),
            }
        }
    }
}

#[cfg(feature = "python")]
pub use py::GraphvizNotFoundError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiler_not_found_message_has_install_hint() {
        let err = AnecdotError::compiler_not_found("dot");
        let message = err.to_string();
        assert!(message.contains("'dot' command not found"));
        assert!(message.contains(install_hint()));
        assert!(err.is_setup_error());
    }

    #[test]
    fn schema_errors_are_not_setup_errors() {
        let err = AnecdotError::Schema("id cannot be empty".to_string());
        assert_eq!(err.to_string(), "Invalid record: id cannot be empty");
        assert!(!err.is_setup_error());
    }
}
