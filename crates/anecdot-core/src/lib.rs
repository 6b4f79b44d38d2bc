//! AnecDOT core library: DOT validation and deduplicated dataset storage.
//!
//! Candidate (input, DOT) pairs from scrapers and generators pass through
//! [`validation::Validator`], receive a content-hash id from
//! [`ident::generate_id`], and are persisted by [`record::RecordStore`].
//! With the `python` feature the crate also builds the `_anecdot_core`
//! extension module used by the Python collaborators.

pub mod config;
pub mod errors;
pub mod ident;
pub mod metrics;
pub mod record;
pub mod validation;

#[cfg(feature = "python")]
pub mod python;

pub use errors::{AnecdotError, AnecdotResult};

#[cfg(feature = "python")]
use pyo3::prelude::*;

// ---------------------------------------------------------------------------
// Top-level Python module: _anecdot_core
// ---------------------------------------------------------------------------

#[cfg(feature = "python")]
#[pymodule]
fn _anecdot_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python::register(m)
}
