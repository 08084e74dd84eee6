//! CTC beam-search decoding over a weighted finite-state graph.
//!
//! The frontier engine lives in [`decoder`]; [`fst`] holds the read-only
//! decoding graph, [`token`] the refcounted hypothesis back-spines, and
//! [`decodable`] the acoustic-oracle seam. The optional `python` feature
//! exposes the whole thing through pyo3 wrappers in [`py`].

pub mod decodable;
pub mod decoder;
pub mod error;
pub mod fst;
pub mod token;

#[cfg(feature = "python")]
pub mod py;

// Convenience re-exports for downstream crates
pub use decodable::{Decodable, MatrixDecodable};
pub use decoder::{BestPath, CtcFasterDecoder, CtcFasterDecoderOptions};
pub use error::{DecoderError, Result};
pub use fst::{Fst, FstArc, Label, StateId, EPSILON};
pub use token::Token;

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn ctcbeam_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<py::RustGraph>()?;
    m.add_class::<py::RustDecoder>()?;
    m.add_class::<py::RustBestPath>()?;
    Ok(())
}
