use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::sync::Arc;

use crate::decodable::MatrixDecodable;
use crate::decoder::{CtcFasterDecoder, CtcFasterDecoderOptions};
use crate::error::DecoderError;
use crate::fst::Fst;

impl From<DecoderError> for PyErr {
    fn from(err: DecoderError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

/// Python-visible decoding graph. Constructed once from Python arrays, then
/// shared across decoders.
#[pyclass]
pub struct RustGraph {
    pub(crate) inner: Arc<Fst>,
}

#[pymethods]
impl RustGraph {
    #[new]
    #[pyo3(signature = (num_states, start, final_states, arc_src, arc_in, arc_out, arc_dst, arc_weight))]
    fn new(
        num_states: u32,
        start: u32,
        final_states: Vec<u32>,
        arc_src: Vec<u32>,
        arc_in: Vec<u32>,
        arc_out: Vec<u32>,
        arc_dst: Vec<u32>,
        arc_weight: Vec<f32>,
    ) -> Self {
        let inner = Fst::new(
            num_states,
            start,
            &final_states,
            &arc_src,
            &arc_in,
            &arc_out,
            &arc_dst,
            &arc_weight,
        );
        RustGraph {
            inner: Arc::new(inner),
        }
    }

    fn num_states(&self) -> u32 {
        self.inner.tot_state()
    }
}

/// Python-visible best-path result.
#[pyclass]
pub struct RustBestPath {
    #[pyo3(get)]
    pub words: Vec<u32>,
    #[pyo3(get)]
    pub phones: Vec<u32>,
    #[pyo3(get)]
    pub tot_score: f32,
    #[pyo3(get)]
    pub lm_score: f32,
}

/// Python-visible decoder. Unsendable: token spines are Rc-shared.
///
/// Log-likelihoods arrive as a flat row-major `(frames x num_labels)` array
/// covering every frame of the utterance so far; `advance_decoding` may be
/// called repeatedly with a growing array.
#[pyclass(unsendable)]
pub struct RustDecoder {
    inner: CtcFasterDecoder,
}

#[pymethods]
impl RustDecoder {
    #[new]
    #[pyo3(signature = (graph, beam=16.0, max_active=None, min_active=20, beam_delta=0.5, hash_ratio=2.0))]
    fn new(
        graph: &RustGraph,
        beam: f32,
        max_active: Option<usize>,
        min_active: usize,
        beam_delta: f32,
        hash_ratio: f32,
    ) -> PyResult<Self> {
        let config = CtcFasterDecoderOptions {
            beam,
            max_active: max_active.unwrap_or(usize::MAX),
            min_active,
            beam_delta,
            hash_ratio,
        };
        let inner = CtcFasterDecoder::new(Arc::clone(&graph.inner), config)?;
        Ok(RustDecoder { inner })
    }

    fn init_decoding(&mut self) {
        self.inner.init_decoding();
    }

    #[pyo3(signature = (loglikes, num_labels, blank, skip_threshold=None, max_num_frames=None))]
    fn advance_decoding(
        &mut self,
        loglikes: Vec<f32>,
        num_labels: usize,
        blank: u32,
        skip_threshold: Option<f32>,
        max_num_frames: Option<usize>,
    ) -> PyResult<()> {
        let decodable = MatrixDecodable::new(loglikes, num_labels, blank, skip_threshold)?;
        self.inner.advance_decoding(&decodable, max_num_frames);
        Ok(())
    }

    /// One-shot: init plus a full pass over the utterance.
    #[pyo3(signature = (loglikes, num_labels, blank, skip_threshold=None))]
    fn decode(
        &mut self,
        loglikes: Vec<f32>,
        num_labels: usize,
        blank: u32,
        skip_threshold: Option<f32>,
    ) -> PyResult<()> {
        let decodable = MatrixDecodable::new(loglikes, num_labels, blank, skip_threshold)?;
        self.inner.decode(&decodable);
        Ok(())
    }

    fn reached_final(&self) -> bool {
        self.inner.reached_final()
    }

    fn num_frames_decoded(&self) -> usize {
        self.inner.num_frames_decoded()
    }

    #[pyo3(signature = (use_final_probs=true))]
    fn best_path(&self, use_final_probs: bool) -> Option<RustBestPath> {
        self.inner.best_path(use_final_probs).map(|p| RustBestPath {
            words: p.words,
            phones: p.phones,
            tot_score: p.tot_score,
            lm_score: p.lm_score,
        })
    }
}
