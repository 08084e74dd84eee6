//! Acoustic oracle interface.
//!
//! The decoder consumes per-frame log-likelihoods through [`Decodable`];
//! nothing in the frontier engine knows where they come from. The
//! matrix-backed implementation below serves tests and the Python bindings,
//! where a whole utterance's scores arrive as one row-major block.

use crate::error::{DecoderError, Result};
use crate::fst::Label;

/// Per-utterance source of acoustic scores and frame-readiness signals.
///
/// `num_frames_ready` must be non-decreasing across calls within one decode
/// session; the decoder asserts this.
pub trait Decodable {
    /// Log-likelihood of `label` at `frame`. Labels are 1-based; label 0 is
    /// the eps input and never queried.
    fn log_likelihood(&self, frame: usize, label: Label) -> f32;

    fn num_frames_ready(&self) -> usize;

    /// True when decoding should stop after `frame`. Called with -1 before
    /// any frame has been consumed.
    fn examine_frame(&self, frame: isize) -> bool;

    /// True when `frame` carries no usable acoustic evidence and the decoder
    /// should advance its frame counter without expanding.
    fn skip_block_frame(&self, frame: usize) -> bool;

    /// The blank label: a nonzero input symbol distinct from every emitting
    /// arc label on the graph.
    fn block_transition_id(&self) -> Label;
}

/// Row-major `(frames x num_labels)` log-likelihood matrix.
///
/// Column `l - 1` holds label `l`. With a `skip_threshold`, frames whose
/// blank log-likelihood exceeds the threshold are reported as skip-block
/// frames, collapsing blank-only stretches without expansion.
pub struct MatrixDecodable {
    loglikes: Vec<f32>,
    num_labels: usize,
    blank: Label,
    skip_threshold: Option<f32>,
}

impl MatrixDecodable {
    pub fn new(
        loglikes: Vec<f32>,
        num_labels: usize,
        blank: Label,
        skip_threshold: Option<f32>,
    ) -> Result<Self> {
        if num_labels == 0 || loglikes.len() % num_labels != 0 {
            return Err(DecoderError::MalformedLoglikes {
                len: loglikes.len(),
                num_labels,
            });
        }
        if blank == 0 || blank as usize > num_labels {
            return Err(DecoderError::BlankOutOfRange { blank, num_labels });
        }
        Ok(MatrixDecodable {
            loglikes,
            num_labels,
            blank,
            skip_threshold,
        })
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.loglikes.len() / self.num_labels
    }
}

impl Decodable for MatrixDecodable {
    #[inline]
    fn log_likelihood(&self, frame: usize, label: Label) -> f32 {
        self.loglikes[frame * self.num_labels + (label as usize - 1)]
    }

    fn num_frames_ready(&self) -> usize {
        self.num_frames()
    }

    fn examine_frame(&self, frame: isize) -> bool {
        frame + 1 >= self.num_frames() as isize
    }

    fn skip_block_frame(&self, frame: usize) -> bool {
        match self.skip_threshold {
            Some(threshold) => self.log_likelihood(frame, self.blank) > threshold,
            None => false,
        }
    }

    fn block_transition_id(&self) -> Label {
        self.blank
    }
}
