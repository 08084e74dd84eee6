//! CTC beam-search decoding over a weighted FST.
//!
//! The frontier is a map from graph state to the single best token on that
//! state. Each acoustic frame is consumed in two passes:
//!
//! - `process_emitting`: swap the frontier out, then repopulate it by
//!   traversing emitting arcs (nonzero input label) plus a synthesized blank
//!   self-loop, pruned against the current cutoff and a dynamically
//!   tightening next-frame cutoff.
//! - `process_nonemitting`: eps-closure of the new frontier to fixpoint via
//!   a LIFO worklist, under the cutoff returned by the emitting pass.
//!
//! CTC's blank doubles the effective state space: consuming a blank at base
//! state `s` parks the hypothesis on the shadow id `s + N` (N = number of
//! graph states). Shadow ids are a decoder-private convention; the graph is
//! always indexed at the base id.

use std::collections::hash_map::Entry;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::decodable::Decodable;
use crate::error::{DecoderError, Result};
use crate::fst::{Fst, FstArc, Label, StateId, EPSILON};
use crate::token::Token;

#[derive(Debug, Clone, Copy)]
pub struct CtcFasterDecoderOptions {
    /// Additive cost beam for pruning.
    pub beam: f32,
    /// Upper bound on frontier size; `usize::MAX` disables it.
    pub max_active: usize,
    /// Lower bound on frontier size when the beam would prune below it.
    pub min_active: usize,
    /// Widening added when a forced min/max-active cutoff replaces the beam.
    pub beam_delta: f32,
    /// Sizing hint for the frontier map, as a multiple of the previous
    /// frame's token count.
    pub hash_ratio: f32,
}

impl Default for CtcFasterDecoderOptions {
    fn default() -> Self {
        CtcFasterDecoderOptions {
            beam: 16.0,
            max_active: usize::MAX,
            min_active: 20,
            beam_delta: 0.5,
            hash_ratio: 2.0,
        }
    }
}

impl CtcFasterDecoderOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.beam > 0.0) {
            return Err(DecoderError::InvalidBeam(self.beam));
        }
        if self.max_active <= 1 {
            return Err(DecoderError::InvalidMaxActive(self.max_active));
        }
        if self.min_active >= self.max_active {
            return Err(DecoderError::InvalidMinActive {
                min_active: self.min_active,
                max_active: self.max_active,
            });
        }
        if !(self.hash_ratio >= 1.0) {
            return Err(DecoderError::InvalidHashRatio(self.hash_ratio));
        }
        Ok(())
    }
}

/// Best path extracted from a terminal token's back-spine, in forward
/// temporal order with eps labels elided.
#[derive(Debug, Clone, PartialEq)]
pub struct BestPath {
    pub words: Vec<Label>,
    pub phones: Vec<Label>,
    pub tot_score: f32,
    pub lm_score: f32,
}

/// Pruning threshold for one frame, plus what the scan learned on the way.
struct Cutoff {
    cutoff: f64,
    adaptive_beam: f32,
    best_token: Option<Rc<Token>>,
    best_state: StateId,
    active: usize,
}

pub struct CtcFasterDecoder {
    graph: Arc<Fst>,
    config: CtcFasterDecoderOptions,
    cur_toks: FxHashMap<StateId, Rc<Token>>,
    prev_toks: FxHashMap<StateId, Rc<Token>>,
    /// Worklist for the non-emitting closure; empty between frames.
    queue: Vec<StateId>,
    /// Scratch for cutoff selection; cleared per use.
    tmp_array: Vec<f64>,
    num_frames_decoded: usize,
    initialized: bool,
}

/// Keep whichever of the incumbent and `new_tok` is strictly better. Ties
/// keep the incumbent, which stabilizes back-traces. Returns true if the map
/// changed.
fn replace_if_better(
    toks: &mut FxHashMap<StateId, Rc<Token>>,
    state: StateId,
    new_tok: Rc<Token>,
) -> bool {
    match toks.entry(state) {
        Entry::Vacant(e) => {
            e.insert(new_tok);
            true
        }
        Entry::Occupied(mut e) => {
            if new_tok.better_than(e.get()) {
                e.insert(new_tok);
                true
            } else {
                false
            }
        }
    }
}

#[inline]
fn base_state(state: StateId, tot_state: StateId) -> StateId {
    if state >= tot_state {
        state - tot_state
    } else {
        state
    }
}

impl CtcFasterDecoder {
    pub fn new(graph: Arc<Fst>, config: CtcFasterDecoderOptions) -> Result<Self> {
        config.validate()?;
        Ok(CtcFasterDecoder {
            graph,
            config,
            cur_toks: FxHashMap::default(),
            prev_toks: FxHashMap::default(),
            queue: Vec::new(),
            tmp_array: Vec::new(),
            num_frames_decoded: 0,
            initialized: false,
        })
    }

    pub fn init_decoding(&mut self) {
        self.cur_toks.clear();
        self.prev_toks.clear();

        let start = self.graph.start();
        let dummy_arc = FstArc {
            ilabel: EPSILON,
            olabel: 0,
            dest: start,
            weight: 0.0,
        };
        self.cur_toks.insert(start, Token::new(dummy_arc, 0.0, None));
        self.num_frames_decoded = 0;
        self.initialized = true;
        self.process_nonemitting(f64::INFINITY);
    }

    /// One-shot driver: decode an entire utterance in a single call.
    pub fn decode(&mut self, decodable: &dyn Decodable) {
        self.init_decoding();
        while !decodable.examine_frame(self.num_frames_decoded as isize - 1) {
            let cutoff = self.process_emitting(decodable);
            self.process_nonemitting(cutoff);
            self.prev_toks.clear();
        }
    }

    /// Consume up to `max_num_frames` ready frames (all of them if `None`).
    /// Skip-block frames advance the counter without expansion.
    pub fn advance_decoding(&mut self, decodable: &dyn Decodable, max_num_frames: Option<usize>) {
        assert!(
            self.initialized,
            "init_decoding() must be called before advance_decoding()"
        );
        let num_frames_ready = decodable.num_frames_ready();
        // Ready count is monotone for a decode session; a decrease means the
        // decodable object changed between calls.
        assert!(
            num_frames_ready >= self.num_frames_decoded,
            "decodable reports fewer frames ready ({}) than already decoded ({})",
            num_frames_ready,
            self.num_frames_decoded
        );
        let mut target_frames_decoded = num_frames_ready;
        if let Some(max) = max_num_frames {
            target_frames_decoded = target_frames_decoded.min(self.num_frames_decoded + max);
        }
        while self.num_frames_decoded < target_frames_decoded {
            if decodable.skip_block_frame(self.num_frames_decoded) {
                self.num_frames_decoded += 1;
                continue;
            }
            let cutoff = self.process_emitting(decodable);
            self.process_nonemitting(cutoff);
            self.prev_toks.clear();
        }
    }

    #[inline]
    pub fn num_frames_decoded(&self) -> usize {
        self.num_frames_decoded
    }

    /// True iff some current token with finite cost sits on a final state.
    /// A shadow id counts through its base: ending on a trailing blank does
    /// not lose finality.
    pub fn reached_final(&self) -> bool {
        let tot_state = self.graph.tot_state();
        self.cur_toks.iter().any(|(&state, tok)| {
            tok.tot_cost.is_finite() && self.graph.is_final(base_state(state, tot_state))
        })
    }

    /// Extract the best path. With `use_final_probs`, selection is
    /// restricted to final-state tokens whenever any exists; otherwise the
    /// global best is taken. `None` iff the frontier is empty.
    pub fn best_path(&self, use_final_probs: bool) -> Option<BestPath> {
        let best_tok = self.pick_best_token(use_final_probs)?;

        let mut words = Vec::new();
        let mut phones = Vec::new();
        let mut lm_score = 0.0f32;
        let mut tok: Option<&Token> = Some(best_tok);
        while let Some(t) = tok {
            lm_score += t.arc.weight;
            if t.arc.ilabel != EPSILON {
                phones.push(t.arc.ilabel);
            }
            if t.arc.olabel != 0 {
                words.push(t.arc.olabel);
            }
            tok = t.prev.as_deref();
        }
        words.reverse();
        phones.reverse();

        Some(BestPath {
            words,
            phones,
            tot_score: best_tok.tot_cost as f32,
            lm_score,
        })
    }

    /// Diagnostic variant of [`best_path`](Self::best_path): one debug line
    /// per spine arc in forward order. Returns whether a path existed.
    pub fn print_best_path(&self) -> bool {
        let Some(best_tok) = self.pick_best_token(true) else {
            return false;
        };
        let mut spine: Vec<&Token> = Vec::new();
        let mut tok: Option<&Token> = Some(best_tok);
        while let Some(t) = tok {
            spine.push(t);
            tok = t.prev.as_deref();
        }
        for t in spine.iter().rev() {
            debug!(
                "{} {} {} {} {}",
                t.arc.dest, t.arc.ilabel, t.arc.olabel, t.arc.weight, t.tot_cost
            );
        }
        true
    }

    fn pick_best_token(&self, use_final_probs: bool) -> Option<&Token> {
        let restrict_to_final = use_final_probs && self.reached_final();
        let tot_state = self.graph.tot_state();
        let mut best: Option<&Token> = None;
        for (&state, rc) in &self.cur_toks {
            if restrict_to_final && !self.graph.is_final(base_state(state, tot_state)) {
                continue;
            }
            let tok: &Token = rc;
            if best.map_or(true, |b| tok.better_than(b)) {
                best = Some(tok);
            }
        }
        best
    }

    /// Select the k-th smallest recorded cost (1-based, clamped to the
    /// number of entries) by partial partition.
    fn nth_cost(tmp: &mut [f64], k: usize) -> f64 {
        let idx = k.min(tmp.len()) - 1;
        pdqselect::select_by(tmp, idx, |a, b| a.total_cmp(b));
        tmp[idx]
    }

    /// Compute the pruning cutoff over `prev_toks`, balancing the beam
    /// against the min/max-active frontier bounds. Also finds the best
    /// token so the caller can pre-tighten the next frame's cutoff.
    fn get_cutoff(&mut self) -> Cutoff {
        let mut best_cost = f64::INFINITY;
        let mut best_state: StateId = 0;
        let mut best_token: Option<Rc<Token>> = None;
        let active = self.prev_toks.len();

        if self.config.max_active == usize::MAX && self.config.min_active == 0 {
            // Fast path: nothing bounds the frontier size, so the beam is
            // the whole story and the cost array is never needed.
            for (&state, tok) in &self.prev_toks {
                if tok.tot_cost < best_cost {
                    best_cost = tok.tot_cost;
                    best_state = state;
                    best_token = Some(Rc::clone(tok));
                }
            }
            return Cutoff {
                cutoff: best_cost + self.config.beam as f64,
                adaptive_beam: self.config.beam,
                best_token,
                best_state,
                active,
            };
        }

        self.tmp_array.clear();
        for (&state, tok) in &self.prev_toks {
            self.tmp_array.push(tok.tot_cost);
            if tok.tot_cost < best_cost {
                best_cost = tok.tot_cost;
                best_state = state;
                best_token = Some(Rc::clone(tok));
            }
        }

        let beam_cutoff = best_cost + self.config.beam as f64;
        let mut min_active_cutoff = f64::INFINITY;
        let mut max_active_cutoff = f64::INFINITY;

        if self.tmp_array.len() > self.config.max_active {
            max_active_cutoff = Self::nth_cost(&mut self.tmp_array, self.config.max_active);
        }
        if max_active_cutoff < beam_cutoff {
            // max_active is tighter than the beam.
            return Cutoff {
                cutoff: max_active_cutoff,
                adaptive_beam: (max_active_cutoff - best_cost) as f32 + self.config.beam_delta,
                best_token,
                best_state,
                active,
            };
        }
        if self.config.min_active == 0 {
            min_active_cutoff = best_cost;
        } else if !self.tmp_array.is_empty() {
            // Partition only the region the max-active selection already
            // used; clamp to the available entries when the frontier is
            // smaller than the floor.
            let upper = self.tmp_array.len().min(self.config.max_active);
            min_active_cutoff = Self::nth_cost(&mut self.tmp_array[..upper], self.config.min_active);
        }
        if min_active_cutoff > beam_cutoff {
            // The beam would prune below the min_active floor; widen.
            Cutoff {
                cutoff: min_active_cutoff,
                adaptive_beam: (min_active_cutoff - best_cost) as f32 + self.config.beam_delta,
                best_token,
                best_state,
                active,
            }
        } else {
            Cutoff {
                cutoff: beam_cutoff,
                adaptive_beam: self.config.beam,
                best_token,
                best_state,
                active,
            }
        }
    }

    /// Advance the frontier by one acoustic frame across emitting arcs plus
    /// the synthesized blank self-loop. Returns the cutoff bound for the
    /// frame's non-emitting closure (and, transitively, the next frame).
    pub fn process_emitting(&mut self, decodable: &dyn Decodable) -> f64 {
        let frame = self.num_frames_decoded;

        self.prev_toks.clear();
        std::mem::swap(&mut self.cur_toks, &mut self.prev_toks);

        let cutoff = self.get_cutoff();
        debug!("{} tokens active on frame {}", cutoff.active, frame);
        self.cur_toks
            .reserve((cutoff.active as f32 * self.config.hash_ratio) as usize);

        let tot_state = self.graph.tot_state();
        let blank = decodable.block_transition_id();
        let adaptive_beam = cutoff.adaptive_beam as f64;
        let mut next_cutoff = f64::INFINITY;

        // First process the best token alone to get a reasonably tight bound
        // on the next cutoff before the full sweep.
        if let Some(best_tok) = &cutoff.best_token {
            debug_assert!(
                best_tok.tot_cost < cutoff.cutoff,
                "best token must survive the current-frame cutoff"
            );
            let state = cutoff.best_state;
            for arc in self.graph.arcs_from(base_state(state, tot_state)) {
                if arc.ilabel == EPSILON {
                    continue;
                }
                if state >= tot_state && arc.dest == state - tot_state {
                    continue;
                }
                let ac_cost = -decodable.log_likelihood(frame, arc.ilabel);
                let new_cost = best_tok.tot_cost + arc.weight as f64 + ac_cost as f64;
                if new_cost + adaptive_beam < next_cutoff {
                    next_cutoff = new_cost + adaptive_beam;
                }
            }
            let ac_cost = -decodable.log_likelihood(frame, blank);
            let new_cost = best_tok.tot_cost + ac_cost as f64;
            if new_cost + adaptive_beam < next_cutoff {
                next_cutoff = new_cost + adaptive_beam;
            }
        }

        for (&state, tok) in &self.prev_toks {
            if tok.tot_cost >= cutoff.cutoff {
                continue; // pruned
            }
            debug_assert_eq!(state, tok.arc.dest);
            for arc in self.graph.arcs_from(base_state(state, tot_state)) {
                if arc.ilabel == EPSILON {
                    continue;
                }
                // A shadow state may not re-enter its base on an emitting
                // arc: only the blank self-loop crosses that boundary.
                if state >= tot_state && arc.dest == state - tot_state {
                    continue;
                }
                let ac_cost = -decodable.log_likelihood(frame, arc.ilabel);
                let new_cost = tok.tot_cost + arc.weight as f64 + ac_cost as f64;
                if new_cost < next_cutoff {
                    let new_tok = Token::new(*arc, ac_cost, Some(tok));
                    if new_cost + adaptive_beam < next_cutoff {
                        next_cutoff = new_cost + adaptive_beam;
                    }
                    replace_if_better(&mut self.cur_toks, arc.dest, new_tok);
                }
            }

            // Synthesized blank self-loop: a base state hops to its shadow,
            // a shadow state stays put.
            let dest = if state < tot_state {
                state + tot_state
            } else {
                state
            };
            let blank_arc = FstArc {
                ilabel: blank,
                olabel: 0,
                dest,
                weight: 0.0,
            };
            let ac_cost = -decodable.log_likelihood(frame, blank);
            let new_cost = tok.tot_cost + ac_cost as f64;
            if new_cost < next_cutoff {
                let new_tok = Token::new(blank_arc, ac_cost, Some(tok));
                if new_cost + adaptive_beam < next_cutoff {
                    next_cutoff = new_cost + adaptive_beam;
                }
                replace_if_better(&mut self.cur_toks, dest, new_tok);
            }
        }

        self.num_frames_decoded += 1;
        next_cutoff
    }

    /// Eps-closure of the current frontier within a single frame, to
    /// fixpoint. Assumes graph eps-arcs admit no negative-weight cycle.
    pub fn process_nonemitting(&mut self, cutoff: f64) {
        assert!(
            self.queue.is_empty(),
            "non-emitting worklist must be empty between frames"
        );
        self.queue.extend(self.cur_toks.keys().copied());

        let tot_state = self.graph.tot_state();
        while let Some(state) = self.queue.pop() {
            let tok = Rc::clone(&self.cur_toks[&state]);
            if tok.tot_cost > cutoff {
                continue; // don't bother with its successors
            }
            debug_assert_eq!(state, tok.arc.dest);
            for arc in self.graph.arcs_from(base_state(state, tot_state)) {
                if arc.ilabel != EPSILON {
                    continue;
                }
                let new_tok = Token::new(*arc, 0.0, Some(&tok));
                if new_tok.tot_cost > cutoff {
                    continue; // pruned
                }
                if replace_if_better(&mut self.cur_toks, arc.dest, new_tok) {
                    self.queue.push(arc.dest);
                }
            }
        }
    }
}
