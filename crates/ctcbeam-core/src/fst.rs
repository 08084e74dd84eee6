pub type StateId = u32;
pub type Label = u32;

/// Input label 0 marks a non-emitting (eps) arc. Symbol ids are 1-based.
pub const EPSILON: Label = 0;

#[derive(Debug, Clone, Copy)]
pub struct FstArc {
    pub ilabel: Label,
    pub olabel: Label,
    pub dest: StateId,
    pub weight: f32,
}

/// Decoding graph stored in CSR format (arcs sorted by source state).
///
/// State ids are dense in `[0, tot_state)`. The decoder synthesizes
/// blank-shadow ids in `[tot_state, 2 * tot_state)`; those never appear in
/// the graph and must be resolved to their base id before indexing here.
pub struct Fst {
    num_states: u32,
    start: StateId,
    finals: Vec<bool>,

    // CSR arc storage
    offsets: Vec<u32>, // length num_states+1
    arcs: Vec<FstArc>,
}

impl Fst {
    /// Build a graph from parallel arc arrays.
    pub fn new(
        num_states: u32,
        start: StateId,
        final_states: &[StateId],
        arc_src: &[u32],
        arc_in: &[Label],
        arc_out: &[Label],
        arc_dst: &[StateId],
        arc_weight: &[f32],
    ) -> Self {
        let n = num_states as usize;
        let num_arcs = arc_src.len();

        let mut finals = vec![false; n];
        for &s in final_states {
            finals[s as usize] = true;
        }

        // Sort arcs by source state for CSR
        let mut indices: Vec<usize> = (0..num_arcs).collect();
        indices.sort_unstable_by_key(|&i| arc_src[i]);

        let mut offsets = vec![0u32; n + 1];
        let mut arcs = Vec::with_capacity(num_arcs);

        for &idx in &indices {
            let src = arc_src[idx] as usize;
            offsets[src + 1] += 1;
            arcs.push(FstArc {
                ilabel: arc_in[idx],
                olabel: arc_out[idx],
                dest: arc_dst[idx],
                weight: arc_weight[idx],
            });
        }

        // Prefix sum
        for i in 1..=n {
            offsets[i] += offsets[i - 1];
        }

        Fst {
            num_states,
            start,
            finals,
            offsets,
            arcs,
        }
    }

    #[inline]
    pub fn start(&self) -> StateId {
        self.start
    }

    /// Number of base states N. Stable for the life of a decode; shadow ids
    /// live in `[N, 2N)`.
    #[inline]
    pub fn tot_state(&self) -> StateId {
        self.num_states
    }

    #[inline]
    pub fn is_final(&self, state: StateId) -> bool {
        self.finals[state as usize]
    }

    /// Iterate arcs from a given source state.
    #[inline]
    pub fn arcs_from(&self, state: StateId) -> &[FstArc] {
        let lo = self.offsets[state as usize] as usize;
        let hi = self.offsets[state as usize + 1] as usize;
        &self.arcs[lo..hi]
    }
}
