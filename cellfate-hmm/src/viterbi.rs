//! Sequence decoder
//!
//! Log-space Viterbi decoding of one observation track against an immutable
//! [`HmmModel`]. Runs in O(T·N²) time and O(T·N) memory. Each call is
//! independent: nothing is cached between tracks, so a single model can be
//! shared by reference across worker threads.
//!
//! Ties between predecessors with equal scores resolve to the lower state
//! index, as does the choice of final state.
//!
//! # Misclassified frames
//!
//! With a non-zero misclassification rate ε, every frame may instead be
//! explained as a classifier error: the cell stays in its previous state and
//! the frame contributes `ln ε` in place of the transition and emission
//! terms. A held frame never moves the path, so a single off-class label is
//! absorbed without opening a state change the other labels do not support.
//! A regular step wins a tie with a hold.

use crate::model::HmmModel;
use crate::normalize::{ln_or_neg_inf, ProbMatrix};
use crate::types::{HmmError, Label, Result};

/// Default probability that a single frame's label is a classifier error
pub const MISCLASSIFICATION_RATE: f64 = 1e-3;

/// Stateless decoder holding log-space copies of the model parameters
pub struct Decoder<'a> {
    model: &'a HmmModel,
    log_trans: ProbMatrix,
    log_emit: ProbMatrix,
    log_start: Vec<f64>,
    log_hold: f64,
}

impl<'a> Decoder<'a> {
    /// Create an exact decoder for a model: every frame must be emitted by
    /// its state
    pub fn new(model: &'a HmmModel) -> Self {
        Self {
            model,
            log_trans: model.transitions().ln(),
            log_emit: model.emissions().ln(),
            log_start: model.start().iter().map(|&p| ln_or_neg_inf(p)).collect(),
            log_hold: f64::NEG_INFINITY,
        }
    }

    /// Builder method: let frames be held as misclassified at rate `rate`
    /// (0 disables holds)
    pub fn with_misclassification_rate(mut self, rate: f64) -> Self {
        self.log_hold = ln_or_neg_inf(rate);
        self
    }

    pub fn model(&self) -> &HmmModel {
        self.model
    }

    /// Most likely hidden state sequence (zero-based states) for zero-based
    /// observation symbols
    pub fn decode(&self, observations: &[usize]) -> Result<Vec<usize>> {
        self.decode_with_score(observations).map(|(path, _)| path)
    }

    /// Like [`Decoder::decode`], also returning the path's log-probability.
    ///
    /// The empty sequence decodes to an empty path with score 0.
    pub fn decode_with_score(&self, observations: &[usize]) -> Result<(Vec<usize>, f64)> {
        let n_symbols = self.model.n_symbols();
        if let Some((position, &observation)) = observations
            .iter()
            .enumerate()
            .find(|(_, &o)| o >= n_symbols)
        {
            return Err(HmmError::ObservationOutOfRange {
                observation: observation as i64,
                position,
                n_symbols,
            });
        }

        let t_len = observations.len();
        if t_len == 0 {
            return Ok((Vec::new(), 0.0));
        }
        let n = self.model.n_states();

        // delta holds the current column only; backpointers keep every column
        let mut delta: Vec<f64> = (0..n)
            .map(|s| self.log_start[s] + self.log_emit.get(s, observations[0]).max(self.log_hold))
            .collect();
        let mut next = vec![f64::NEG_INFINITY; n];
        let mut backptr = vec![0usize; t_len * n];

        for (t, &obs) in observations.iter().enumerate().skip(1) {
            for s in 0..n {
                let mut best = f64::NEG_INFINITY;
                let mut best_prev = 0usize;
                for prev in 0..n {
                    let candidate = delta[prev] + self.log_trans.get(prev, s);
                    // strict comparison keeps the lowest index on ties
                    if candidate > best {
                        best = candidate;
                        best_prev = prev;
                    }
                }
                let step = best + self.log_emit.get(s, obs);
                let hold = delta[s] + self.log_hold;
                if hold > step {
                    next[s] = hold;
                    backptr[t * n + s] = s;
                } else {
                    next[s] = step;
                    backptr[t * n + s] = best_prev;
                }
            }
            std::mem::swap(&mut delta, &mut next);
        }

        let mut best_final = 0usize;
        let mut best_score = f64::NEG_INFINITY;
        for (s, &score) in delta.iter().enumerate() {
            if score > best_score {
                best_score = score;
                best_final = s;
            }
        }
        if best_score == f64::NEG_INFINITY {
            return Err(HmmError::NoFeasiblePath { length: t_len });
        }

        let mut path = vec![0usize; t_len];
        path[t_len - 1] = best_final;
        for t in (1..t_len).rev() {
            path[t - 1] = backptr[t * n + path[t]];
        }

        log::trace!("Decoded track of length {} (log p = {:.3})", t_len, best_score);
        Ok((path, best_score))
    }

    /// Decode one-based classifier labels into one-based states
    pub fn decode_labels(&self, labels: &[Label]) -> Result<Vec<Label>> {
        let mut observations = Vec::with_capacity(labels.len());
        for (position, &label) in labels.iter().enumerate() {
            if label == 0 {
                return Err(HmmError::ObservationOutOfRange {
                    observation: -1,
                    position,
                    n_symbols: self.model.n_symbols(),
                });
            }
            observations.push(label as usize - 1);
        }
        let path = self.decode(&observations)?;
        Ok(path.into_iter().map(|s| s as Label + 1).collect())
    }
}
