//! Transition model builder
//!
//! Combines the biological topology template with a [`ConstraintSet`] into an
//! immutable [`HmmModel`]: a row-stochastic transition matrix, an emission
//! matrix and a start distribution.
//!
//! # Topology template
//!
//! Every permitted edge gets a weight from [`TopologyWeights`]:
//!
//! - self-loops dominate (`self_weight`, or `stable_self_weight` for stable states)
//! - the edge to the next state in order is a forward step (`forward_weight`)
//! - the edge to the previous state is a backward step (`backward_weight`)
//! - anything else is a skip (`skip_weight`, `stable_skip_weight`)
//! - an event-terminal state returning into a stable state uses `event_return_weight`
//!
//! An explicit edge class in the constraint file overrides the positional
//! classification and a weight hint overrides the template. Rows are then
//! divided by their sums.

use crate::constraints::{ConstraintSet, EdgeClass};
use crate::normalize::{normalize, normalize_vec, Axis, ProbMatrix};
use crate::types::{HmmError, Result, StateKind};
use serde::{Deserialize, Serialize};

/// Self-loop weight of an ordinary state
pub const SELF_WEIGHT: f64 = 1.0;
/// Weight of the step to the next state in order
pub const FORWARD_WEIGHT: f64 = 0.9;
/// Weight of the step back to the previous state
pub const BACKWARD_WEIGHT: f64 = 0.1;
/// Weight of any other permitted edge (e.g. into apoptosis)
pub const SKIP_WEIGHT: f64 = 0.1;
/// Self-loop weight of a stable (interphase) state
pub const STABLE_SELF_WEIGHT: f64 = 90.0;
/// Weight of the step out of a stable state into the next event
pub const STABLE_FORWARD_WEIGHT: f64 = 1.0;
/// Weight of any other edge out of a stable state
pub const STABLE_SKIP_WEIGHT: f64 = 60.0;
/// Weight of the edge from the end of an event back into a stable state
pub const EVENT_RETURN_WEIGHT: f64 = 0.9;

/// Tunable template weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyWeights {
    pub self_weight: f64,
    pub forward_weight: f64,
    pub backward_weight: f64,
    pub skip_weight: f64,
    pub stable_self_weight: f64,
    pub stable_forward_weight: f64,
    pub stable_skip_weight: f64,
    pub event_return_weight: f64,
}

impl Default for TopologyWeights {
    fn default() -> Self {
        Self {
            self_weight: SELF_WEIGHT,
            forward_weight: FORWARD_WEIGHT,
            backward_weight: BACKWARD_WEIGHT,
            skip_weight: SKIP_WEIGHT,
            stable_self_weight: STABLE_SELF_WEIGHT,
            stable_forward_weight: STABLE_FORWARD_WEIGHT,
            stable_skip_weight: STABLE_SKIP_WEIGHT,
            event_return_weight: EVENT_RETURN_WEIGHT,
        }
    }
}

/// Immutable HMM parameters shared by every decode call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HmmModel {
    transitions: ProbMatrix,
    emissions: ProbMatrix,
    start: Vec<f64>,
    kinds: Vec<StateKind>,
}

impl HmmModel {
    /// Assemble a model from explicit parameters.
    ///
    /// Every row of `transitions` and `emissions` and the `start` vector must
    /// be a probability distribution.
    pub fn from_parts(transitions: ProbMatrix, emissions: ProbMatrix, start: Vec<f64>) -> Result<Self> {
        let n = start.len();
        if transitions.shape() != (n, n) {
            return Err(HmmError::ShapeMismatch {
                what: "transition matrix",
                expected: (n, n),
                actual: transitions.shape(),
            });
        }
        if emissions.shape().0 != n {
            return Err(HmmError::ShapeMismatch {
                what: "emission matrix",
                expected: (n, emissions.shape().1),
                actual: emissions.shape(),
            });
        }
        for row in 0..n {
            check_distribution(transitions.row(row), || format!("transition row {}", row))?;
            check_distribution(emissions.row(row), || format!("emission row {}", row))?;
        }
        check_distribution(&start, || "start distribution".to_string())?;

        Ok(Self {
            transitions,
            emissions,
            start,
            kinds: vec![StateKind::Other; n],
        })
    }

    /// Number of hidden states (N)
    pub fn n_states(&self) -> usize {
        self.start.len()
    }

    /// Number of observation symbols (M)
    pub fn n_symbols(&self) -> usize {
        self.emissions.shape().1
    }

    pub fn transitions(&self) -> &ProbMatrix {
        &self.transitions
    }

    pub fn emissions(&self) -> &ProbMatrix {
        &self.emissions
    }

    pub fn start(&self) -> &[f64] {
        &self.start
    }

    /// Biological stage of every zero-based state
    pub fn kinds(&self) -> &[StateKind] {
        &self.kinds
    }
}

fn check_distribution(values: &[f64], what: impl Fn() -> String) -> Result<()> {
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(HmmError::DegenerateDistribution(format!(
            "{} has negative or non-finite entries",
            what()
        )));
    }
    let sum: f64 = values.iter().sum();
    if (sum - 1.0).abs() > 1e-9 {
        return Err(HmmError::DegenerateDistribution(format!(
            "{} sums to {}",
            what(),
            sum
        )));
    }
    Ok(())
}

/// Builds an [`HmmModel`] from a constraint set
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    n_classes: usize,
    n_obs: usize,
    weights: TopologyWeights,
}

impl ModelBuilder {
    /// Create a builder for the configured class and observation counts
    pub fn new(n_classes: usize, n_obs: usize) -> Self {
        Self {
            n_classes,
            n_obs,
            weights: TopologyWeights::default(),
        }
    }

    /// Builder method: override the template weights
    pub fn with_weights(mut self, weights: TopologyWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Build and validate the model
    pub fn build(&self, constraints: &ConstraintSet) -> Result<HmmModel> {
        let transitions = self.transition_matrix(constraints)?;
        let (start, emissions) = self.priors(constraints)?;

        log::info!(
            "Built HMM with {} states and {} observation symbols",
            self.n_classes,
            self.n_obs
        );

        Ok(HmmModel {
            transitions,
            emissions,
            start,
            kinds: constraints.kinds(),
        })
    }

    /// Build the normalized transition matrix
    pub fn transition_matrix(&self, constraints: &ConstraintSet) -> Result<ProbMatrix> {
        let n = constraints.n_states();
        let mut matrix = ProbMatrix::filled(n, n, 0.0);

        for from in 0..n {
            for to in 0..n {
                if constraints.permits(from, to) {
                    matrix.set(from, to, self.template_weight(constraints, from, to));
                }
            }
        }

        if matrix.shape() != (self.n_classes, self.n_classes) {
            return Err(HmmError::ShapeMismatch {
                what: "transition matrix",
                expected: (self.n_classes, self.n_classes),
                actual: matrix.shape(),
            });
        }

        normalize(&mut matrix, Axis::Rows, 0.0)
            .map_err(|row| HmmError::InvalidTransitionRow { row })?;

        log::debug!("Transition matrix normalized ({}x{})", n, n);
        Ok(matrix)
    }

    fn template_weight(&self, constraints: &ConstraintSet, from: usize, to: usize) -> f64 {
        let rule = constraints.rule(from, to);
        if let Some(hint) = rule.and_then(|r| r.weight_hint) {
            return hint;
        }

        let states = constraints.states();
        let w = &self.weights;
        let source = &states[from];

        if from == to {
            return if source.stable {
                w.stable_self_weight
            } else {
                w.self_weight
            };
        }

        let class = rule.and_then(|r| r.class).unwrap_or_else(|| {
            if source.event_terminal && states[to].stable {
                EdgeClass::Return
            } else if to == from + 1 {
                EdgeClass::Forward
            } else if to + 1 == from {
                EdgeClass::Backward
            } else {
                EdgeClass::Skip
            }
        });

        match (class, source.stable) {
            (EdgeClass::Forward, true) => w.stable_forward_weight,
            (EdgeClass::Forward, false) => w.forward_weight,
            (EdgeClass::Backward, _) => w.backward_weight,
            (EdgeClass::Return, _) => w.event_return_weight,
            (EdgeClass::Skip, true) => w.stable_skip_weight,
            (EdgeClass::Skip, false) => w.skip_weight,
        }
    }

    /// Build the start distribution and the emission matrix.
    ///
    /// Both start uniform and are narrowed to the support the constraint set
    /// permits, then renormalized.
    pub fn priors(&self, constraints: &ConstraintSet) -> Result<(Vec<f64>, ProbMatrix)> {
        let n = constraints.n_states();
        let m = self.n_obs;
        if constraints.n_symbols() != m {
            return Err(HmmError::ShapeMismatch {
                what: "emission matrix",
                expected: (self.n_classes, m),
                actual: (n, constraints.n_symbols()),
            });
        }

        let mut start = vec![1.0; n];
        if let Some(allowed) = constraints.start_states() {
            for (state, p) in start.iter_mut().enumerate() {
                if !allowed.contains(&state) {
                    *p = 0.0;
                }
            }
        }
        if !normalize_vec(&mut start, 0.0) {
            return Err(HmmError::DegenerateDistribution(
                "start distribution has no permitted state".to_string(),
            ));
        }

        let mut emissions = ProbMatrix::filled(n, m, 1.0);
        for state in 0..n {
            for symbol in 0..m {
                if !constraints.permits_emission(state, symbol) {
                    emissions.set(state, symbol, 0.0);
                }
            }
        }

        if let Some(symbol) = (0..m).find(|&s| emissions.col_sum(s) <= 0.0) {
            return Err(HmmError::DegenerateDistribution(format!(
                "label {} cannot be emitted by any state",
                symbol + 1
            )));
        }
        normalize(&mut emissions, Axis::Rows, 0.0).map_err(|row| {
            HmmError::DegenerateDistribution(format!(
                "state {} has no permitted label",
                row + 1
            ))
        })?;

        Ok((start, emissions))
    }
}
