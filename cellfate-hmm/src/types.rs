//! Core types for the cell fate HMM library
//!
//! This module defines the identifiers, tracks and the error type shared by
//! every stage of the pipeline. Model values are built once and never mutated;
//! tracks are plain owned sequences handed from one stage to the next.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for library operations
pub type Result<T> = std::result::Result<T, HmmError>;

/// Identifier of one segmented object in the tracking store
pub type ObjectId = u64;

/// One-based class label, as produced by the upstream classifier
pub type Label = u32;

/// Errors that can occur while building a model or processing a track
#[derive(Debug, thiserror::Error)]
pub enum HmmError {
    #[error("Malformed constraint specification: {0}")]
    MalformedConstraint(String),

    #[error("Transition row {row} has zero total weight")]
    InvalidTransitionRow { row: usize },

    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Degenerate distribution: {0}")]
    DegenerateDistribution(String),

    #[error("Observation {observation} at position {position} is outside [0, {n_symbols})")]
    ObservationOutOfRange {
        observation: i64,
        position: usize,
        n_symbols: usize,
    },

    #[error("No feasible state path for a track of length {length}")]
    NoFeasiblePath { length: usize },

    #[error("Object {object} has {} descendants and no branch selection rule applies", .descendants.len())]
    AmbiguousLineage {
        object: ObjectId,
        descendants: Vec<ObjectId>,
    },

    #[error("Event index {index} outside an event of {len} objects")]
    InvalidEvent { index: usize, len: usize },

    #[error("Tracking store error: {0}")]
    StoreError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl HmmError {
    /// Creates a malformed-constraint error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedConstraint(msg.into())
    }

    /// Creates a tracking store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    /// True for errors raised while building the model.
    ///
    /// These abort a run; everything else is confined to a single track.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HmmError::MalformedConstraint(_)
                | HmmError::InvalidTransitionRow { .. }
                | HmmError::ShapeMismatch { .. }
                | HmmError::DegenerateDistribution(_)
        )
    }
}

/// Biological stage a hidden state belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    Interphase,
    Mitosis,
    Apoptosis,
    #[default]
    Other,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKind::Interphase => write!(f, "int"),
            StateKind::Mitosis => write!(f, "mito"),
            StateKind::Apoptosis => write!(f, "apo"),
            StateKind::Other => write!(f, "other"),
        }
    }
}

/// An ordered lineage path of object ids for one followed cell
///
/// The first `onset_len` ids are the event's onset window; the rest were
/// appended by following descendant links forward in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventTrack {
    ids: Vec<ObjectId>,
    onset_len: usize,
}

impl EventTrack {
    pub(crate) fn new(ids: Vec<ObjectId>, onset_len: usize) -> Self {
        Self { ids, onset_len }
    }

    /// All object ids, onset window first
    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    /// Number of ids taken from the event's onset window
    pub fn onset_len(&self) -> usize {
        self.onset_len
    }

    /// Track length in frames
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(HmmError::malformed("x").is_fatal());
        assert!(HmmError::InvalidTransitionRow { row: 3 }.is_fatal());
        assert!(!HmmError::store("corrupt position").is_fatal());
        assert!(!HmmError::AmbiguousLineage {
            object: 2,
            descendants: vec![5, 6]
        }
        .is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = HmmError::AmbiguousLineage {
            object: 2,
            descendants: vec![5, 6],
        };
        assert_eq!(
            err.to_string(),
            "Object 2 has 2 descendants and no branch selection rule applies"
        );

        let err = HmmError::ObservationOutOfRange {
            observation: 7,
            position: 1,
            n_symbols: 5,
        };
        assert_eq!(
            err.to_string(),
            "Observation 7 at position 1 is outside [0, 5)"
        );
    }

    #[test]
    fn test_state_kind_display() {
        assert_eq!(StateKind::Mitosis.to_string(), "mito");
        assert_eq!(StateKind::default(), StateKind::Other);
    }
}
