//! Cell fate classification
//!
//! Collapses a decoded track into its sequence of biological stages and
//! assigns the fate class used to group mitotic timings. The leading
//! interphase run (the event's onset window) is not part of the fate.

use crate::types::{Label, StateKind};
use serde::Serialize;
use std::fmt;

/// Fate of one tracked cell, ordered by class index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FateClass {
    /// Divides once and stays in interphase
    MitoInt,
    /// Divides three or more times
    MitoIntMitoIntMito,
    /// Divides twice then dies
    MitoIntMitoIntApo,
    /// Divides once, dies in the following interphase
    MitoIntApo,
    /// Divides, then dies in the second mitosis
    MitoIntMitoApo,
    /// Dies in mitosis
    MitoApo,
    /// Any other stage sequence
    MitoUnclassified,
}

impl FateClass {
    pub const ALL: [FateClass; 7] = [
        FateClass::MitoInt,
        FateClass::MitoIntMitoIntMito,
        FateClass::MitoIntMitoIntApo,
        FateClass::MitoIntApo,
        FateClass::MitoIntMitoApo,
        FateClass::MitoApo,
        FateClass::MitoUnclassified,
    ];

    /// Position of this class in [`FateClass::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            FateClass::MitoInt => "mito_int",
            FateClass::MitoIntMitoIntMito => "mito_int_mito_int_mito",
            FateClass::MitoIntMitoIntApo => "mito_int_mito_int_apo",
            FateClass::MitoIntApo => "mito_int_apo",
            FateClass::MitoIntMitoApo => "mito_int_mito_apo",
            FateClass::MitoApo => "mito_apo",
            FateClass::MitoUnclassified => "mito_unclassified",
        }
    }
}

impl fmt::Display for FateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stage sequence of a decoded track: kinds of its one-based states with
/// unknown kinds dropped and repeats collapsed
pub fn stage_sequence(track: &[Label], kinds: &[StateKind]) -> Vec<StateKind> {
    let mut stages: Vec<StateKind> = Vec::new();
    for &label in track {
        let kind = label
            .checked_sub(1)
            .and_then(|s| kinds.get(s as usize))
            .copied()
            .unwrap_or_default();
        if kind == StateKind::Other {
            continue;
        }
        if stages.last() != Some(&kind) {
            stages.push(kind);
        }
    }
    stages
}

/// Classify a decoded track
pub fn classify(track: &[Label], kinds: &[StateKind]) -> FateClass {
    use StateKind::{Apoptosis as A, Interphase as I, Mitosis as M};

    let stages = stage_sequence(track, kinds);
    let stages = match stages.first() {
        Some(I) => &stages[1..],
        _ => &stages[..],
    };

    match stages {
        [M, I] => FateClass::MitoInt,
        [M, I, M, I, M, ..] => FateClass::MitoIntMitoIntMito,
        [M, I, M, I, A] => FateClass::MitoIntMitoIntApo,
        [M, I, A] => FateClass::MitoIntApo,
        [M, I, M, A] => FateClass::MitoIntMitoApo,
        [M, A] => FateClass::MitoApo,
        _ => FateClass::MitoUnclassified,
    }
}
