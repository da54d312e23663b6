//! Analysis configuration types
//!
//! This module defines the configuration the library needs to build a model
//! and process one position. Plate bookkeeping (store paths, time-lapse per
//! plate, output locations) belongs to the application layer.

use crate::lineage::BranchSelection;
use crate::model::TopologyWeights;
use crate::types::Label;
use crate::viterbi::MISCLASSIFICATION_RATE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for model construction and track processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Number of hidden states (N)
    #[serde(default = "default_n_classes")]
    pub n_classes: usize,

    /// Number of classifier labels (M)
    #[serde(default = "default_n_obs")]
    pub n_obs: usize,

    /// Constraint specification file
    pub constraint_file: PathBuf,

    /// Index within an event of the onset object (default: 4)
    #[serde(default = "default_onset_frame")]
    pub onset_frame: usize,

    /// Events whose onset object lies at or after this frame are dropped
    #[serde(default = "default_events_before_frame")]
    pub events_before_frame: u32,

    /// Maximum track length in frames
    #[serde(default = "default_max_track_frames")]
    pub max_track_frames: usize,

    /// How to continue through a branching lineage
    #[serde(default)]
    pub branch_selection: BranchSelection,

    /// Onset label of the measured phase
    #[serde(default = "default_onset_label")]
    pub onset_label: Label,

    /// Labels counted as the measured phase
    #[serde(default = "default_phase_labels")]
    pub phase_labels: Vec<Label>,

    /// Transition template weights
    #[serde(default)]
    pub weights: TopologyWeights,

    /// Probability that one frame's label is a classifier error (0 for
    /// exact decoding)
    #[serde(default = "default_misclassification_rate")]
    pub misclassification_rate: f64,
}

fn default_n_classes() -> usize {
    17
}

fn default_n_obs() -> usize {
    5
}

fn default_onset_frame() -> usize {
    4
}

fn default_events_before_frame() -> u32 {
    99_999
}

fn default_max_track_frames() -> usize {
    1_000
}

fn default_onset_label() -> Label {
    1
}

fn default_phase_labels() -> Vec<Label> {
    vec![2, 3]
}

fn default_misclassification_rate() -> f64 {
    MISCLASSIFICATION_RATE
}

impl AnalysisConfig {
    /// Create a configuration with default settings for a constraint file
    pub fn new(constraint_file: impl Into<PathBuf>) -> Self {
        Self {
            n_classes: default_n_classes(),
            n_obs: default_n_obs(),
            constraint_file: constraint_file.into(),
            onset_frame: default_onset_frame(),
            events_before_frame: default_events_before_frame(),
            max_track_frames: default_max_track_frames(),
            branch_selection: BranchSelection::default(),
            onset_label: default_onset_label(),
            phase_labels: default_phase_labels(),
            weights: TopologyWeights::default(),
            misclassification_rate: default_misclassification_rate(),
        }
    }

    /// Builder method: set class and observation counts
    pub fn with_shape(mut self, n_classes: usize, n_obs: usize) -> Self {
        self.n_classes = n_classes;
        self.n_obs = n_obs;
        self
    }

    /// Builder method: set the onset frame and the events-before cutoff
    pub fn with_onset(mut self, onset_frame: usize, events_before_frame: u32) -> Self {
        self.onset_frame = onset_frame;
        self.events_before_frame = events_before_frame;
        self
    }

    /// Builder method: set the maximum track length
    pub fn with_max_track_frames(mut self, frames: usize) -> Self {
        self.max_track_frames = frames;
        self
    }

    /// Builder method: set the branch selection rule
    pub fn with_branch_selection(mut self, selection: BranchSelection) -> Self {
        self.branch_selection = selection;
        self
    }

    /// Builder method: set the measured phase
    pub fn with_phase(mut self, onset_label: Label, phase_labels: Vec<Label>) -> Self {
        self.onset_label = onset_label;
        self.phase_labels = phase_labels;
        self
    }

    /// Builder method: override the transition template weights
    pub fn with_weights(mut self, weights: TopologyWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Builder method: set the misclassification rate used while decoding
    pub fn with_misclassification_rate(mut self, rate: f64) -> Self {
        self.misclassification_rate = rate;
        self
    }

    /// Check if an event's onset frame passes the events-before cutoff
    pub fn accepts_onset_time(&self, time_index: u32) -> bool {
        time_index < self.events_before_frame
    }
}
