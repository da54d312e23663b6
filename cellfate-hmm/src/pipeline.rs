//! Per-position analysis pipeline
//!
//! Reads events from a [`TrackingStore`], extracts one lineage track per
//! event, decodes its class labels with the HMM and measures the phase.
//! Model construction happens once in [`Analysis::from_config`] and is fatal
//! on error; everything after that is per track, and a failing track becomes
//! a [`TrackSkip`] while the rest of the position carries on.

use crate::config::AnalysisConfig;
use crate::constraints::{load_constraints, ConstraintSet};
use crate::fate::{classify, FateClass};
use crate::lineage::{LineageLookup, TrackExtractor};
use crate::model::{HmmModel, ModelBuilder};
use crate::phase::{PhaseAnalyzer, PhaseSpan};
use crate::types::{EventTrack, HmmError, Label, ObjectId, Result};
use crate::viterbi::Decoder;
use serde::Serialize;

/// Read access to one position of the external tracking store
pub trait TrackingStore: LineageLookup {
    /// Detected events, each an ordered list of object ids ending at the
    /// last frame of the event's onset window
    fn events(&self) -> Result<Vec<Vec<ObjectId>>>;

    /// Frame index of an object
    fn time_index(&self, id: ObjectId) -> Result<u32>;

    /// Classifier labels of a list of objects, in order
    fn class_labels(&self, ids: &[ObjectId]) -> Result<Vec<Label>>;
}

/// Everything measured for one event track
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackResult {
    /// Index of the event in the store's event list
    pub event_index: usize,
    pub track: EventTrack,
    /// Raw classifier labels along the track
    pub labels: Vec<Label>,
    /// HMM-corrected states along the track
    pub decoded: Vec<Label>,
    /// Measured phase, if the pattern was found
    pub phase: Option<PhaseSpan>,
    /// Phase duration in time units, if the pattern was found
    pub duration: Option<f64>,
    pub fate: FateClass,
}

/// A track left out of the results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackSkip {
    pub event_index: usize,
    pub reason: String,
}

/// Results for one position
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionOutcome {
    pub tracks: Vec<TrackResult>,
    pub skipped: Vec<TrackSkip>,
    /// Events dropped by the events-before-frame cutoff
    pub filtered: usize,
}

impl PositionOutcome {
    /// Durations of tracks in which the phase was found
    pub fn durations(&self) -> impl Iterator<Item = (f64, FateClass)> + '_ {
        self.tracks
            .iter()
            .filter_map(|t| t.duration.map(|d| (d, t.fate)))
    }
}

/// A built model plus the per-track processing settings
#[derive(Debug, Clone)]
pub struct Analysis {
    model: HmmModel,
    constraints: ConstraintSet,
    extractor: TrackExtractor,
    analyzer: PhaseAnalyzer,
    config: AnalysisConfig,
}

impl Analysis {
    /// Load the constraint file and build the model
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        let constraints = load_constraints(&config.constraint_file)?;
        Self::with_constraints(config, constraints)
    }

    /// Build the model from an already loaded constraint set
    pub fn with_constraints(config: &AnalysisConfig, constraints: ConstraintSet) -> Result<Self> {
        let rate = config.misclassification_rate;
        if !(0.0..1.0).contains(&rate) {
            return Err(HmmError::DegenerateDistribution(format!(
                "misclassification rate {} outside [0, 1)",
                rate
            )));
        }
        let model = ModelBuilder::new(config.n_classes, config.n_obs)
            .with_weights(config.weights)
            .build(&constraints)?;

        Ok(Self {
            model,
            constraints,
            extractor: TrackExtractor::new(config.max_track_frames)
                .with_branch_selection(config.branch_selection),
            analyzer: PhaseAnalyzer::new(config.onset_label, config.phase_labels.clone()),
            config: config.clone(),
        })
    }

    pub fn model(&self) -> &HmmModel {
        &self.model
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Process every event of one position.
    ///
    /// Fails only when the store cannot list its events; per-track failures
    /// are recorded in [`PositionOutcome::skipped`].
    pub fn analyze_position<S: TrackingStore + ?Sized>(
        &self,
        store: &S,
        time_lapse: f64,
    ) -> Result<PositionOutcome> {
        let events = store.events()?;
        let decoder =
            Decoder::new(&self.model).with_misclassification_rate(self.config.misclassification_rate);
        let mut outcome = PositionOutcome::default();

        for (event_index, event) in events.iter().enumerate() {
            match self.accepts_event(store, event) {
                Ok(true) => {}
                Ok(false) => {
                    outcome.filtered += 1;
                    continue;
                }
                Err(e) => {
                    outcome.skipped.push(skip(event_index, &e));
                    continue;
                }
            }

            match self.analyze_event(store, &decoder, event_index, event, time_lapse) {
                Ok(result) => outcome.tracks.push(result),
                Err(e) => outcome.skipped.push(skip(event_index, &e)),
            }
        }

        log::info!(
            "Analyzed {} events: {} tracks, {} skipped, {} after frame cutoff",
            events.len(),
            outcome.tracks.len(),
            outcome.skipped.len(),
            outcome.filtered
        );
        Ok(outcome)
    }

    fn accepts_event<S: TrackingStore + ?Sized>(&self, store: &S, event: &[ObjectId]) -> Result<bool> {
        let onset = event.get(self.config.onset_frame).ok_or(HmmError::InvalidEvent {
            index: self.config.onset_frame,
            len: event.len(),
        })?;
        Ok(self.config.accepts_onset_time(store.time_index(*onset)?))
    }

    fn analyze_event<S: TrackingStore + ?Sized>(
        &self,
        store: &S,
        decoder: &Decoder<'_>,
        event_index: usize,
        event: &[ObjectId],
        time_lapse: f64,
    ) -> Result<TrackResult> {
        let track = self
            .extractor
            .extract(event, event.len().saturating_sub(1), store)?;
        let labels = store.class_labels(track.ids())?;
        if labels.len() != track.len() {
            return Err(HmmError::store(format!(
                "{} labels returned for {} objects",
                labels.len(),
                track.len()
            )));
        }

        let decoded = decoder.decode_labels(&labels)?;
        let phase = self.analyzer.find(&decoded);
        let fate = classify(&decoded, self.model.kinds());

        log::debug!(
            "Event {}: {} frames, phase {:?}, fate {}",
            event_index,
            track.len(),
            phase.map(|p| p.frames()),
            fate
        );

        Ok(TrackResult {
            event_index,
            track,
            labels,
            decoded,
            duration: phase.map(|p| p.duration(time_lapse)),
            phase,
            fate,
        })
    }
}

fn skip(event_index: usize, error: &HmmError) -> TrackSkip {
    log::warn!("Skipping event {}: {}", event_index, error);
    TrackSkip {
        event_index,
        reason: error.to_string(),
    }
}
