//! Event phase analysis
//!
//! Finds the first run of an onset label immediately followed by a run of
//! phase labels (e.g. interphase then early mitosis) and measures the phase
//! run. The search is a small automaton over the integer labels:
//!
//! ```text
//! Searching --onset--> Onset --phase--> Phase --other/end--> span
//!     ^                  |                 |
//!     +-----other--------+                 +--phase--> Phase
//! ```

use crate::types::Label;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Half-open frame span of a detected phase run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseSpan {
    /// First frame of the onset run that precedes the phase
    pub onset_start: usize,
    /// First frame of the phase run
    pub start: usize,
    /// One past the last frame of the phase run
    pub end: usize,
}

impl PhaseSpan {
    /// Phase length in frames
    pub fn frames(&self) -> usize {
        self.end - self.start
    }

    /// Phase duration in real time units
    pub fn duration(&self, time_lapse: f64) -> f64 {
        self.frames() as f64 * time_lapse
    }
}

#[derive(Debug, Clone, Copy)]
enum Scan {
    Searching,
    Onset { start: usize },
    Phase { onset_start: usize, start: usize },
}

/// Onset/phase pattern matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseAnalyzer {
    onset_label: Label,
    phase_labels: Vec<Label>,
}

impl PhaseAnalyzer {
    /// Create an analyzer for one onset label and a set of phase labels
    pub fn new(onset_label: Label, phase_labels: impl Into<Vec<Label>>) -> Self {
        Self {
            onset_label,
            phase_labels: phase_labels.into(),
        }
    }

    pub fn onset_label(&self) -> Label {
        self.onset_label
    }

    pub fn phase_labels(&self) -> &[Label] {
        &self.phase_labels
    }

    fn is_phase(&self, label: Label) -> bool {
        label != self.onset_label && self.phase_labels.contains(&label)
    }

    /// Leftmost onset-then-phase match, or `None` if the track has none
    pub fn find(&self, track: &[Label]) -> Option<PhaseSpan> {
        let mut scan = Scan::Searching;

        for (i, &label) in track.iter().enumerate() {
            scan = match (scan, label) {
                (Scan::Phase { .. }, l) if self.is_phase(l) => scan,
                (Scan::Phase { onset_start, start }, _) => {
                    return Some(PhaseSpan {
                        onset_start,
                        start,
                        end: i,
                    })
                }
                (Scan::Onset { start }, l) if l == self.onset_label => Scan::Onset { start },
                (Scan::Onset { start }, l) if self.is_phase(l) => Scan::Phase {
                    onset_start: start,
                    start: i,
                },
                (_, l) if l == self.onset_label => Scan::Onset { start: i },
                _ => Scan::Searching,
            };
        }

        match scan {
            Scan::Phase { onset_start, start } => Some(PhaseSpan {
                onset_start,
                start,
                end: track.len(),
            }),
            _ => None,
        }
    }

    /// Phase duration in time units, or `None` when no event is found
    pub fn duration(&self, track: &[Label], time_lapse: f64) -> Option<f64> {
        self.find(track).map(|span| span.duration(time_lapse))
    }
}

/// Render a track as zero-padded two-digit labels ("0101020203")
pub fn render_track(track: &[Label]) -> String {
    let mut out = String::with_capacity(track.len() * 2);
    for label in track {
        // writing to a String cannot fail
        let _ = write!(out, "{:02}", label);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mitosis() -> PhaseAnalyzer {
        PhaseAnalyzer::new(1, vec![2, 3])
    }

    #[test]
    fn test_onset_then_phase() {
        let track = [1, 1, 1, 2, 2, 3, 3, 3];
        assert_eq!(render_track(&track), "0101010202030303");

        let span = mitosis().find(&track).unwrap();
        assert_eq!(
            span,
            PhaseSpan {
                onset_start: 0,
                start: 3,
                end: 8
            }
        );
        assert_eq!(span.frames(), 5);
        assert_eq!(mitosis().duration(&track, 4.5), Some(22.5));
    }

    #[test]
    fn test_phase_run_ends_at_other_label() {
        let track = [4, 1, 1, 2, 3, 2, 1, 1, 5];
        let span = mitosis().find(&track).unwrap();
        assert_eq!((span.onset_start, span.start, span.end), (1, 3, 6));
    }

    #[test]
    fn test_absent_pattern() {
        let analyzer = mitosis();
        assert_eq!(analyzer.find(&[]), None);
        assert_eq!(analyzer.find(&[1, 1, 1]), None);
        // phase without a preceding onset run
        assert_eq!(analyzer.find(&[2, 2, 3]), None);
        // onset interrupted before the phase
        assert_eq!(analyzer.find(&[1, 4, 2, 3]), None);
        assert_eq!(analyzer.duration(&[4, 4], 3.0), None);
    }

    #[test]
    fn test_leftmost_match_wins() {
        let track = [1, 2, 1, 1, 3, 3, 3];
        let span = mitosis().find(&track).unwrap();
        assert_eq!((span.start, span.end), (1, 2));
    }

    #[test]
    fn test_onset_restarts_after_interruption() {
        let track = [1, 5, 1, 1, 2];
        let span = mitosis().find(&track).unwrap();
        assert_eq!((span.onset_start, span.start, span.end), (2, 4, 5));
    }

    #[test]
    fn test_two_digit_labels_do_not_misalign() {
        // "1020" contains "02" as digits but not as a label pair
        let analyzer = PhaseAnalyzer::new(10, vec![20]);
        assert_eq!(render_track(&[10, 20]), "1020");
        assert_eq!(analyzer.find(&[10, 20]).map(|s| s.frames()), Some(1));
        assert_eq!(mitosis().find(&[10, 20]), None);
    }
}
