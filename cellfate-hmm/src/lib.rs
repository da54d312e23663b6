//! Cell Fate HMM Library
//!
//! Corrects noisy per-frame cell-state labels from an image classifier with a
//! constrained Hidden Markov Model, and measures event phases (e.g. mitosis
//! duration) on the corrected tracks.
//!
//! # Architecture
//!
//! The library is a chain of small, independent stages:
//! - [`constraints`] loads the declarative state/transition specification
//! - [`model`] builds the row-stochastic transition matrix and emission priors
//! - [`viterbi`] decodes one observation track at a time
//! - [`lineage`] follows parent → child links from a detected event
//! - [`phase`] finds the onset/phase pattern and its duration
//! - [`fate`] groups decoded tracks into fate classes
//! - [`pipeline`] ties the stages together for one position of a tracking store
//!
//! The library does NOT:
//! - Define or read the tracking store format (see [`pipeline::TrackingStore`])
//! - Render plots or reports
//! - Manage plates, output directories, or thread pools
//!
//! All of that is in the application layer (cellfate-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use cellfate_hmm::{load_constraints, Decoder, ModelBuilder, PhaseAnalyzer};
//! use std::path::Path;
//!
//! let constraints = load_constraints(Path::new("graph_5_to_17.toml")).unwrap();
//! let model = ModelBuilder::new(17, 5).build(&constraints).unwrap();
//!
//! let decoder = Decoder::new(&model);
//! let corrected = decoder.decode_labels(&[1, 1, 1, 2, 1, 2, 3, 3, 4, 1, 1]).unwrap();
//!
//! let mitosis = PhaseAnalyzer::new(1, vec![2, 3]);
//! match mitosis.duration(&corrected, 4.6) {
//!     Some(minutes) => println!("Mitosis took {:.1} min", minutes),
//!     None => println!("No mitosis found"),
//! }
//! ```

// Public modules
pub mod config;
pub mod constraints;
pub mod fate;
pub mod lineage;
pub mod model;
pub mod normalize;
pub mod phase;
pub mod pipeline;
pub mod types;
pub mod viterbi;

// Re-export main types for convenience
pub use config::AnalysisConfig;
pub use constraints::{load_constraints, ConstraintSet, EdgeClass, StateDefinition};
pub use fate::FateClass;
pub use lineage::{BranchSelection, LineageLookup, LineageWalk, TrackExtractor};
pub use model::{HmmModel, ModelBuilder, TopologyWeights};
pub use normalize::{Axis, ProbMatrix};
pub use phase::{render_track, PhaseAnalyzer, PhaseSpan};
pub use pipeline::{Analysis, PositionOutcome, TrackResult, TrackSkip, TrackingStore};
pub use types::{EventTrack, HmmError, Label, ObjectId, Result, StateKind};
pub use viterbi::Decoder;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: the bundled constraint file builds a 17-state model
        let constraints = constraints::load_from_str(include_str!(
            "../constraints/graph_5_to_17.toml"
        ))
        .unwrap();
        let model = ModelBuilder::new(17, 5).build(&constraints).unwrap();
        assert_eq!(model.n_states(), 17);
        assert_eq!(model.n_symbols(), 5);
    }
}
