//! Batch processing of plates and positions

use crate::config::PlateConfig;
use crate::store::{CorruptPosition, PlateStore, PositionKey};
use cellfate_hmm::{Analysis, PositionOutcome};
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;

/// Results of one position
#[derive(Debug, Clone, Serialize)]
pub struct PositionReport {
    pub key: PositionKey,
    pub outcome: PositionOutcome,
}

/// Results of one plate
#[derive(Debug, Clone, Serialize)]
pub struct PlateReport {
    pub name: String,
    pub store: PathBuf,
    pub time_lapse_min: f64,
    /// Set when the plate file itself could not be used
    pub error: Option<String>,
    pub corrupt: Vec<CorruptPosition>,
    pub positions: Vec<PositionReport>,
}

impl PlateReport {
    fn failed(plate: &PlateConfig, error: String) -> Self {
        Self {
            name: plate.name.clone(),
            store: plate.store.clone(),
            time_lapse_min: plate.time_lapse_min,
            error: Some(error),
            corrupt: Vec::new(),
            positions: Vec::new(),
        }
    }

    pub fn track_count(&self) -> usize {
        self.positions.iter().map(|p| p.outcome.tracks.len()).sum()
    }

    pub fn skip_count(&self) -> usize {
        self.positions.iter().map(|p| p.outcome.skipped.len()).sum()
    }
}

/// Use a global rayon pool of the given size
pub fn configure_threads(jobs: Option<usize>) {
    let Some(threads) = jobs.filter(|&n| n > 0) else {
        return;
    };
    match rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        Ok(()) => log::debug!("Using {} worker threads", threads),
        Err(e) => log::warn!("Could not configure {} worker threads: {}", threads, e),
    }
}

/// Analyze every plate. Positions of a plate are processed in parallel and
/// share the one model held by `analysis`.
pub fn run_batch(analysis: &Analysis, plates: &[PlateConfig]) -> Vec<PlateReport> {
    plates.iter().map(|plate| run_plate(analysis, plate)).collect()
}

fn run_plate(analysis: &Analysis, plate: &PlateConfig) -> PlateReport {
    log::info!("Reading plate {} from {:?}", plate.name, plate.store);
    let store = match PlateStore::load(&plate.store) {
        Ok(store) => store,
        Err(e) => {
            log::error!("Plate {} skipped: {}", plate.name, e);
            return PlateReport::failed(plate, e.to_string());
        }
    };

    let results: Vec<_> = store
        .positions
        .par_iter()
        .map(|position| {
            log::debug!("Analyzing position {}", position.key().column_name());
            analysis
                .analyze_position(position, plate.time_lapse_min)
                .map(|outcome| PositionReport {
                    key: position.key().clone(),
                    outcome,
                })
                .map_err(|e| CorruptPosition {
                    index: position.index(),
                    reason: e.to_string(),
                })
        })
        .collect();

    let mut corrupt = store.corrupt;
    let mut positions = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(report) => positions.push(report),
            Err(c) => {
                log::warn!("Position {} is corrupt, skipping: {}", c.index, c.reason);
                corrupt.push(c);
            }
        }
    }
    positions.sort_by(|a, b| a.key.cmp(&b.key));
    corrupt.sort_by_key(|c| c.index);

    let report = PlateReport {
        name: plate.name.clone(),
        store: plate.store.clone(),
        time_lapse_min: plate.time_lapse_min,
        error: None,
        corrupt,
        positions,
    };
    log::info!(
        "Plate {}: {} positions, {} tracks, {} skipped tracks, {} corrupt positions",
        report.name,
        report.positions.len(),
        report.track_count(),
        report.skip_count(),
        report.corrupt.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellfate_hmm::constraints::load_from_str;
    use cellfate_hmm::{AnalysisConfig, FateClass};
    use std::fs;

    const TWO_STAGE: &str = r#"
        n_states = 3
        n_symbols = 3
        start_states = [1]

        [[state]]
        id = 1
        kind = "interphase"
        symbols = [1]

        [[state]]
        id = 2
        kind = "mitosis"
        symbols = [1, 2]

        [[state]]
        id = 3
        kind = "interphase"
        stable = true
        symbols = [1, 3]

        [[transition]]
        from = 1
        to = 2

        [[transition]]
        from = 2
        to = 3
    "#;

    fn analysis() -> Analysis {
        let config = AnalysisConfig::new("unused.toml")
            .with_shape(3, 3)
            .with_onset(1, 100)
            .with_phase(1, vec![2]);
        Analysis::with_constraints(&config, load_from_str(TWO_STAGE).unwrap()).unwrap()
    }

    fn plate(name: &str, store: PathBuf) -> PlateConfig {
        PlateConfig {
            name: name.to_string(),
            store,
            time_lapse_min: 2.0,
        }
    }

    #[test]
    fn test_batch_over_plates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p1.json");
        fs::write(
            &path,
            r#"{
                "positions": [
                    {
                        "well": "B01", "site": 2,
                        "objects": [
                            { "id": 1, "time_index": 0, "label": 1 },
                            { "id": 2, "time_index": 1, "label": 1 },
                            { "id": 3, "time_index": 2, "label": 2 },
                            { "id": 4, "time_index": 3, "label": 2 },
                            { "id": 5, "time_index": 4, "label": 2 },
                            { "id": 6, "time_index": 5, "label": 3 }
                        ],
                        "links": [[2, 3], [3, 4], [4, 5], [5, 6]],
                        "events": [[1, 2]]
                    },
                    {
                        "well": "A01", "site": 1,
                        "objects": [{ "id": 1, "time_index": 0, "label": 1 }],
                        "events": [[1]]
                    },
                    { "well": "A02" }
                ]
            }"#,
        )
        .unwrap();

        let plates = vec![
            plate("p1", path),
            plate("missing", dir.path().join("missing.json")),
        ];
        let reports = run_batch(&analysis(), &plates);

        assert_eq!(reports.len(), 2);
        let p1 = &reports[0];
        assert!(p1.error.is_none());
        assert_eq!(p1.corrupt.len(), 1);
        assert_eq!(p1.corrupt[0].index, 2);

        // sorted by well and site
        assert_eq!(p1.positions[0].key.column_name(), "A01_01");
        assert_eq!(p1.positions[1].key.column_name(), "B01_02");

        // event [1] has no onset frame at index 1
        assert_eq!(p1.positions[0].outcome.skipped.len(), 1);

        let tracks = &p1.positions[1].outcome.tracks;
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].decoded, vec![1, 1, 2, 2, 2, 3]);
        assert_eq!(tracks[0].duration, Some(6.0));
        assert_eq!(tracks[0].fate, FateClass::MitoInt);
        assert_eq!(p1.track_count(), 1);
        assert_eq!(p1.skip_count(), 1);

        assert!(reports[1].error.is_some());
        assert!(reports[1].positions.is_empty());
    }
}
