//! Report generation
//!
//! Always writes `summary.json` with per-position counts and skip reasons.
//! Per plate, the configured format adds either the full track results
//! (`<plate>__tracks.json`) or the timing and class tables
//! (`<plate>__mito_timing.txt`, `<plate>__mito_classes.txt`), which hold
//! one tab-separated column per position.

use crate::config::OutputFormat;
use crate::runner::{PlateReport, PositionReport};
use anyhow::{Context, Result};
use cellfate_hmm::{FateClass, TrackSkip};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub version: String,
    pub started: String,
    pub finished: String,
    pub plates: Vec<PlateSummary>,
}

#[derive(Debug, Serialize)]
pub struct PlateSummary {
    pub name: String,
    pub error: Option<String>,
    pub corrupt_positions: usize,
    pub positions: Vec<PositionSummary>,
}

#[derive(Debug, Serialize)]
pub struct PositionSummary {
    pub position: String,
    pub tracks: usize,
    pub timed: usize,
    pub filtered: usize,
    pub fates: BTreeMap<&'static str, usize>,
    pub skipped: Vec<TrackSkip>,
}

impl RunSummary {
    pub fn new(started: DateTime<Local>, reports: &[PlateReport]) -> Self {
        Self {
            version: cellfate_hmm::VERSION.to_string(),
            started: started.to_rfc3339(),
            finished: Local::now().to_rfc3339(),
            plates: reports.iter().map(PlateSummary::from_report).collect(),
        }
    }

    pub fn total_tracks(&self) -> usize {
        self.plates
            .iter()
            .flat_map(|p| &p.positions)
            .map(|p| p.tracks)
            .sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.plates
            .iter()
            .flat_map(|p| &p.positions)
            .map(|p| p.skipped.len())
            .sum()
    }
}

impl PlateSummary {
    fn from_report(report: &PlateReport) -> Self {
        Self {
            name: report.name.clone(),
            error: report.error.clone(),
            corrupt_positions: report.corrupt.len(),
            positions: report
                .positions
                .iter()
                .map(|p| {
                    let mut fates = BTreeMap::new();
                    for track in &p.outcome.tracks {
                        *fates.entry(track.fate.name()).or_insert(0) += 1;
                    }
                    PositionSummary {
                        position: p.key.column_name(),
                        tracks: p.outcome.tracks.len(),
                        timed: p.outcome.durations().count(),
                        filtered: p.outcome.filtered,
                        fates,
                        skipped: p.outcome.skipped.clone(),
                    }
                })
                .collect(),
        }
    }
}

/// Write all output files, returning their paths
pub fn write_reports(
    dir: &Path,
    format: OutputFormat,
    reports: &[PlateReport],
    summary: &RunSummary,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {:?}", dir))?;

    let mut written = Vec::new();
    let path = dir.join("summary.json");
    write_json(&path, summary)?;
    written.push(path);

    for report in reports.iter().filter(|r| r.error.is_none()) {
        match format {
            OutputFormat::Json => {
                let path = dir.join(format!("{}__tracks.json", report.name));
                write_json(&path, report)?;
                written.push(path);
            }
            OutputFormat::Tsv => {
                let (timing, classes) = timing_table(&report.positions);
                let headers: Vec<String> =
                    report.positions.iter().map(|p| p.key.column_name()).collect();

                let path = dir.join(format!("{}__mito_timing.txt", report.name));
                write_columns(&path, &headers, &timing)?;
                written.push(path);

                let path = dir.join(format!("{}__mito_classes.txt", report.name));
                write_columns(&path, &headers, &classes)?;
                written.push(path);
            }
        }
    }

    for path in &written {
        log::info!("Wrote {:?}", path);
    }
    Ok(written)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, value)
        .with_context(|| format!("Failed to write output file: {:?}", path))?;
    out.flush()
        .with_context(|| format!("Failed to write output file: {:?}", path))
}

/// Phase durations and fate class indices per position, grouped by fate
/// class in class order
fn timing_table(positions: &[PositionReport]) -> (Vec<Vec<String>>, Vec<Vec<String>>) {
    let mut timing = Vec::with_capacity(positions.len());
    let mut classes = Vec::with_capacity(positions.len());

    for position in positions {
        let mut durations: Vec<(f64, FateClass)> = position.outcome.durations().collect();
        // stable sort keeps track order within a class
        durations.sort_by_key(|&(_, fate)| fate);
        timing.push(durations.iter().map(|(d, _)| format!("{:.2}", d)).collect());
        classes.push(durations.iter().map(|(_, f)| f.index().to_string()).collect());
    }

    (timing, classes)
}

/// Tab-separated columns of unequal length, padded with empty cells
fn write_columns(path: &Path, headers: &[String], columns: &[Vec<String>]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?;
    let mut out = BufWriter::new(file);

    writeln!(out, "{}", headers.join("\t"))?;
    let rows = columns.iter().map(Vec::len).max().unwrap_or(0);
    for row in 0..rows {
        let cells: Vec<&str> = columns
            .iter()
            .map(|c| c.get(row).map(String::as_str).unwrap_or(""))
            .collect();
        writeln!(out, "{}", cells.join("\t"))?;
    }
    out.flush()
        .with_context(|| format!("Failed to write output file: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PositionKey;
    use cellfate_hmm::PositionOutcome;

    fn position(well: &str, site: u32) -> PositionReport {
        PositionReport {
            key: PositionKey {
                well: well.to_string(),
                site,
            },
            outcome: PositionOutcome::default(),
        }
    }

    #[test]
    fn test_columns_are_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.txt");
        let headers = vec!["A01_01".to_string(), "A01_02".to_string()];
        let columns = vec![
            vec!["1".to_string(), "2".to_string(), "3".to_string()],
            vec!["4".to_string()],
        ];

        write_columns(&path, &headers, &columns).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "A01_01\tA01_02\n1\t4\n2\t\n3\t\n");
    }

    #[test]
    fn test_reports_for_empty_positions() {
        let dir = tempfile::tempdir().unwrap();
        let report = PlateReport {
            name: "p1".to_string(),
            store: PathBuf::from("p1.json"),
            time_lapse_min: 4.6,
            error: None,
            corrupt: Vec::new(),
            positions: vec![position("A01", 1), position("A01", 2)],
        };
        let reports = vec![report];
        let summary = RunSummary::new(Local::now(), &reports);
        assert_eq!(summary.total_tracks(), 0);

        let written = write_reports(dir.path(), OutputFormat::Tsv, &reports, &summary).unwrap();
        assert_eq!(written.len(), 3);

        let timing = fs::read_to_string(dir.path().join("p1__mito_timing.txt")).unwrap();
        assert_eq!(timing, "A01_01\tA01_02\n");

        let summary_json = fs::read_to_string(dir.path().join("summary.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&summary_json).unwrap();
        assert_eq!(value["plates"][0]["positions"][1]["position"], "A01_02");
    }
}
