//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use cellfate_hmm::{AnalysisConfig, BranchSelection, Label, TopologyWeights};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub hmm: HmmConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub phase: PhaseConfig,
    #[serde(rename = "plate")]
    pub plates: Vec<PlateConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Model settings. Every field but `constraint_file` defaults to the
/// library's [`AnalysisConfig`] value, as do the other analysis sections.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HmmConfig {
    pub n_classes: usize,
    pub n_obs: usize,
    pub constraint_file: PathBuf,
    pub weights: TopologyWeights,
    pub misclassification_rate: f64,
}

impl Default for HmmConfig {
    fn default() -> Self {
        let defaults = AnalysisConfig::new(PathBuf::new());
        Self {
            n_classes: defaults.n_classes,
            n_obs: defaults.n_obs,
            constraint_file: defaults.constraint_file,
            weights: defaults.weights,
            misclassification_rate: defaults.misclassification_rate,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub onset_frame: usize,
    pub events_before_frame: u32,
    pub max_track_frames: usize,
    pub branch_selection: BranchSelection,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        let defaults = AnalysisConfig::new(PathBuf::new());
        Self {
            onset_frame: defaults.onset_frame,
            events_before_frame: defaults.events_before_frame,
            max_track_frames: defaults.max_track_frames,
            branch_selection: defaults.branch_selection,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PhaseConfig {
    pub onset_label: Label,
    pub phase_labels: Vec<Label>,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        let defaults = AnalysisConfig::new(PathBuf::new());
        Self {
            onset_label: defaults.onset_label,
            phase_labels: defaults.phase_labels,
        }
    }
}

/// One plate: a tracking store and its acquisition interval
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlateConfig {
    pub name: String,
    pub store: PathBuf,
    /// Minutes between frames
    pub time_lapse_min: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: OutputFormat::default(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Full per-track results
    #[default]
    Json,
    /// Timing and class tables, one column per position
    Tsv,
}

impl AppConfig {
    /// Library configuration for model construction and track processing
    pub fn analysis(&self) -> AnalysisConfig {
        AnalysisConfig::new(self.hmm.constraint_file.clone())
            .with_shape(self.hmm.n_classes, self.hmm.n_obs)
            .with_weights(self.hmm.weights)
            .with_onset(self.tracking.onset_frame, self.tracking.events_before_frame)
            .with_max_track_frames(self.tracking.max_track_frames)
            .with_branch_selection(self.tracking.branch_selection)
            .with_phase(self.phase.onset_label, self.phase.phase_labels.clone())
            .with_misclassification_rate(self.hmm.misclassification_rate)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() && !p.as_os_str().is_empty() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.hmm.constraint_file);
        resolve(&mut self.output.dir);
        for plate in &mut self.plates {
            resolve(&mut plate.store);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.hmm.constraint_file.as_os_str().is_empty() {
            bail!("[hmm] constraint_file is required");
        }
        if self.plates.is_empty() {
            bail!("No [[plate]] entries configured");
        }
        for plate in &self.plates {
            if !(plate.time_lapse_min.is_finite() && plate.time_lapse_min > 0.0) {
                bail!(
                    "Plate {}: time_lapse_min must be positive, got {}",
                    plate.name,
                    plate.time_lapse_min
                );
            }
        }
        if self.phase.phase_labels.is_empty() {
            bail!("[phase] phase_labels must not be empty");
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
///
/// Relative paths are resolved against the directory of the config file.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.resolve_paths(base);
    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [hmm]
        constraint_file = "constraints/graph_5_to_17.toml"

        [[plate]]
        name = "002338"
        store = "data/002338.json"
        time_lapse_min = 4.6
    "#;

    #[test]
    fn test_config_deserialization() {
        let config: AppConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.hmm.n_classes, 17);
        assert_eq!(config.tracking.onset_frame, 4);
        assert_eq!(config.phase.phase_labels, vec![2, 3]);
        assert_eq!(config.plates.len(), 1);
        assert_eq!(config.output.format, OutputFormat::Json);

        let analysis = config.analysis();
        assert_eq!(analysis.events_before_frame, 99_999);
        assert_eq!(analysis.branch_selection, BranchSelection::Reject);
        assert_eq!(analysis.misclassification_rate, 1e-3);
    }

    #[test]
    fn test_sections_share_library_defaults() {
        let config: AppConfig = toml::from_str(MINIMAL).unwrap();
        let defaults = AnalysisConfig::new(config.hmm.constraint_file.clone());
        let analysis = config.analysis();

        assert_eq!(analysis.n_classes, defaults.n_classes);
        assert_eq!(analysis.n_obs, defaults.n_obs);
        assert_eq!(analysis.onset_frame, defaults.onset_frame);
        assert_eq!(analysis.max_track_frames, defaults.max_track_frames);
        assert_eq!(analysis.onset_label, defaults.onset_label);
        assert_eq!(analysis.phase_labels, defaults.phase_labels);

        // a partly filled section keeps the remaining defaults
        let config: AppConfig = toml::from_str(&format!(
            "{}\n[tracking]\nonset_frame = 2\n",
            MINIMAL.replace("[[plate]]", "misclassification_rate = 0.0\n\n[[plate]]")
        ))
        .unwrap();
        assert_eq!(config.tracking.onset_frame, 2);
        assert_eq!(config.tracking.events_before_frame, defaults.events_before_frame);
        assert_eq!(config.analysis().misclassification_rate, 0.0);
    }

    #[test]
    fn test_full_config() {
        let config: AppConfig = toml::from_str(
            r#"
            [hmm]
            n_classes = 3
            n_obs = 3
            constraint_file = "three.toml"

            [hmm.weights]
            stable_self_weight = 50.0

            [tracking]
            onset_frame = 2
            events_before_frame = 100
            branch_selection = "first"

            [phase]
            onset_label = 1
            phase_labels = [2]

            [[plate]]
            name = "a"
            store = "a.json"
            time_lapse_min = 3.0

            [[plate]]
            name = "b"
            store = "b.json"
            time_lapse_min = 5.0

            [output]
            dir = "results"
            format = "tsv"
            "#,
        )
        .unwrap();

        let analysis = config.analysis();
        assert_eq!(analysis.n_classes, 3);
        assert_eq!(analysis.onset_frame, 2);
        assert_eq!(analysis.branch_selection, BranchSelection::First);
        assert_eq!(analysis.weights.stable_self_weight, 50.0);
        assert_eq!(config.plates[1].name, "b");
        assert_eq!(config.output.format, OutputFormat::Tsv);
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(
            config.hmm.constraint_file,
            dir.path().join("constraints/graph_5_to_17.toml")
        );
        assert_eq!(config.plates[0].store, dir.path().join("data/002338.json"));
        assert_eq!(config.output.dir, dir.path().join("out"));
    }

    #[test]
    fn test_load_rejects_bad_time_lapse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, MINIMAL.replace("4.6", "0.0")).unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("time_lapse_min"));
    }

    #[test]
    fn test_load_requires_constraint_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            MINIMAL.replace("constraint_file = \"constraints/graph_5_to_17.toml\"", "n_obs = 5"),
        )
        .unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("constraint_file is required"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
