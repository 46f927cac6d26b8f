use anyhow::{bail, Context, Result};
use glob::glob;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Looked up in the working directory; every key is optional.
pub const CONFIG_FILE: &str = "mctsrate.yaml";

/// What to do with a state whose playout total is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ZeroTotal {
    /// Abort the run, naming the offending state.
    #[default]
    Error,
    /// Drop the state and keep going.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    pub enabled: bool,
    pub bins: usize,
    pub width: u32,
    pub height: u32,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bins: 1000,
            width: 1200,
            height: 700,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub valid_fraction: f64,
    pub train_path: PathBuf,
    pub valid_path: PathBuf,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            valid_fraction: 0.1,
            train_path: PathBuf::from("train.csv"),
            valid_path: PathBuf::from("valid.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Glob patterns of input files, processed in order.
    pub inputs: Vec<String>,
    pub output_suffix: String,
    /// Share of rate==0.0 and rate==1.0 rows that survive downsampling.
    pub keep_fraction: f64,
    pub seed: Option<u64>,
    pub zero_total: ZeroTotal,
    pub histogram: HistogramConfig,
    pub split: Option<SplitConfig>,
    pub history_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inputs: vec!["0.csv".to_string()],
            output_suffix: "_processed".to_string(),
            keep_fraction: 0.125,
            seed: None,
            zero_total: ZeroTotal::Error,
            histogram: HistogramConfig::default(),
            split: None,
            history_dir: None,
        }
    }
}

impl Config {
    /// Load `path` if it exists, otherwise fall back to the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_yaml(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.keep_fraction) {
            bail!("keep_fraction must be within [0, 1], got {}", self.keep_fraction);
        }
        if self.histogram.bins == 0 {
            bail!("histogram.bins must be at least 1");
        }
        if let Some(split) = &self.split {
            if !(0.0..=1.0).contains(&split.valid_fraction) {
                bail!(
                    "split.valid_fraction must be within [0, 1], got {}",
                    split.valid_fraction
                );
            }
        }
        if self.inputs.is_empty() {
            bail!("inputs must name at least one file or pattern");
        }
        Ok(())
    }

    /// Expand `inputs` into concrete paths. A pattern that matches nothing is
    /// an error so a missing input fails the run instead of being skipped.
    pub fn resolve_inputs(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for pattern in &self.inputs {
            let before = paths.len();
            for entry in glob(pattern).with_context(|| format!("bad input pattern {}", pattern))? {
                let path = entry.with_context(|| format!("reading match of {}", pattern))?;
                if path.is_file() && !paths.contains(&path) {
                    paths.push(path);
                }
            }
            if paths.len() == before {
                bail!("input {} not found", pattern);
            }
        }
        Ok(paths)
    }

    /// `<dir>/0.csv` becomes `<dir>/0<suffix>.csv`.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        sibling_with_suffix(input, &self.output_suffix, "csv")
    }

    pub fn histogram_path(&self, input: &Path) -> PathBuf {
        sibling_with_suffix(input, "_histogram", "svg")
    }
}

fn sibling_with_suffix(input: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    input.with_file_name(format!("{}{}.{}", stem, suffix, ext))
}
