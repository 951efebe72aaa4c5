use std::fmt::Display;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::evaluate::EvaluateError;
use crate::types::OptionLabel;

/// Width every sheet is rescaled to before detection.
pub const DEFAULT_CANONICAL_WIDTH: u32 = 1000;

/// Horizontal bucket size used to order bubbles column by column.
pub const DEFAULT_COL_WIDTH_TOLERANCE: u32 = 250;

pub const DEFAULT_OPTION_LABELS: [&str; 4] = ["a", "b", "c", "d"];

/// Everything that tunes a single evaluation. Loaded from JSON with
/// `camelCase` keys; missing keys fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluateOptions {
    /// Labels of the options in left-to-right order. Their count is the
    /// number of bubbles per question.
    pub options: Vec<OptionLabel>,
    pub col_width_tolerance: u32,
    pub canonical_width: u32,
    pub threshold: ThresholdOptions,
    pub fill_thresholds: FillThresholds,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self {
            options: DEFAULT_OPTION_LABELS
                .iter()
                .map(|label| OptionLabel::from(*label))
                .collect(),
            col_width_tolerance: DEFAULT_COL_WIDTH_TOLERANCE,
            canonical_width: DEFAULT_CANONICAL_WIDTH,
            threshold: ThresholdOptions::default(),
            fill_thresholds: FillThresholds::default(),
        }
    }
}

/// Parameters of the adaptive binarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThresholdOptions {
    /// Side of the square neighbourhood, in pixels. Must be odd.
    pub block_size: u32,
    /// How many levels darker than its neighbourhood a pixel must be to count
    /// as ink.
    pub bias: i32,
}

impl Default for ThresholdOptions {
    fn default() -> Self {
        Self {
            block_size: 9,
            bias: 2,
        }
    }
}

/// The two tests a bubble's ink count must pass to be considered filled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FillThresholds {
    /// Absolute noise floor; the darkest bubble must exceed it.
    pub min_fill: u32,
    /// The darkest bubble must exceed this multiple of the mean of the others.
    pub dominance: f64,
}

impl Default for FillThresholds {
    fn default() -> Self {
        Self {
            min_fill: 15,
            dominance: 1.5,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Json(PathBuf, serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "cannot read {}: {}", path.display(), e),
            ConfigError::Json(path, e) => write!(f, "invalid config {}: {}", path.display(), e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl EvaluateOptions {
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_json::from_str(&json).map_err(|e| ConfigError::Json(path.to_path_buf(), e))
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), EvaluateError> {
        if self.options.is_empty() {
            return Err(EvaluateError::InvalidConfig(
                "at least one option label is required".to_string(),
            ));
        }
        if self.col_width_tolerance == 0 {
            return Err(EvaluateError::InvalidConfig(
                "column width tolerance must be positive".to_string(),
            ));
        }
        if self.canonical_width == 0 {
            return Err(EvaluateError::InvalidConfig(
                "canonical width must be positive".to_string(),
            ));
        }
        if self.threshold.block_size < 3 || self.threshold.block_size % 2 == 0 {
            return Err(EvaluateError::InvalidConfig(format!(
                "threshold block size must be odd and at least 3, got {}",
                self.threshold.block_size
            )));
        }
        if !self.fill_thresholds.dominance.is_finite() || self.fill_thresholds.dominance < 0.0 {
            return Err(EvaluateError::InvalidConfig(format!(
                "dominance factor must be a non-negative number, got {}",
                self.fill_thresholds.dominance
            )));
        }
        Ok(())
    }
}
