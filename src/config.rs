use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::fit::{FitOptions, DEFAULT_POLYNOMIAL_DEGREE};
use crate::analysis::lsq::LmOptions;
use crate::analysis::measure::MeasurementKind;

/// Defaults for fits and measurements. Every field is optional in the JSON
/// file; missing ones take the values below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub restrict_optimization_to_rois: bool,
    pub restrict_output_to_rois: bool,
    pub polynomial_degree: usize,
    /// `None` uses the number of fitted samples.
    pub spline_smoothing: Option<f64>,
    pub spline_segments: usize,
    pub max_iterations: usize,
    pub fit_name: String,
    /// `None` names measurement series after their kind.
    pub measurement_name: Option<String>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            restrict_optimization_to_rois: true,
            restrict_output_to_rois: false,
            polynomial_degree: DEFAULT_POLYNOMIAL_DEGREE,
            spline_smoothing: None,
            spline_segments: 10,
            max_iterations: LmOptions::default().max_iterations,
            fit_name: "fit".to_string(),
            measurement_name: None,
        }
    }
}

impl AnalysisSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read settings file {}", path.display()))?;
        let settings: AnalysisSettings = serde_json::from_str(&text)
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        log::debug!("Loaded settings from {}: {settings:?}", path.display());
        Ok(settings)
    }

    /// Load `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            restrict_optimization_to_rois: self.restrict_optimization_to_rois,
            restrict_output_to_rois: self.restrict_output_to_rois,
            max_iterations: self.max_iterations,
        }
    }

    pub fn measurement_name(&self, kind: MeasurementKind) -> String {
        self.measurement_name
            .clone()
            .unwrap_or_else(|| kind.label().to_string())
    }
}
