use std::fmt;
use std::str::FromStr;

use log::debug;

use crate::analysis::expr::Expression;
use crate::analysis::lsq::{self, LmOptions, Polynomial};
use crate::analysis::roi::RegionOfInterestSet;
use crate::analysis::spline::{BSpline, SmoothingSpline};
use crate::error::FitError;

pub const MAX_POLYNOMIAL_DEGREE: usize = 100;
pub const DEFAULT_POLYNOMIAL_DEGREE: usize = 2;

// ---------------------------------------------------------------------------
// Fit kinds and their parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SplineParams {
    /// Residual sum of squares target; `None` uses the sample count.
    Smoothing(Option<f64>),
    /// Least-squares spline with interior knots at chunk boundaries.
    Segments(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitParameter {
    pub name: String,
    pub initial: f64,
    pub bounds: Option<(f64, f64)>,
}

impl FitParameter {
    pub fn new(name: &str, initial: f64) -> Self {
        FitParameter {
            name: name.to_string(),
            initial,
            bounds: None,
        }
    }

    pub fn bounded(mut self, min: f64, max: f64) -> Self {
        self.bounds = Some((min, max));
        self
    }
}

impl FromStr for FitParameter {
    type Err = FitError;

    /// `name=initial` or `name=initial:min:max`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || FitError::InvalidParameter(format!("'{s}' is not name=initial[:min:max]"));
        let (name, rest) = s.split_once('=').ok_or_else(bad)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(bad());
        }
        let numbers: Vec<f64> = rest
            .split(':')
            .map(|t| t.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| bad())?;
        match numbers.as_slice() {
            [initial] => Ok(FitParameter::new(name, *initial)),
            [initial, min, max] => Ok(FitParameter::new(name, *initial).bounded(*min, *max)),
            _ => Err(bad()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomFit {
    pub expression: String,
    pub parameters: Vec<FitParameter>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FitKind {
    Mean,
    Line,
    Polynomial { degree: usize },
    Spline(SplineParams),
    Custom(CustomFit),
}

impl FitKind {
    pub fn name(&self) -> &'static str {
        match self {
            FitKind::Mean => "mean",
            FitKind::Line => "line",
            FitKind::Polynomial { .. } => "polynomial",
            FitKind::Spline(_) => "spline",
            FitKind::Custom(_) => "custom",
        }
    }
}

impl fmt::Display for FitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FitKind {
    type Err = FitError;

    /// Parses the kind name with default parameters for it.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(FitKind::Mean),
            "line" => Ok(FitKind::Line),
            "polynomial" => Ok(FitKind::Polynomial {
                degree: DEFAULT_POLYNOMIAL_DEGREE,
            }),
            "spline" => Ok(FitKind::Spline(SplineParams::Smoothing(None))),
            "custom" => Ok(FitKind::Custom(CustomFit {
                expression: String::new(),
                parameters: Vec::new(),
            })),
            _ => Err(FitError::UnknownKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Optimise only on samples inside visible ROIs (when any are visible).
    pub restrict_optimization_to_rois: bool,
    /// Evaluate only at x inside visible ROIs instead of the full x.
    pub restrict_output_to_rois: bool,
    pub max_iterations: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            restrict_optimization_to_rois: true,
            restrict_output_to_rois: false,
            max_iterations: LmOptions::default().max_iterations,
        }
    }
}

// ---------------------------------------------------------------------------
// Fitted models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum FitModel {
    Constant(f64),
    Line { slope: f64, intercept: f64 },
    Polynomial(Polynomial),
    SmoothingSpline(SmoothingSpline),
    BSpline(BSpline),
    Custom { expression: Expression, params: Vec<f64> },
}

impl FitModel {
    pub fn evaluate(&self, x: f64) -> f64 {
        match self {
            FitModel::Constant(c) => *c,
            FitModel::Line { slope, intercept } => slope * x + intercept,
            FitModel::Polynomial(p) => p.evaluate(x),
            FitModel::SmoothingSpline(s) => s.evaluate(x),
            FitModel::BSpline(s) => s.evaluate(x),
            FitModel::Custom { expression, params } => expression.eval(x, params),
        }
    }

    pub fn evaluate_all(&self, x: &[f64]) -> Vec<f64> {
        x.iter().map(|&v| self.evaluate(v)).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub model: FitModel,
}

// ---------------------------------------------------------------------------
// Engine entry points
// ---------------------------------------------------------------------------

/// Fit `kind` to `(x, y)` and evaluate it over the full `x`, or over the
/// visible-ROI part of it when `restrict_output_to_rois` is set.
pub fn fit(
    x: &[f64],
    y: &[f64],
    kind: &FitKind,
    rois: &RegionOfInterestSet,
    options: &FitOptions,
) -> Result<FitResult, FitError> {
    let n = x.len().min(y.len());
    let output = if options.restrict_output_to_rois {
        rois.restrict(&x[..n], &y[..n], true).0
    } else {
        x[..n].to_vec()
    };
    fit_with_output(x, y, kind, rois, options, &output)
}

/// Like [`fit`] but evaluated at an arbitrary output domain.
pub fn fit_with_output(
    x: &[f64],
    y: &[f64],
    kind: &FitKind,
    rois: &RegionOfInterestSet,
    options: &FitOptions,
    output_domain: &[f64],
) -> Result<FitResult, FitError> {
    let n = x.len().min(y.len());
    let (xo, yo) = if options.restrict_optimization_to_rois {
        rois.restrict(&x[..n], &y[..n], true)
    } else {
        (x[..n].to_vec(), y[..n].to_vec())
    };
    let (xo, yo) = finite_samples(xo, yo);
    debug!("{kind} fit on {} of {n} samples", xo.len());

    let model = fit_model(&xo, &yo, kind, options.max_iterations)?;
    Ok(FitResult {
        x: output_domain.to_vec(),
        y: model.evaluate_all(output_domain),
        model,
    })
}

/// Fit `kind` to exactly the given samples.
pub fn fit_model(
    x: &[f64],
    y: &[f64],
    kind: &FitKind,
    max_iterations: usize,
) -> Result<FitModel, FitError> {
    match kind {
        FitKind::Mean => {
            if y.is_empty() {
                return Err(FitError::InsufficientData {
                    kind: "mean",
                    got: 0,
                    min: 1,
                });
            }
            Ok(FitModel::Constant(y.iter().sum::<f64>() / y.len() as f64))
        }
        FitKind::Line => {
            let (slope, intercept) = lsq::fit_line(x, y)?;
            Ok(FitModel::Line { slope, intercept })
        }
        FitKind::Polynomial { degree } => {
            if !(1..=MAX_POLYNOMIAL_DEGREE).contains(degree) {
                return Err(FitError::InvalidParameter(format!(
                    "polynomial degree {degree} is outside 1..={MAX_POLYNOMIAL_DEGREE}"
                )));
            }
            Ok(FitModel::Polynomial(lsq::polyfit(x, y, *degree)?))
        }
        FitKind::Spline(SplineParams::Smoothing(s)) => {
            let s = s.unwrap_or(x.len() as f64);
            Ok(FitModel::SmoothingSpline(SmoothingSpline::fit(x, y, s)?))
        }
        FitKind::Spline(SplineParams::Segments(segments)) => {
            if *segments == 0 {
                return Err(FitError::InvalidParameter(
                    "spline needs at least one segment".into(),
                ));
            }
            Ok(FitModel::BSpline(BSpline::fit_segments(x, y, *segments)?))
        }
        FitKind::Custom(custom) => fit_custom(x, y, custom, max_iterations),
    }
}

fn fit_custom(
    x: &[f64],
    y: &[f64],
    custom: &CustomFit,
    max_iterations: usize,
) -> Result<FitModel, FitError> {
    let names: Vec<String> = custom.parameters.iter().map(|p| p.name.clone()).collect();
    for (i, name) in names.iter().enumerate() {
        if names[..i].contains(name) {
            return Err(FitError::InvalidParameter(format!(
                "parameter '{name}' is declared twice"
            )));
        }
    }
    for p in &custom.parameters {
        if !p.initial.is_finite() {
            return Err(FitError::InvalidParameter(format!(
                "initial value of '{}' is not finite",
                p.name
            )));
        }
        if let Some((lo, hi)) = p.bounds {
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(FitError::InvalidParameter(format!(
                    "bounds of '{}' are not an interval: ({lo}, {hi})",
                    p.name
                )));
            }
        }
    }

    let expression = Expression::parse(&custom.expression, &names)
        .map_err(|e| FitError::Expression(e.to_string()))?;

    let n = x.len().min(y.len());
    let min = names.len().max(1);
    if n < min {
        return Err(FitError::InsufficientData {
            kind: "custom",
            got: n,
            min,
        });
    }

    let initial: Vec<f64> = custom.parameters.iter().map(|p| p.initial).collect();
    let bounds: Vec<Option<(f64, f64)>> = custom.parameters.iter().map(|p| p.bounds).collect();
    let options = LmOptions {
        max_iterations,
        ..LmOptions::default()
    };
    let params = lsq::levenberg_marquardt(
        |p| {
            x[..n]
                .iter()
                .zip(&y[..n])
                .map(|(&xi, &yi)| expression.eval(xi, p) - yi)
                .collect()
        },
        &initial,
        &bounds,
        options,
    )?;

    if params.iter().any(|v| !v.is_finite()) {
        return Err(FitError::Singular("custom"));
    }
    debug!("custom fit '{}' -> {params:?}", expression.text());
    Ok(FitModel::Custom { expression, params })
}

/// Drop samples where either coordinate is NaN or infinite.
fn finite_samples(x: Vec<f64>, y: Vec<f64>) -> (Vec<f64>, Vec<f64>) {
    if x.iter().chain(&y).all(|v| v.is_finite()) {
        return (x, y);
    }
    x.into_iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .unzip()
}
