//! Cubic splines for curve fitting.
//!
//! Two parameterisations are supported:
//!
//! * [`SmoothingSpline`]: a natural cubic smoothing spline (Reinsch). The
//!   smoothing factor `s` is the residual sum of squares the spline is allowed;
//!   `s = 0` interpolates and large `s` relaxes towards the least-squares line.
//! * [`BSpline`]: a least-squares cubic B-spline with caller-chosen interior
//!   knots.
//!
//! Both require at least four samples with strictly increasing x.

use log::debug;
use nalgebra::{DMatrix, DVector};

use super::lsq;
use crate::error::FitError;

const MIN_POINTS: usize = 4;

/// Sort `(x, y)` by x and reject repeated abscissae.
fn sorted_samples(x: &[f64], y: &[f64]) -> Result<(Vec<f64>, Vec<f64>), FitError> {
    let n = x.len().min(y.len());
    if n < MIN_POINTS {
        return Err(FitError::InsufficientData {
            kind: "spline",
            got: n,
            min: MIN_POINTS,
        });
    }
    if x[..n].iter().chain(&y[..n]).any(|v| !v.is_finite()) {
        return Err(FitError::InvalidInput("spline data must be finite".into()));
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));
    let xs: Vec<f64> = order.iter().map(|&i| x[i]).collect();
    let ys: Vec<f64> = order.iter().map(|&i| y[i]).collect();
    if xs.windows(2).any(|w| w[1] <= w[0]) {
        return Err(FitError::InvalidInput(
            "spline x values must be distinct".into(),
        ));
    }
    Ok((xs, ys))
}

// ---------------------------------------------------------------------------
// Natural cubic smoothing spline
// ---------------------------------------------------------------------------

/// Natural cubic spline given by its values `g` and second derivatives
/// `gamma` at the knots `x`. Outside the knots it continues linearly.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingSpline {
    x: Vec<f64>,
    g: Vec<f64>,
    gamma: Vec<f64>,
}

/// Symmetric pentadiagonal system stored by bands.
struct Pentadiagonal {
    d0: Vec<f64>,
    d1: Vec<f64>,
    d2: Vec<f64>,
}

impl Pentadiagonal {
    /// LDLᵀ solve. The matrices built here are positive definite.
    fn solve(&self, rhs: &[f64]) -> Vec<f64> {
        let m = self.d0.len();
        let mut d = vec![0.0; m];
        let mut l1 = vec![0.0; m];
        let mut l2 = vec![0.0; m];
        for i in 0..m {
            let mut di = self.d0[i];
            if i >= 1 {
                di -= l1[i - 1] * l1[i - 1] * d[i - 1];
            }
            if i >= 2 {
                di -= l2[i - 2] * l2[i - 2] * d[i - 2];
            }
            d[i] = di;
            if i + 1 < m {
                let mut a = self.d1[i];
                if i >= 1 {
                    a -= l2[i - 1] * l1[i - 1] * d[i - 1];
                }
                l1[i] = a / di;
            }
            if i + 2 < m {
                l2[i] = self.d2[i] / di;
            }
        }

        let mut z = vec![0.0; m];
        for i in 0..m {
            let mut zi = rhs[i];
            if i >= 1 {
                zi -= l1[i - 1] * z[i - 1];
            }
            if i >= 2 {
                zi -= l2[i - 2] * z[i - 2];
            }
            z[i] = zi;
        }
        let mut u = vec![0.0; m];
        for i in (0..m).rev() {
            let mut ui = z[i] / d[i];
            if i + 1 < m {
                ui -= l1[i] * u[i + 1];
            }
            if i + 2 < m {
                ui -= l2[i] * u[i + 2];
            }
            u[i] = ui;
        }
        u
    }
}

/// Reinsch formulation for fixed knots: `(R + αQᵀQ)γ = Qᵀy`, `g = y - αQγ`.
struct Reinsch<'a> {
    x: &'a [f64],
    y: &'a [f64],
    h: Vec<f64>,
    qty: Vec<f64>,
    r: Pentadiagonal,
    qtq: Pentadiagonal,
}

impl<'a> Reinsch<'a> {
    fn new(x: &'a [f64], y: &'a [f64]) -> Self {
        let n = x.len();
        let m = n - 2;
        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let inv: Vec<f64> = h.iter().map(|v| 1.0 / v).collect();

        let mut qty = vec![0.0; m];
        let mut r = Pentadiagonal {
            d0: vec![0.0; m],
            d1: vec![0.0; m],
            d2: vec![0.0; m],
        };
        let mut qtq = Pentadiagonal {
            d0: vec![0.0; m],
            d1: vec![0.0; m],
            d2: vec![0.0; m],
        };
        // interior knot j = k + 1
        for k in 0..m {
            let j = k + 1;
            qty[k] = (y[j + 1] - y[j]) * inv[j] - (y[j] - y[j - 1]) * inv[j - 1];
            r.d0[k] = (h[j - 1] + h[j]) / 3.0;
            r.d1[k] = h[j] / 6.0;
            qtq.d0[k] = inv[j - 1].powi(2) + (inv[j - 1] + inv[j]).powi(2) + inv[j].powi(2);
            if k + 1 < m {
                qtq.d1[k] = -(inv[j - 1] + inv[j]) * inv[j] - (inv[j] + inv[j + 1]) * inv[j];
            }
            if k + 2 < m {
                qtq.d2[k] = inv[j] * inv[j + 1];
            }
        }
        Reinsch { x, y, h, qty, r, qtq }
    }

    /// Values and second derivatives for smoothing weight `alpha`.
    fn solve(&self, alpha: f64) -> (Vec<f64>, Vec<f64>) {
        let n = self.x.len();
        let system = Pentadiagonal {
            d0: zip_add(&self.r.d0, &self.qtq.d0, alpha),
            d1: zip_add(&self.r.d1, &self.qtq.d1, alpha),
            d2: zip_add(&self.r.d2, &self.qtq.d2, alpha),
        };
        let interior = system.solve(&self.qty);

        let mut gamma = vec![0.0; n];
        gamma[1..n - 1].copy_from_slice(&interior);

        let g = (0..n)
            .map(|i| {
                let mut q_gamma = 0.0;
                if i >= 1 {
                    q_gamma += gamma[i - 1] / self.h[i - 1] - gamma[i] / self.h[i - 1];
                }
                if i + 1 < n {
                    q_gamma += gamma[i + 1] / self.h[i] - gamma[i] / self.h[i];
                }
                self.y[i] - alpha * q_gamma
            })
            .collect();
        (g, gamma)
    }

    fn residual(&self, g: &[f64]) -> f64 {
        self.y.iter().zip(g).map(|(a, b)| (a - b).powi(2)).sum()
    }
}

fn zip_add(a: &[f64], b: &[f64], scale: f64) -> Vec<f64> {
    a.iter().zip(b).map(|(u, v)| u + scale * v).collect()
}

impl SmoothingSpline {
    /// Fit with residual sum of squares `smoothing`.
    pub fn fit(x: &[f64], y: &[f64], smoothing: f64) -> Result<Self, FitError> {
        if !(smoothing >= 0.0) || !smoothing.is_finite() {
            return Err(FitError::InvalidParameter(format!(
                "smoothing must be a non-negative number, got {smoothing}"
            )));
        }
        let (xs, ys) = sorted_samples(x, y)?;
        let n = xs.len();

        let (slope, intercept) = lsq::fit_line(&xs, &ys)?;
        let line: Vec<f64> = xs.iter().map(|v| slope * v + intercept).collect();
        let line_residual: f64 = ys.iter().zip(&line).map(|(a, b)| (a - b).powi(2)).sum();
        if smoothing >= line_residual {
            return Ok(SmoothingSpline {
                x: xs,
                g: line,
                gamma: vec![0.0; n],
            });
        }

        let reinsch = Reinsch::new(&xs, &ys);
        if smoothing == 0.0 {
            let (g, gamma) = reinsch.solve(0.0);
            return Ok(SmoothingSpline { x: xs.clone(), g, gamma });
        }

        // residual grows monotonically with alpha; bracket then bisect in log space
        let residual_at = |alpha: f64| reinsch.residual(&reinsch.solve(alpha).0);
        let (mut lo, mut hi) = (1.0, 1.0);
        if residual_at(1.0) < smoothing {
            for _ in 0..200 {
                lo = hi;
                hi *= 10.0;
                if residual_at(hi) >= smoothing {
                    break;
                }
            }
        } else {
            for _ in 0..200 {
                hi = lo;
                lo /= 10.0;
                if residual_at(lo) < smoothing {
                    break;
                }
            }
        }
        for _ in 0..100 {
            if hi / lo < 1.0 + 1e-10 {
                break;
            }
            let mid = (lo * hi).sqrt();
            if residual_at(mid) < smoothing {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let alpha = (lo * hi).sqrt();
        let (g, gamma) = reinsch.solve(alpha);
        debug!(
            "smoothing spline: n={n}, s={smoothing}, alpha={alpha:e}, rss={:e}",
            reinsch.residual(&g)
        );
        Ok(SmoothingSpline { x: xs.clone(), g, gamma })
    }

    pub fn knots(&self) -> &[f64] {
        &self.x
    }

    /// Fitted values at the knots.
    pub fn values(&self) -> &[f64] {
        &self.g
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        let x = &self.x;
        let n = x.len();
        if t < x[0] {
            let h = x[1] - x[0];
            let slope = (self.g[1] - self.g[0]) / h - h * self.gamma[1] / 6.0;
            return self.g[0] + slope * (t - x[0]);
        }
        if t > x[n - 1] {
            let h = x[n - 1] - x[n - 2];
            let slope = (self.g[n - 1] - self.g[n - 2]) / h + h * self.gamma[n - 2] / 6.0;
            return self.g[n - 1] + slope * (t - x[n - 1]);
        }
        let i = x.partition_point(|&v| v <= t).clamp(1, n - 1) - 1;
        let h = x[i + 1] - x[i];
        let a = (x[i + 1] - t) / h;
        let b = 1.0 - a;
        a * self.g[i]
            + b * self.g[i + 1]
            + ((a.powi(3) - a) * self.gamma[i] + (b.powi(3) - b) * self.gamma[i + 1]) * h * h / 6.0
    }
}

// ---------------------------------------------------------------------------
// Least-squares cubic B-spline with fixed knots
// ---------------------------------------------------------------------------

const DEGREE: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct BSpline {
    /// Full knot vector including the four-fold boundary knots.
    knots: Vec<f64>,
    coefficients: Vec<f64>,
}

impl BSpline {
    /// Interior knots at the boundaries of `num_segments` equal-count chunks
    /// of the sorted samples. When that yields fewer than two knots, the
    /// second and second-to-last samples are used instead.
    pub fn fit_segments(x: &[f64], y: &[f64], num_segments: usize) -> Result<Self, FitError> {
        if num_segments == 0 {
            return Err(FitError::InvalidParameter(
                "number of spline segments must be at least 1".into(),
            ));
        }
        let (xs, ys) = sorted_samples(x, y)?;
        let n = xs.len();
        let chunk = n / num_segments;
        let mut interior: Vec<f64> = if chunk == 0 {
            Vec::new()
        } else {
            (1..num_segments)
                .map(|k| k * chunk)
                .filter(|&i| i >= 1 && i <= n - 2)
                .map(|i| xs[i])
                .collect()
        };
        interior.dedup();
        if interior.len() < 2 {
            interior = vec![xs[1], xs[n - 2]];
        }
        Self::fit_sorted(&xs, &ys, &interior)
    }

    /// Least-squares fit with explicit interior knots.
    pub fn fit_with_knots(x: &[f64], y: &[f64], interior: &[f64]) -> Result<Self, FitError> {
        let (xs, ys) = sorted_samples(x, y)?;
        Self::fit_sorted(&xs, &ys, interior)
    }

    fn fit_sorted(xs: &[f64], ys: &[f64], interior: &[f64]) -> Result<Self, FitError> {
        let (a, b) = (xs[0], xs[xs.len() - 1]);
        if interior.windows(2).any(|w| w[1] <= w[0])
            || interior.iter().any(|&k| !(k > a && k < b))
        {
            return Err(FitError::InvalidParameter(
                "interior knots must be increasing and inside the data range".into(),
            ));
        }

        let mut knots = vec![a; DEGREE + 1];
        knots.extend_from_slice(interior);
        knots.extend(std::iter::repeat(b).take(DEGREE + 1));
        let ncoef = knots.len() - DEGREE - 1;
        if xs.len() < ncoef {
            return Err(FitError::InsufficientData {
                kind: "spline",
                got: xs.len(),
                min: ncoef,
            });
        }

        let mut design = DMatrix::zeros(xs.len(), ncoef);
        for (row, &t) in xs.iter().enumerate() {
            let span = find_span(&knots, ncoef, t);
            for (offset, value) in basis_functions(&knots, span, t).into_iter().enumerate() {
                design[(row, span - DEGREE + offset)] = value;
            }
        }

        let svd = design.svd(true, true);
        let tolerance = (xs.len() as f64) * f64::EPSILON * svd.singular_values.max();
        if svd.rank(tolerance) < ncoef {
            return Err(FitError::Singular("spline"));
        }
        let solution = svd
            .solve(&DVector::from_column_slice(ys), tolerance)
            .map_err(|e| FitError::InvalidInput(e.to_string()))?;

        Ok(BSpline {
            knots,
            coefficients: solution.iter().copied().collect(),
        })
    }

    /// Interior knots only.
    pub fn interior_knots(&self) -> &[f64] {
        &self.knots[DEGREE + 1..self.knots.len() - DEGREE - 1]
    }

    /// Outside the data range the end polynomial pieces are extended.
    pub fn evaluate(&self, t: f64) -> f64 {
        let ncoef = self.coefficients.len();
        let span = find_span(&self.knots, ncoef, t);
        basis_functions(&self.knots, span, t)
            .iter()
            .enumerate()
            .map(|(offset, v)| v * self.coefficients[span - DEGREE + offset])
            .sum()
    }
}

/// Knot span index `i` with `knots[i] <= t < knots[i + 1]`, clamped to the
/// first and last non-empty spans.
fn find_span(knots: &[f64], ncoef: usize, t: f64) -> usize {
    let upper = knots.partition_point(|&k| k <= t).saturating_sub(1);
    upper.clamp(DEGREE, ncoef - 1)
}

/// The `DEGREE + 1` non-zero basis functions on `span` (Cox–de Boor).
fn basis_functions(knots: &[f64], span: usize, t: f64) -> [f64; DEGREE + 1] {
    let mut n = [0.0; DEGREE + 1];
    let mut left = [0.0; DEGREE + 1];
    let mut right = [0.0; DEGREE + 1];
    n[0] = 1.0;
    for j in 1..=DEGREE {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            let temp = n[r] / (right[r + 1] + left[j - r]);
            n[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n[j] = saved;
    }
    n
}
