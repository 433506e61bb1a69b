//! Least-squares solvers: straight lines, polynomials and bounded
//! Levenberg–Marquardt for arbitrary models.

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};

use crate::error::FitError;

// ---------------------------------------------------------------------------
// Straight line
// ---------------------------------------------------------------------------

/// Ordinary least-squares `y = slope * x + intercept`.
pub fn fit_line(x: &[f64], y: &[f64]) -> Result<(f64, f64), FitError> {
    let n = x.len().min(y.len());
    if n < 2 {
        return Err(FitError::InsufficientData {
            kind: "line",
            got: n,
            min: 2,
        });
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;
    let (sxx, sxy) = x[..n]
        .iter()
        .zip(&y[..n])
        .fold((0.0, 0.0), |(sxx, sxy), (&xi, &yi)| {
            (sxx + (xi - mx) * (xi - mx), sxy + (xi - mx) * (yi - my))
        });
    if sxx == 0.0 || !sxx.is_finite() {
        return Err(FitError::Singular("line"));
    }
    let slope = sxy / sxx;
    Ok((slope, my - slope * mx))
}

// ---------------------------------------------------------------------------
// Polynomial
// ---------------------------------------------------------------------------

/// A polynomial stored in the centred and scaled variable
/// `t = (x - center) / scale`, which keeps high degrees well conditioned.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    /// Ascending powers of `t`.
    coefficients: Vec<f64>,
    center: f64,
    scale: f64,
}

impl Polynomial {
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let t = (x - self.center) / self.scale;
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * t + c)
    }

    /// Coefficients in ascending powers of `x` itself.
    pub fn coefficients(&self) -> Vec<f64> {
        // Horner's scheme on polynomials: r(x) = r(x) * (x - c) / s + a_k
        let a = 1.0 / self.scale;
        let b = -self.center / self.scale;
        let mut result = vec![0.0; self.coefficients.len()];
        for &ak in self.coefficients.iter().rev() {
            let mut next = vec![0.0; result.len()];
            for (i, &ri) in result.iter().enumerate() {
                next[i] += ri * b;
                if i + 1 < next.len() {
                    next[i + 1] += ri * a;
                }
            }
            next[0] += ak;
            result = next;
        }
        result
    }
}

/// Least-squares polynomial of the given degree, solved with an SVD of the
/// Vandermonde matrix.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Result<Polynomial, FitError> {
    let n = x.len().min(y.len());
    if n < degree + 1 {
        return Err(FitError::InsufficientData {
            kind: "polynomial",
            got: n,
            min: degree + 1,
        });
    }

    let center = x[..n].iter().sum::<f64>() / n as f64;
    let spread = x[..n]
        .iter()
        .map(|v| (v - center).abs())
        .fold(0.0, f64::max);
    let scale = if spread > 0.0 && spread.is_finite() { spread } else { 1.0 };

    let vandermonde = DMatrix::from_fn(n, degree + 1, |i, j| {
        ((x[i] - center) / scale).powi(j as i32)
    });
    let rhs = DVector::from_column_slice(&y[..n]);

    let svd = vandermonde.svd(true, true);
    let sigma_max = svd.singular_values.max();
    let tolerance = (n.max(degree + 1) as f64) * f64::EPSILON * sigma_max;
    if svd.rank(tolerance) < degree + 1 {
        return Err(FitError::Singular("polynomial"));
    }
    let solution = svd
        .solve(&rhs, tolerance)
        .map_err(|e| FitError::InvalidInput(e.to_string()))?;

    Ok(Polynomial {
        coefficients: solution.iter().copied().collect(),
        center,
        scale,
    })
}

// ---------------------------------------------------------------------------
// Bounded Levenberg–Marquardt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    pub max_iterations: usize,
    /// Relative cost decrease below which the search stops.
    pub tolerance: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        LmOptions {
            max_iterations: 200,
            tolerance: 1e-12,
        }
    }
}

fn project(p: &mut [f64], bounds: &[Option<(f64, f64)>]) {
    for (v, b) in p.iter_mut().zip(bounds) {
        if let Some((lo, hi)) = b {
            *v = v.clamp(*lo, *hi);
        }
    }
}

fn sum_of_squares(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

/// Minimise `Σ residuals(p)²` starting from `initial`. Parameters with bounds
/// are kept inside them by projecting every trial step.
pub fn levenberg_marquardt<F>(
    residuals: F,
    initial: &[f64],
    bounds: &[Option<(f64, f64)>],
    options: LmOptions,
) -> Result<Vec<f64>, FitError>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let k = initial.len();
    let mut p = initial.to_vec();
    project(&mut p, bounds);

    let mut r = residuals(&p);
    let mut cost = sum_of_squares(&r);
    if !cost.is_finite() {
        return Err(FitError::InvalidInput(
            "model is not finite at the initial parameters".into(),
        ));
    }
    if k == 0 {
        return Ok(p);
    }

    let m = r.len();
    let mut lambda = 1e-3;
    let step_base = f64::EPSILON.sqrt();

    for iteration in 0..options.max_iterations {
        // forward differences, stepping backwards at an upper bound
        let mut jacobian = DMatrix::zeros(m, k);
        for j in 0..k {
            let mut h = step_base * p[j].abs().max(1.0);
            if let Some(Some((_, hi))) = bounds.get(j) {
                if p[j] + h > *hi {
                    h = -h;
                }
            }
            let mut shifted = p.clone();
            shifted[j] += h;
            let rs = residuals(&shifted);
            for i in 0..m {
                jacobian[(i, j)] = (rs[i] - r[i]) / h;
            }
        }

        let rv = DVector::from_column_slice(&r);
        let gradient = jacobian.tr_mul(&rv);
        if gradient.amax() <= options.tolerance * cost.max(f64::MIN_POSITIVE) {
            debug!("LM converged on gradient after {iteration} iterations");
            return Ok(p);
        }
        let normal = jacobian.tr_mul(&jacobian);

        let mut improved = false;
        while lambda < 1e16 {
            let mut damped = normal.clone();
            for j in 0..k {
                damped[(j, j)] += lambda * normal[(j, j)].max(1e-12);
            }
            let Some(chol) = damped.cholesky() else {
                lambda *= 10.0;
                continue;
            };
            let step = chol.solve(&(-&gradient));

            let mut trial: Vec<f64> = p.iter().zip(step.iter()).map(|(a, b)| a + b).collect();
            project(&mut trial, bounds);
            let trial_r = residuals(&trial);
            let trial_cost = sum_of_squares(&trial_r);

            if trial_cost.is_finite() && trial_cost < cost {
                let decrease = cost - trial_cost;
                p = trial;
                r = trial_r;
                cost = trial_cost;
                lambda = (lambda / 10.0).max(1e-12);
                improved = true;
                if decrease <= options.tolerance * cost.max(f64::MIN_POSITIVE) {
                    debug!("LM converged on cost after {iteration} iterations");
                    return Ok(p);
                }
                break;
            }
            lambda *= 10.0;
        }

        if !improved {
            debug!("LM stalled after {iteration} iterations (cost {cost:e})");
            return Ok(p);
        }
    }

    warn!(
        "LM reached {} iterations without converging (cost {cost:e})",
        options.max_iterations
    );
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn line_recovers_slope_and_intercept() {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 3.0).collect();
        let (m, b) = fit_line(&x, &y).unwrap();
        assert_relative_eq!(m, 2.0, epsilon = 1e-12);
        assert_relative_eq!(b, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn line_needs_two_distinct_x() {
        assert!(matches!(
            fit_line(&[1.0], &[1.0]),
            Err(FitError::InsufficientData { min: 2, .. })
        ));
        assert_eq!(fit_line(&[1.0, 1.0], &[1.0, 2.0]), Err(FitError::Singular("line")));
    }

    #[test]
    fn polynomial_degree_one_matches_line() {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 3.0).collect();
        let p = polyfit(&x, &y, 1).unwrap();
        let c = p.coefficients();
        assert_relative_eq!(c[0], 3.0, epsilon = 1e-9);
        assert_relative_eq!(c[1], 2.0, epsilon = 1e-9);
        for &xi in &x {
            assert_relative_eq!(p.evaluate(xi), 2.0 * xi + 3.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn cubic_is_reproduced() {
        let x: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 0.5 * v.powi(3) - v + 7.0).collect();
        let p = polyfit(&x, &y, 3).unwrap();
        assert_eq!(p.degree(), 3);
        assert_relative_eq!(p.evaluate(110.5), 0.5 * 110.5f64.powi(3) - 110.5 + 7.0, max_relative = 1e-9);
    }

    #[test]
    fn polynomial_needs_degree_plus_one_points() {
        let err = polyfit(&[0.0, 1.0], &[0.0, 1.0], 2).unwrap_err();
        assert_eq!(
            err,
            FitError::InsufficientData {
                kind: "polynomial",
                got: 2,
                min: 3
            }
        );
    }

    #[test]
    fn constant_x_is_singular() {
        assert_eq!(
            polyfit(&[2.0; 5], &[1.0, 2.0, 3.0, 4.0, 5.0], 2),
            Err(FitError::Singular("polynomial"))
        );
    }

    #[test]
    fn lm_fits_exponential_decay() {
        let x: Vec<f64> = (0..40).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 * (-1.5 * v).exp() + 0.2).collect();
        let p = levenberg_marquardt(
            |p| x.iter().zip(&y).map(|(xi, yi)| p[0] * (-p[1] * xi).exp() + p[2] - yi).collect(),
            &[1.0, 1.0, 0.0],
            &[None, None, None],
            LmOptions::default(),
        )
        .unwrap();
        assert_relative_eq!(p[0], 3.0, epsilon = 1e-6);
        assert_relative_eq!(p[1], 1.5, epsilon = 1e-6);
        assert_relative_eq!(p[2], 0.2, epsilon = 1e-6);
    }

    #[test]
    fn lm_respects_bounds() {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| 5.0 * v).collect();
        let p = levenberg_marquardt(
            |p| x.iter().zip(&y).map(|(xi, yi)| p[0] * xi - yi).collect(),
            &[1.0],
            &[Some((0.0, 2.0))],
            LmOptions::default(),
        )
        .unwrap();
        assert!(p[0] <= 2.0);
        assert_relative_eq!(p[0], 2.0, epsilon = 1e-9);
    }
}
