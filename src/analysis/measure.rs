use std::fmt;
use std::str::FromStr;

use crate::analysis::roi::RegionOfInterestSet;
use crate::error::FitError;

/// Scalar reduction applied to each ROI of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementKind {
    Mean,
    Median,
    Min,
    Max,
    /// Largest magnitude, sign kept.
    AbsMax,
    Variance,
    StdDev,
}

impl MeasurementKind {
    pub const ALL: [MeasurementKind; 7] = [
        MeasurementKind::Mean,
        MeasurementKind::Median,
        MeasurementKind::Min,
        MeasurementKind::Max,
        MeasurementKind::AbsMax,
        MeasurementKind::Variance,
        MeasurementKind::StdDev,
    ];

    /// Short label, also the default name of stored measurement series.
    pub fn label(self) -> &'static str {
        match self {
            MeasurementKind::Mean => "mean",
            MeasurementKind::Median => "median",
            MeasurementKind::Min => "min",
            MeasurementKind::Max => "max",
            MeasurementKind::AbsMax => "absmax",
            MeasurementKind::Variance => "var",
            MeasurementKind::StdDev => "std",
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MeasurementKind {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        MeasurementKind::ALL
            .into_iter()
            .find(|k| k.label() == s)
            .ok_or(FitError::UnknownKind(s))
    }
}

/// One `(x, y)` pair per measured region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Measurement {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Reduce `(x, y)` inside each visible ROI, or over the whole series when no
/// ROI is visible. Regions without samples produce no output pair.
///
/// Statistics (mean, median, var, std) are reported at the centre of the
/// region: the ROI's own `(xmin + xmax) / 2`, or the centre of the sampled x
/// range when measuring the whole series.
pub fn measure(x: &[f64], y: &[f64], kind: MeasurementKind, rois: &RegionOfInterestSet) -> Measurement {
    let n = x.len().min(y.len());
    let (x, y) = (&x[..n], &y[..n]);

    let mut out = Measurement::default();
    let mut push = |pair: Option<(f64, f64)>| {
        if let Some((mx, my)) = pair {
            out.x.push(mx);
            out.y.push(my);
        }
    };

    let mut any_visible = false;
    for roi in rois.qualifying(true) {
        any_visible = true;
        let (xr, yr) = roi.restrict(x, y);
        push(reduce_about(&xr, &yr, kind, roi.midpoint()));
    }
    if !any_visible {
        push(reduce(x, y, kind));
    }
    out
}

/// Reduce a single region, centred on its sampled x range. `None` for an
/// empty region.
pub fn reduce(x: &[f64], y: &[f64], kind: MeasurementKind) -> Option<(f64, f64)> {
    let n = x.len().min(y.len());
    reduce_about(&x[..n], &y[..n], kind, midpoint(&x[..n]))
}

fn reduce_about(x: &[f64], y: &[f64], kind: MeasurementKind, centre: f64) -> Option<(f64, f64)> {
    let n = x.len().min(y.len());
    let (x, y) = (&x[..n], &y[..n]);
    if y.is_empty() {
        return None;
    }
    Some(match kind {
        MeasurementKind::Min => extremum(x, y, |v| -v),
        MeasurementKind::Max => extremum(x, y, |v| v),
        MeasurementKind::AbsMax => extremum(x, y, f64::abs),
        MeasurementKind::Mean => (centre, mean(y)),
        MeasurementKind::Median => (centre, median(y)),
        MeasurementKind::Variance => (centre, variance(y)),
        MeasurementKind::StdDev => (centre, variance(y).sqrt()),
    })
}

/// Centre of the sampled x range.
fn midpoint(x: &[f64]) -> f64 {
    let lo = x.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    0.5 * (lo + hi)
}

fn extremum(x: &[f64], y: &[f64], key: impl Fn(f64) -> f64) -> (f64, f64) {
    let index = argmax_by(y, key);
    (x[index], y[index])
}

/// First index maximising `key`; NaN never wins.
fn argmax_by(values: &[f64], key: impl Fn(f64) -> f64) -> usize {
    let mut best = 0;
    let mut best_key = f64::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        let k = key(v);
        if k > best_key {
            best = i;
            best_key = k;
        }
    }
    best
}

fn mean(y: &[f64]) -> f64 {
    y.iter().sum::<f64>() / y.len() as f64
}

fn median(y: &[f64]) -> f64 {
    let mut sorted = y.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

/// Population variance.
fn variance(y: &[f64]) -> f64 {
    let m = mean(y);
    y.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / y.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn max_over_whole_domain() {
        let x = vec![10.0, 20.0, 30.0];
        let y = vec![1.0, 5.0, 2.0];
        let m = measure(&x, &y, MeasurementKind::Max, &RegionOfInterestSet::new());
        assert_eq!(m, Measurement { x: vec![20.0], y: vec![5.0] });
    }

    #[test]
    fn one_pair_per_visible_roi_and_empty_rois_skipped() {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| v * 2.0).collect();
        let mut rois = RegionOfInterestSet::new();
        rois.add(0.0, 2.0);
        rois.add(20.0, 30.0);
        rois.add(5.0, 9.0);
        let hidden = rois.add(3.0, 4.0);
        rois.set_visible(hidden, false);

        let m = measure(&x, &y, MeasurementKind::Mean, &rois);
        assert_eq!(m.x, vec![1.0, 7.0]);
        assert_eq!(m.y, vec![2.0, 14.0]);
    }

    #[test]
    fn midpoint_is_by_x_range_not_sample_index() {
        let x = vec![0.0, 0.1, 0.2, 10.0];
        let y = vec![1.0, 1.0, 1.0, 1.0];
        let (mx, _) = reduce(&x, &y, MeasurementKind::Median).unwrap();
        assert_relative_eq!(mx, 5.0);
    }

    #[test]
    fn roi_statistics_sit_at_the_roi_centre() {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let y = vec![1.0; 10];
        let mut rois = RegionOfInterestSet::new();
        // bounds reach past the samples on both sides
        rois.add(-4.0, 2.0);
        rois.add(6.5, 20.0);

        let m = measure(&x, &y, MeasurementKind::Mean, &rois);
        assert_eq!(m.x, vec![-1.0, 13.25]);
        assert_eq!(m.y, vec![1.0, 1.0]);

        // extrema still report where they occur
        let m = measure(&x, &y, MeasurementKind::Max, &rois);
        assert_eq!(m.x, vec![0.0, 7.0]);
    }

    #[test]
    fn extrema_keep_sign_and_first_index() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![2.0, -7.0, 7.0, -1.0];
        assert_eq!(reduce(&x, &y, MeasurementKind::AbsMax), Some((1.0, -7.0)));
        assert_eq!(reduce(&x, &y, MeasurementKind::Min), Some((1.0, -7.0)));
        assert_eq!(reduce(&x, &y, MeasurementKind::Max), Some((2.0, 7.0)));
    }

    #[test]
    fn spread_statistics() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![1.0, 2.0, 3.0, 4.0];
        let (_, var) = reduce(&x, &y, MeasurementKind::Variance).unwrap();
        let (_, std) = reduce(&x, &y, MeasurementKind::StdDev).unwrap();
        let (_, med) = reduce(&x, &y, MeasurementKind::Median).unwrap();
        assert_relative_eq!(var, 1.25);
        assert_relative_eq!(std, 1.25f64.sqrt());
        assert_relative_eq!(med, 2.5);
        assert_eq!(reduce(&[], &[], MeasurementKind::Mean), None);
    }

    #[test]
    fn kinds_parse_from_labels() {
        for kind in MeasurementKind::ALL {
            assert_eq!(kind.label().parse::<MeasurementKind>(), Ok(kind));
        }
        assert!("mode".parse::<MeasurementKind>().is_err());
    }
}
