/// Analysis layer: regions of interest, curve fitting and measurements.
///
/// Architecture:
/// ```text
///   Series (x, y)          RegionOfInterestSet (snapshot)
///        │                        │
///        ▼                        ▼
///   ┌──────────────────────────────────┐
///   │  fit      mean / line / polynomial │ ← lsq, spline, expr
///   │           spline / custom          │
///   │  measure  mean / median / extrema  │
///   │           var / std                │
///   └──────────────────────────────────┘
///        │
///        ▼
///   BatchReport { results, failures }  →  derived Series  →  SeriesStore::add_batch
/// ```
pub mod expr;
pub mod fit;
pub mod lsq;
pub mod measure;
pub mod roi;
pub mod spline;

use log::{debug, info, warn};

use crate::data::model::{Series, XData};
use crate::data::resolver;
use crate::error::FitError;
use fit::{FitKind, FitOptions, FitResult};
use measure::{Measurement, MeasurementKind};
use roi::RegionOfInterestSet;

// ---------------------------------------------------------------------------
// Batch processing
// ---------------------------------------------------------------------------

/// Outcome of running an engine over several series. Indices refer to the
/// series list the batch was run on.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport<T> {
    pub results: Vec<(usize, T)>,
    pub failures: Vec<(usize, FitError)>,
    /// Series without `y`, which nothing can be computed from.
    pub skipped: Vec<usize>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        BatchReport {
            results: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fit every series in `indices`. A failing series is recorded and the rest
/// carry on.
pub fn fit_batch(
    series_list: &[Series],
    indices: &[usize],
    kind: &FitKind,
    rois: &RegionOfInterestSet,
    options: &FitOptions,
) -> BatchReport<FitResult> {
    let mut report = BatchReport::default();
    for &index in indices {
        let Some((x, y)) = series_list.get(index).and_then(resolver::xy) else {
            debug!("series {index} has no y, skipping {kind} fit");
            report.skipped.push(index);
            continue;
        };
        match fit::fit(&x, &y, kind, rois, options) {
            Ok(result) => report.results.push((index, result)),
            Err(e) => {
                warn!("{kind} fit failed for series {index}: {e}");
                report.failures.push((index, e));
            }
        }
    }
    info!(
        "{kind} fit: {} ok, {} failed, {} skipped",
        report.results.len(),
        report.failures.len(),
        report.skipped.len()
    );
    report
}

/// Measure every series in `indices`.
pub fn measure_batch(
    series_list: &[Series],
    indices: &[usize],
    kind: MeasurementKind,
    rois: &RegionOfInterestSet,
) -> BatchReport<Measurement> {
    let mut report = BatchReport::default();
    for &index in indices {
        let Some((x, y)) = series_list.get(index).and_then(resolver::xy) else {
            debug!("series {index} has no y, skipping {kind} measurement");
            report.skipped.push(index);
            continue;
        };
        report
            .results
            .push((index, measure::measure(&x, &y, kind, rois)));
    }
    info!(
        "{kind} measurement over {} series ({} skipped)",
        report.results.len(),
        report.skipped.len()
    );
    report
}

/// A new series holding `(x, y)` computed from `series_list[index]`. It keeps
/// the source's labels and group, and pins the source's resolved episode so
/// the result stays aligned with its source whatever else is in the store.
pub fn derived_series(series_list: &[Series], index: usize, x: Vec<f64>, y: Vec<f64>) -> Series {
    let source = &series_list[index];
    Series {
        x: Some(XData::Values(x)),
        y: Some(y),
        xlabel: source.xlabel.clone(),
        ylabel: source.ylabel.clone(),
        episode: Some(resolver::episode(series_list, index)),
        group: Some(resolver::group(source)),
        ..Series::default()
    }
}

/// Turn a fit report into storable series, one per successful fit.
pub fn fit_series(series_list: &[Series], report: &BatchReport<FitResult>) -> Vec<Series> {
    report
        .results
        .iter()
        .map(|(i, r)| derived_series(series_list, *i, r.x.clone(), r.y.clone()))
        .collect()
}

/// Turn a measurement report into storable series. Empty measurements (every
/// ROI missed the data) produce nothing.
pub fn measurement_series(series_list: &[Series], report: &BatchReport<Measurement>) -> Vec<Series> {
    report
        .results
        .iter()
        .filter(|(_, m)| !m.is_empty())
        .map(|(i, m)| derived_series(series_list, *i, m.x.clone(), m.y.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::GroupId;

    fn list() -> Vec<Series> {
        vec![
            Series::from_y(vec![1.0, 2.0, 3.0]).with_group(0),
            Series::from_y(vec![4.0, 5.0, 6.0]).with_group(0),
            Series::default().with_group(1),
            Series::from_y(vec![7.0]).with_group(1),
        ]
    }

    #[test]
    fn failures_do_not_abort_the_batch() {
        let series = list();
        let report = fit_batch(
            &series,
            &[0, 1, 2, 3],
            &FitKind::Line,
            &RegionOfInterestSet::new(),
            &FitOptions::default(),
        );
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.skipped, vec![2]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, 3);
        assert!(!report.is_complete());
    }

    #[test]
    fn derived_series_pin_resolved_episode_and_group() {
        let series = list();
        let report = fit_batch(
            &series,
            &[0, 1],
            &FitKind::Mean,
            &RegionOfInterestSet::new(),
            &FitOptions::default(),
        );
        let derived = fit_series(&series, &report);
        assert_eq!(derived.len(), 2);
        assert_eq!(derived[1].episode, Some(1));
        assert_eq!(derived[1].group, Some(GroupId::Index(0)));
        assert_eq!(derived[1].y, Some(vec![5.0, 5.0, 5.0]));
        assert_eq!(derived[1].x, Some(XData::Values(vec![0.0, 1.0, 2.0])));
    }

    #[test]
    fn empty_measurements_are_not_stored() {
        let series = list();
        let mut rois = RegionOfInterestSet::new();
        rois.add(10.0, 20.0);
        let report = measure_batch(&series, &[0, 1, 2], MeasurementKind::Max, &rois);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.skipped, vec![2]);
        assert!(measurement_series(&series, &report).is_empty());
    }
}
