use approx::assert_relative_eq;

use series_analyzer::analysis::fit::{self, FitKind, FitModel, FitOptions, SplineParams};
use series_analyzer::analysis::measure::{self, MeasurementKind};
use series_analyzer::analysis::roi::RegionOfInterestSet;
use series_analyzer::data::filter::Selection;
use series_analyzer::data::import::{self, InstrumentGroup, RecordingSeries, Sweep, Trace};
use series_analyzer::data::loader;
use series_analyzer::data::model::{GroupId, Series};
use series_analyzer::data::range::parse_range_expression;
use series_analyzer::data::resolver;
use series_analyzer::data::store::{OverwriteDecision, SeriesStore};
use series_analyzer::state::AnalyzerState;

fn two_episode_store() -> SeriesStore {
    SeriesStore::from_series(vec![
        Series::from_y(vec![1.0, 2.0, 3.0])
            .with_episode(0)
            .with_group(0)
            .with_name(""),
        Series::from_y(vec![4.0, 5.0, 6.0])
            .with_episode(1)
            .with_group(0)
            .with_name(""),
    ])
}

#[test]
fn select_group_then_fit_mean() {
    let store = two_episode_store();
    let selected = store.select(&Selection::all().with_groups([GroupId::Index(0)]));
    assert_eq!(selected, vec![0, 1]);
    // selection is stable across calls
    assert_eq!(store.select(&Selection::all().with_groups([GroupId::Index(0)])), selected);

    let (x, y) = resolver::xy(&store.series()[0]).unwrap();
    let result = fit::fit(&x, &y, &FitKind::Mean, &RegionOfInterestSet::new(), &FitOptions::default())
        .unwrap();
    assert_eq!(result.y, vec![2.0, 2.0, 2.0]);
}

#[test]
fn range_expression_example() {
    assert_eq!(parse_range_expression("1,3-5,7:9", 10).unwrap(), vec![1, 3, 4, 5, 7, 8]);
}

#[test]
fn roi_restricted_fit_and_measurement() {
    // a line on [0, 5] then garbage after
    let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
    let y: Vec<f64> = x
        .iter()
        .map(|&v| if v <= 5.0 { 2.0 * v + 3.0 } else { 100.0 - v * v })
        .collect();
    let mut rois = RegionOfInterestSet::new();
    rois.add(0.0, 5.0);

    let result = fit::fit(&x, &y, &FitKind::Line, &rois, &FitOptions::default()).unwrap();
    let FitModel::Line { slope, intercept } = result.model else {
        panic!("expected a line");
    };
    assert_relative_eq!(slope, 2.0, epsilon = 1e-10);
    assert_relative_eq!(intercept, 3.0, epsilon = 1e-10);
    // evaluated over the full x by default
    assert_eq!(result.x.len(), x.len());
    assert_relative_eq!(result.y[19], 2.0 * 9.5 + 3.0, epsilon = 1e-9);

    let m = measure::measure(&x, &y, MeasurementKind::Max, &rois);
    assert_eq!(m.x, vec![5.0]);
    assert_eq!(m.y, vec![13.0]);
}

#[test]
fn smoothing_spline_through_state() {
    let x: Vec<f64> = (0..40).map(|i| i as f64 * 0.25).collect();
    let y: Vec<f64> = x.iter().map(|v| v.sin()).collect();
    let mut state = AnalyzerState::default();
    state.set_store(SeriesStore::from_series(vec![Series::from_y(y.clone()).with_x(x.clone())]));

    let report = state
        .fit_visible(&FitKind::Spline(SplineParams::Smoothing(Some(0.0))))
        .unwrap();
    assert!(report.is_complete());
    let (_, result) = &report.results[0];
    for (fitted, actual) in result.y.iter().zip(&y) {
        assert_relative_eq!(*fitted, *actual, epsilon = 1e-9);
    }
}

#[test]
fn fits_persist_and_overwrite_on_refit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fits.json");

    let mut state = AnalyzerState::default();
    state.set_store(two_episode_store());
    let report = state.fit_visible(&FitKind::Mean).unwrap();
    state.store_fits(&report, |_| OverwriteDecision::Cancel).unwrap();
    loader::save_file(state.store(), &path).unwrap();

    let mut reloaded = AnalyzerState::default();
    reloaded.set_store(loader::load_file(&path).unwrap());
    assert_eq!(reloaded.store().len(), 4);
    assert_eq!(reloaded.store().find_matching(1, &GroupId::Index(0), "fit"), vec![3]);

    // refit only the unnamed raw series of episode 1 and overwrite
    reloaded.set_visible_names(Some(["raw"]));
    reloaded.set_episode_text("1").unwrap();
    assert_eq!(reloaded.visible_indices().unwrap(), vec![1]);
    let report = reloaded.fit_visible(&FitKind::Line).unwrap();
    let placed = reloaded
        .store_fits(&report, |collisions| {
            assert_eq!(collisions.len(), 1);
            assert_eq!(collisions[0].existing, 3);
            OverwriteDecision::Overwrite
        })
        .unwrap();
    assert_eq!(placed, vec![3]);
    assert_eq!(reloaded.store().len(), 4);
    assert_eq!(reloaded.store().series()[3].y, Some(vec![4.0, 5.0, 6.0]));
}

#[test]
fn csv_persistence_keeps_unnamed_raw_series_unnamed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fits.csv");

    let mut state = AnalyzerState::default();
    state.set_store(two_episode_store());
    let report = state.fit_visible(&FitKind::Mean).unwrap();
    state.store_fits(&report, |_| OverwriteDecision::Cancel).unwrap();
    loader::save_file(state.store(), &path).unwrap();

    let reloaded = loader::load_file(&path).unwrap();
    assert_eq!(reloaded.series()[0].name.as_deref(), Some(""));
    assert_eq!(reloaded.find_matching(1, &GroupId::Index(0), "fit"), vec![3]);
}

#[test]
fn imported_sweeps_are_addressable() {
    let trace = |label: &str, values: Vec<f64>| Trace {
        label: label.to_string(),
        sample_interval: 0.5,
        x_units: "s".to_string(),
        y_units: "mV".to_string(),
        values,
    };
    let groups = vec![InstrumentGroup {
        label: "cell".into(),
        series: vec![RecordingSeries {
            label: "iv".into(),
            sweeps: vec![
                Sweep { traces: vec![trace("Vm", vec![1.0, 2.0]), trace("Im", vec![0.0, 0.0])] },
                Sweep { traces: vec![trace("Vm", vec![3.0, 4.0]), trace("Im", vec![1.0, 1.0])] },
            ],
        }],
    }];
    let store = SeriesStore::from_series(import::flatten(&groups));
    let second_vm = store.select(&Selection::all().with_episodes([1]).with_groups([GroupId::Index(0)]));
    assert_eq!(second_vm.len(), 1);
    let (x, y) = resolver::xy(&store.series()[second_vm[0]]).unwrap();
    assert_eq!(x, vec![0.0, 0.5]);
    assert_eq!(y, vec![3.0, 4.0]);
}
