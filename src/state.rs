use std::collections::BTreeSet;

use log::{debug, info};

use crate::analysis::fit::{FitKind, FitResult};
use crate::analysis::measure::{Measurement, MeasurementKind};
use crate::analysis::roi::RegionOfInterestSet;
use crate::analysis::{self, BatchReport};
use crate::config::AnalysisSettings;
use crate::data::filter::Selection;
use crate::data::model::{GroupId, Series};
use crate::data::range::{format_range_expression, parse_range_expression};
use crate::data::resolver;
use crate::data::store::{Collision, OverwriteDecision, SeriesStore};
use crate::error::{OverwriteAborted, ParseError};

// ---------------------------------------------------------------------------
// Analyzer state
// ---------------------------------------------------------------------------

/// Everything a front end needs between gestures, independent of rendering.
///
/// Visible series are resolved from the selection on every call and never
/// cached, so mutating the store through [`AnalyzerState::store_mut`] cannot
/// leave stale indexes behind.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerState {
    /// Loaded series.
    store: SeriesStore,

    /// Regions of interest drawn on the x axis.
    pub rois: RegionOfInterestSet,

    /// Fit and measurement defaults.
    pub settings: AnalysisSettings,

    /// Groups shown; `None` shows all.
    pub visible_groups: Option<BTreeSet<GroupId>>,

    /// Range expression over episodes; empty shows all.
    pub episode_text: String,

    /// Names shown; `None` shows all. Unnamed series are always shown.
    pub visible_names: Option<BTreeSet<String>>,

    /// Last error or notice for the user.
    pub status_message: Option<String>,
}

impl AnalyzerState {
    pub fn new(settings: AnalysisSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    /// Ingest a newly loaded store and reset the selection.
    pub fn set_store(&mut self, store: SeriesStore) {
        info!("Loaded {} series in {} groups", store.len(), store.groups().len());
        self.store = store;
        self.visible_groups = None;
        self.episode_text.clear();
        self.visible_names = None;
        self.status_message = None;
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SeriesStore {
        &mut self.store
    }

    // --- groups -----------------------------------------------------------

    pub fn groups(&self) -> Vec<GroupId> {
        self.store.groups()
    }

    pub fn group_names(&self) -> Vec<String> {
        self.store.group_names(&self.groups())
    }

    /// Visible groups in first-appearance order.
    pub fn visible_group_list(&self) -> Vec<GroupId> {
        let groups = self.groups();
        match &self.visible_groups {
            None => groups,
            Some(set) if set.is_empty() => groups,
            Some(set) => groups.into_iter().filter(|g| set.contains(g)).collect(),
        }
    }

    pub fn toggle_group(&mut self, group: &GroupId) {
        let all: BTreeSet<GroupId> = self.groups().into_iter().collect();
        let selected = self.visible_groups.get_or_insert(all);
        if !selected.remove(group) {
            selected.insert(group.clone());
        }
    }

    pub fn show_all_groups(&mut self) {
        self.visible_groups = None;
    }

    // --- names ------------------------------------------------------------

    pub fn set_visible_names<S: Into<String>>(&mut self, names: Option<impl IntoIterator<Item = S>>) {
        self.visible_names = names.map(|n| n.into_iter().map(Into::into).collect());
    }

    // --- episodes ---------------------------------------------------------

    /// One past the largest resolved episode among visible-group series.
    pub fn max_episode_count(&self) -> usize {
        let groups: BTreeSet<GroupId> = self.visible_group_list().into_iter().collect();
        let series = self.store.series();
        resolver::episodes(series)
            .into_iter()
            .zip(series)
            .filter(|(_, s)| groups.contains(&resolver::group(s)))
            .map(|(e, _)| e)
            .max()
            .map_or(0, |e| usize::try_from(e + 1).unwrap_or(0))
    }

    /// Episodes addressed by `episode_text`; all of them when it is empty.
    pub fn visible_episodes(&self) -> Result<Vec<usize>, ParseError> {
        let max = self.max_episode_count();
        if self.episode_text.trim().is_empty() {
            return Ok((0..max).collect());
        }
        parse_range_expression(&self.episode_text, max)
    }

    /// Replace the episode text. Invalid text is rejected and the previous
    /// text kept.
    pub fn set_episode_text(&mut self, text: &str) -> Result<(), ParseError> {
        parse_range_expression(text, self.max_episode_count())?;
        self.episode_text = text.trim().to_string();
        Ok(())
    }

    fn set_episodes(&mut self, episodes: &[usize]) {
        self.episode_text = format_range_expression(episodes);
    }

    pub fn next_episode(&mut self) {
        let max = self.max_episode_count();
        let next = match self.visible_episodes().ok().and_then(|e| e.last().copied()) {
            None => 0,
            Some(last) => (last + 1).min(max.saturating_sub(1)),
        };
        self.set_episodes(&[next]);
    }

    pub fn previous_episode(&mut self) {
        let max = self.max_episode_count();
        let previous = match self.visible_episodes().ok().and_then(|e| e.first().copied()) {
            None => max.saturating_sub(1),
            Some(first) => first.saturating_sub(1),
        };
        self.set_episodes(&[previous]);
    }

    // --- selection --------------------------------------------------------

    pub fn selection(&self) -> Result<Selection, ParseError> {
        let mut selection = Selection::all();
        if self.visible_groups.as_ref().is_some_and(|g| !g.is_empty()) {
            selection = selection.with_groups(self.visible_group_list());
        }
        if !self.episode_text.trim().is_empty() {
            selection = selection.with_episodes(self.visible_episodes()?.into_iter().map(|e| e as i64));
        }
        if let Some(names) = &self.visible_names {
            selection = selection.with_names(names.iter().cloned());
        }
        Ok(selection)
    }

    /// Indices of the series passing the current selection, resolved
    /// against the store as it is now.
    pub fn visible_indices(&self) -> Result<Vec<usize>, ParseError> {
        let indices = self.store.select(&self.selection()?);
        debug!("{} series visible", indices.len());
        Ok(indices)
    }

    // --- analysis ---------------------------------------------------------

    /// Fit every visible series against a snapshot of the current ROIs.
    pub fn fit_visible(&self, kind: &FitKind) -> Result<BatchReport<FitResult>, ParseError> {
        let indices = self.visible_indices()?;
        let rois = self.rois.clone();
        Ok(analysis::fit_batch(
            self.store.series(),
            &indices,
            kind,
            &rois,
            &self.settings.fit_options(),
        ))
    }

    pub fn measure_visible(
        &self,
        kind: MeasurementKind,
    ) -> Result<BatchReport<Measurement>, ParseError> {
        let indices = self.visible_indices()?;
        let rois = self.rois.clone();
        Ok(analysis::measure_batch(self.store.series(), &indices, kind, &rois))
    }

    /// Persist derived series under `name` and make that name visible.
    pub fn store_results<F>(
        &mut self,
        results: Vec<Series>,
        name: &str,
        decide: F,
    ) -> Result<Vec<usize>, OverwriteAborted>
    where
        F: FnOnce(&[Collision]) -> OverwriteDecision,
    {
        let placed = self.store.add_batch(results, name, decide).inspect_err(|e| {
            self.status_message = Some(e.to_string());
        })?;
        if let Some(names) = &mut self.visible_names {
            names.insert(name.to_string());
        }
        Ok(placed)
    }

    pub fn store_fits<F>(
        &mut self,
        report: &BatchReport<FitResult>,
        decide: F,
    ) -> Result<Vec<usize>, OverwriteAborted>
    where
        F: FnOnce(&[Collision]) -> OverwriteDecision,
    {
        let results = analysis::fit_series(self.store.series(), report);
        let name = self.settings.fit_name.clone();
        self.store_results(results, &name, decide)
    }

    pub fn store_measurements<F>(
        &mut self,
        report: &BatchReport<Measurement>,
        kind: MeasurementKind,
        decide: F,
    ) -> Result<Vec<usize>, OverwriteAborted>
    where
        F: FnOnce(&[Collision]) -> OverwriteDecision,
    {
        let results = analysis::measurement_series(self.store.series(), report);
        let name = self.settings.measurement_name(kind);
        self.store_results(results, &name, decide)
    }

    /// Delete the currently visible series.
    pub fn delete_visible(&mut self) -> Result<usize, ParseError> {
        let indices = self.visible_indices()?;
        let removed = self.store.delete_many(&indices);
        info!("Deleted {removed} series");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::roi::RegionOfInterest;

    fn two_group_state() -> AnalyzerState {
        let mut series = Vec::new();
        for e in 0..4 {
            series.push(Series::from_y(vec![e as f64; 3]).with_group(0));
        }
        for e in 0..2 {
            series.push(Series::from_y(vec![10.0 + e as f64; 3]).with_group("stim"));
        }
        let mut state = AnalyzerState::default();
        state.set_store(SeriesStore::from_series(series));
        state
    }

    #[test]
    fn max_episode_count_follows_visible_groups() {
        let mut state = two_group_state();
        assert_eq!(state.max_episode_count(), 4);
        state.toggle_group(&GroupId::Index(0));
        assert_eq!(state.visible_group_list(), vec![GroupId::from("stim")]);
        assert_eq!(state.max_episode_count(), 2);
        assert_eq!(state.visible_indices().unwrap(), vec![4, 5]);
        state.show_all_groups();
        assert_eq!(state.visible_indices().unwrap().len(), 6);
    }

    #[test]
    fn episode_text_filters_across_groups() {
        let mut state = two_group_state();
        state.set_episode_text("1, 3").unwrap();
        assert_eq!(state.visible_indices().unwrap(), vec![1, 3, 5]);
        assert!(state.set_episode_text("1-x").is_err());
        assert_eq!(state.episode_text, "1, 3");
    }

    #[test]
    fn episode_navigation_clamps() {
        let mut state = two_group_state();
        // all visible: next lands on the last episode
        state.next_episode();
        assert_eq!(state.episode_text, "3");
        state.next_episode();
        assert_eq!(state.episode_text, "3");

        state.set_episode_text("1 2").unwrap();
        state.previous_episode();
        assert_eq!(state.episode_text, "0");
        state.previous_episode();
        assert_eq!(state.episode_text, "0");

        state.set_episode_text("0:0").unwrap();
        state.next_episode();
        assert_eq!(state.episode_text, "0");
        state.set_episode_text("0:0").unwrap();
        state.previous_episode();
        assert_eq!(state.episode_text, "3");
    }

    #[test]
    fn group_names_use_labels_or_ylabel() {
        let mut state = two_group_state();
        let mut store = state.store().clone().into_series();
        store[0].ylabel = Some("Vm (mV)".into());
        state.set_store(SeriesStore::from_series(store));
        assert_eq!(state.group_names(), vec!["Vm (mV)".to_string(), "stim".to_string()]);
    }

    #[test]
    fn stored_fits_become_visible_and_collide_on_refit() {
        let mut state = two_group_state();
        state.set_visible_names(Some(["raw"]));
        state.toggle_group(&GroupId::from("stim"));
        assert_eq!(state.visible_indices().unwrap(), vec![0, 1, 2, 3]);

        let report = state.fit_visible(&FitKind::Mean).unwrap();
        let placed = state
            .store_fits(&report, |_| panic!("no collision expected"))
            .unwrap();
        assert_eq!(placed, vec![6, 7, 8, 9]);
        assert!(state.visible_names.as_ref().unwrap().contains("fit"));
        assert_eq!(state.visible_indices().unwrap().len(), 8);

        // fitting the raw data again collides with every stored fit
        state.set_visible_names(Some(["nothing"]));
        let report = state.fit_visible(&FitKind::Mean).unwrap();
        let err = state
            .store_fits(&report, |c| {
                assert_eq!(c.len(), 4);
                OverwriteDecision::Cancel
            })
            .unwrap_err();
        assert_eq!(err.collisions, 4);
        assert_eq!(state.store().len(), 10);
    }

    #[test]
    fn measurements_use_roi_snapshot() {
        let mut state = two_group_state();
        state.rois.push(RegionOfInterest::new(0.0, 1.0));
        state.rois.add(2.0, 2.0);
        state.rois.hide_all();
        state.rois.show_all();
        let report = state.measure_visible(MeasurementKind::Mean).unwrap();
        assert_eq!(report.results.len(), 6);
        assert!(report.results.iter().all(|(_, m)| m.len() == 2));

        let placed = state
            .store_measurements(&report, MeasurementKind::Mean, |_| OverwriteDecision::Append)
            .unwrap();
        assert_eq!(placed.len(), 6);
        assert_eq!(state.store().get(placed[0]).unwrap().name.as_deref(), Some("mean"));
    }

    #[test]
    fn delete_visible_removes_selection() {
        let mut state = two_group_state();
        state.set_episode_text("0").unwrap();
        assert_eq!(state.delete_visible().unwrap(), 2);
        assert_eq!(state.store().len(), 4);
    }

    #[test]
    fn delete_visible_follows_direct_store_edits() {
        let mut state = AnalyzerState::default();
        state.set_store(SeriesStore::from_series(vec![
            Series::from_y(vec![0.0]).with_group(0),
            Series::from_y(vec![1.0]).with_group(0),
            Series::from_y(vec![2.0]).with_group(0),
            Series::from_y(vec![9.0]).with_group(1),
        ]));
        state.toggle_group(&GroupId::Index(0));
        assert_eq!(state.visible_indices().unwrap(), vec![3]);

        state.store_mut().delete(0);
        assert_eq!(state.visible_indices().unwrap(), vec![2]);
        assert_eq!(state.delete_visible().unwrap(), 1);

        let ys: Vec<_> = state.store().series().iter().map(|s| s.y.clone()).collect();
        assert_eq!(ys, vec![Some(vec![1.0]), Some(vec![2.0])]);
    }
}
