use std::collections::HashSet;

use log::{debug, info};

use super::filter::{self, Selection};
use super::model::{GroupId, Series};
use super::resolver;
use crate::error::OverwriteAborted;

// ---------------------------------------------------------------------------
// SeriesStore – the owned series collection
// ---------------------------------------------------------------------------

/// The mutable list of series. Indexes are positions in this list: appends
/// never move existing series, removals shift everything after the removed
/// one, so callers re-resolve indexes after any mutation.
#[derive(Debug, Clone, Default)]
pub struct SeriesStore {
    series: Vec<Series>,
}

/// An existing series that a batch result would replace.
#[derive(Debug, Clone, PartialEq)]
pub struct Collision {
    /// Position of the result within the batch.
    pub result: usize,
    /// Index of the last stored series with the same `(episode, group, name)`.
    pub existing: usize,
}

/// Caller's answer to a batch collision prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteDecision {
    /// Replace the last matching series of each colliding result.
    Overwrite,
    /// Append every result alongside the existing ones.
    Append,
    /// Write nothing.
    Cancel,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_series(series: Vec<Series>) -> Self {
        SeriesStore { series }
    }

    /// Number of series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Series> {
        self.series.get(index)
    }

    pub fn series(&self) -> &[Series] {
        &self.series
    }

    pub fn into_series(self) -> Vec<Series> {
        self.series
    }

    /// Append and return the new index.
    pub fn add(&mut self, series: Series) -> usize {
        self.series.push(series);
        self.series.len() - 1
    }

    /// Replace the series at `index`, returning the previous one.
    pub fn overwrite(&mut self, index: usize, series: Series) -> Option<Series> {
        self.series
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, series))
    }

    /// Remove the series at `index`; later indexes shift down by one.
    pub fn delete(&mut self, index: usize) -> Option<Series> {
        (index < self.series.len()).then(|| self.series.remove(index))
    }

    /// Remove several series at once. Out-of-range indexes are ignored.
    pub fn delete_many(&mut self, indexes: &[usize]) -> usize {
        let doomed: HashSet<usize> = indexes.iter().copied().collect();
        let before = self.series.len();
        let mut i = 0;
        self.series.retain(|_| {
            let keep = !doomed.contains(&i);
            i += 1;
            keep
        });
        before - self.series.len()
    }

    pub fn select(&self, selection: &Selection) -> Vec<usize> {
        filter::select(&self.series, selection)
    }

    pub fn episode(&self, index: usize) -> i64 {
        resolver::episode(&self.series, index)
    }

    pub fn episodes(&self) -> Vec<i64> {
        resolver::episodes(&self.series)
    }

    /// Unique groups in order of first appearance.
    pub fn groups(&self) -> Vec<GroupId> {
        let mut seen = HashSet::new();
        self.series
            .iter()
            .map(resolver::group)
            .filter(|g| seen.insert(g.clone()))
            .collect()
    }

    /// Display names for groups: label groups name themselves, numeric
    /// groups borrow the `ylabel` of their first series.
    pub fn group_names(&self, groups: &[GroupId]) -> Vec<String> {
        groups
            .iter()
            .map(|g| match g {
                GroupId::Label(s) => s.clone(),
                GroupId::Index(_) => self
                    .series
                    .iter()
                    .find(|s| resolver::group(s) == *g)
                    .map(|s| resolver::ylabel(s).to_string())
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Indexes of stored series with exactly this `(episode, group, name)`.
    pub fn find_matching(&self, episode: i64, group: &GroupId, name: &str) -> Vec<usize> {
        let episodes = self.episodes();
        self.series
            .iter()
            .enumerate()
            .filter(|(i, s)| {
                episodes[*i] == episode && resolver::group(s) == *group && resolver::name(s) == name
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Persist a batch of derived series under `name`.
    ///
    /// Every result is renamed first. If any result collides with a stored
    /// series, `decide` is asked once for the whole batch; `Cancel` leaves the
    /// store untouched. On `Overwrite` each stored series is replaced at most
    /// once: the first result targeting it wins and later ones are appended.
    /// Returns the index each result ended up at.
    pub fn add_batch<F>(
        &mut self,
        mut results: Vec<Series>,
        name: &str,
        decide: F,
    ) -> Result<Vec<usize>, OverwriteAborted>
    where
        F: FnOnce(&[Collision]) -> OverwriteDecision,
    {
        for r in &mut results {
            r.name = Some(name.to_string());
        }

        // Result episodes are resolved against the batch itself when unset,
        // mirroring where they would land once appended.
        let result_episodes = resolver::episodes(&results);
        let collisions: Vec<Collision> = results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| {
                let existing =
                    self.find_matching(result_episodes[i], &resolver::group(r), name);
                existing.last().map(|&existing| Collision { result: i, existing })
            })
            .collect();

        let decision = if collisions.is_empty() {
            OverwriteDecision::Append
        } else {
            decide(&collisions)
        };
        debug!(
            "batch '{name}': {} results, {} collisions, decision {decision:?}",
            results.len(),
            collisions.len()
        );

        match decision {
            OverwriteDecision::Cancel => Err(OverwriteAborted {
                name: name.to_string(),
                collisions: collisions.len(),
            }),
            OverwriteDecision::Append => {
                let start = self.series.len();
                self.series.extend(results);
                info!("appended {} series named '{name}'", self.series.len() - start);
                Ok((start..self.series.len()).collect())
            }
            OverwriteDecision::Overwrite => {
                let mut placed = Vec::with_capacity(results.len());
                let mut replaced = 0;
                let mut targets = vec![None; results.len()];
                let mut claimed = HashSet::new();
                for c in &collisions {
                    if claimed.insert(c.existing) {
                        targets[c.result] = Some(c.existing);
                    } else {
                        debug!("result {} also matches {}, appending it", c.result, c.existing);
                    }
                }
                for (result, target) in results.into_iter().zip(targets) {
                    match target {
                        Some(index) => {
                            self.series[index] = result;
                            placed.push(index);
                            replaced += 1;
                        }
                        None => {
                            self.series.push(result);
                            placed.push(self.series.len() - 1);
                        }
                    }
                }
                info!(
                    "stored {} series named '{name}' ({replaced} overwritten)",
                    placed.len()
                );
                Ok(placed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SeriesStore {
        SeriesStore::from_series(vec![
            Series::from_y(vec![1.0, 2.0, 3.0]).with_episode(0).with_group(0),
            Series::from_y(vec![4.0, 5.0, 6.0]).with_episode(1).with_group(0),
        ])
    }

    fn fit_of(episode: i64) -> Series {
        Series::from_y(vec![0.0]).with_episode(episode).with_group(0)
    }

    #[test]
    fn add_appends_without_reindexing() {
        let mut s = store();
        let idx = s.add(Series::from_y(vec![9.0]));
        assert_eq!(idx, 2);
        assert_eq!(s.get(0).unwrap().y, Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn delete_shifts_later_indexes() {
        let mut s = store();
        let removed = s.delete(0).unwrap();
        assert_eq!(removed.episode, Some(0));
        assert_eq!(s.get(0).unwrap().episode, Some(1));
        assert!(s.delete(5).is_none());
    }

    #[test]
    fn delete_many_ignores_out_of_range() {
        let mut s = store();
        s.add(Series::from_y(vec![7.0]));
        assert_eq!(s.delete_many(&[0, 2, 9]), 2);
        assert_eq!(s.len(), 1);
        assert_eq!(s.get(0).unwrap().episode, Some(1));
    }

    #[test]
    fn groups_in_first_appearance_order() {
        let s = SeriesStore::from_series(vec![
            Series::from_y(vec![1.0]).with_group(2),
            Series::from_y(vec![1.0]),
            Series::from_y(vec![1.0]).with_group(2),
            Series::from_y(vec![1.0]).with_group("Vm"),
        ]);
        assert_eq!(
            s.groups(),
            vec![GroupId::Index(2), GroupId::Index(0), GroupId::Label("Vm".into())]
        );
    }

    #[test]
    fn group_names_use_first_ylabel() {
        let mut first = Series::from_y(vec![1.0]).with_group(1);
        first.ylabel = Some("Current (pA)".into());
        let s = SeriesStore::from_series(vec![
            first,
            Series::from_y(vec![1.0]).with_group("stim"),
        ]);
        assert_eq!(
            s.group_names(&s.groups()),
            vec!["Current (pA)".to_string(), "stim".to_string()]
        );
    }

    #[test]
    fn batch_without_collisions_appends_and_never_asks() {
        let mut s = store();
        let placed = s
            .add_batch(vec![fit_of(0), fit_of(1)], "fit", |_| {
                panic!("no collision expected")
            })
            .unwrap();
        assert_eq!(placed, vec![2, 3]);
        assert_eq!(s.get(3).unwrap().name.as_deref(), Some("fit"));
    }

    #[test]
    fn cancel_leaves_store_untouched() {
        let mut s = store();
        s.add_batch(vec![fit_of(0)], "fit", |_| OverwriteDecision::Append)
            .unwrap();
        let before = s.len();

        let err = s
            .add_batch(vec![fit_of(0), fit_of(1)], "fit", |c| {
                assert_eq!(c.len(), 1);
                OverwriteDecision::Cancel
            })
            .unwrap_err();
        assert_eq!(err.collisions, 1);
        assert_eq!(s.len(), before);
    }

    #[test]
    fn overwrite_replaces_last_match_and_appends_the_rest() {
        let mut s = store();
        s.add_batch(vec![fit_of(0)], "fit", |_| OverwriteDecision::Append)
            .unwrap();
        s.add_batch(vec![fit_of(0)], "fit", |_| OverwriteDecision::Append)
            .unwrap();
        assert_eq!(s.len(), 4);

        let mut replacement = fit_of(0);
        replacement.y = Some(vec![42.0]);
        let placed = s
            .add_batch(vec![replacement, fit_of(1)], "fit", |_| {
                OverwriteDecision::Overwrite
            })
            .unwrap();
        assert_eq!(placed, vec![3, 4]);
        assert_eq!(s.get(3).unwrap().y, Some(vec![42.0]));
        assert_eq!(s.get(2).unwrap().y, Some(vec![0.0]));
    }

    #[test]
    fn overwrite_never_replaces_one_series_twice() {
        let mut s = store();
        s.add_batch(vec![fit_of(1)], "fit", |_| OverwriteDecision::Append)
            .unwrap();
        assert_eq!(s.len(), 3);

        // two results from different sources pinned to the same episode
        let mut first = fit_of(1);
        first.y = Some(vec![10.0]);
        let mut second = fit_of(1);
        second.y = Some(vec![20.0]);
        let placed = s
            .add_batch(vec![first, second], "fit", |c| {
                assert_eq!(c.len(), 2);
                assert!(c.iter().all(|c| c.existing == 2));
                OverwriteDecision::Overwrite
            })
            .unwrap();
        assert_eq!(placed, vec![2, 3]);
        assert_eq!(s.get(2).unwrap().y, Some(vec![10.0]));
        assert_eq!(s.get(3).unwrap().y, Some(vec![20.0]));
    }
}
