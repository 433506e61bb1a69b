use std::collections::BTreeSet;

use super::model::{GroupId, Series};
use super::resolver;

// ---------------------------------------------------------------------------
// Selection predicate: which episodes / groups / names are requested
// ---------------------------------------------------------------------------

/// Optional per-key filter sets. `None` means "match all" for that key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub episodes: Option<BTreeSet<i64>>,
    pub groups: Option<BTreeSet<GroupId>>,
    pub names: Option<BTreeSet<String>>,
}

impl Selection {
    /// Select everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_episodes(mut self, episodes: impl IntoIterator<Item = i64>) -> Self {
        self.episodes = Some(episodes.into_iter().collect());
        self
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = GroupId>) -> Self {
        self.groups = Some(groups.into_iter().collect());
        self
    }

    pub fn with_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

/// Return indices of series that pass every provided predicate, in
/// collection order.
///
/// A series passes:
/// * the episode filter when its resolved episode is in the set
/// * the group filter when its resolved group is in the set
/// * the name filter when its resolved name is in the set, or when it has no
///   name at all (unnamed series are raw data and stay visible under any
///   name filter)
pub fn select(series_list: &[Series], selection: &Selection) -> Vec<usize> {
    // Only resolve episodes when they are actually filtered on.
    let episodes = selection
        .episodes
        .as_ref()
        .map(|_| resolver::episodes(series_list));

    series_list
        .iter()
        .enumerate()
        .filter(|(i, s)| {
            if let (Some(wanted), Some(resolved)) = (&selection.episodes, &episodes) {
                if !wanted.contains(&resolved[*i]) {
                    return false;
                }
            }
            if let Some(wanted) = &selection.groups {
                if !wanted.contains(&resolver::group(s)) {
                    return false;
                }
            }
            if let Some(wanted) = &selection.names {
                let name = resolver::name(s);
                if !name.is_empty() && !wanted.contains(name) {
                    return false;
                }
            }
            true
        })
        .map(|(i, _)| i)
        .collect()
}
