//! Attribute resolution with per-attribute defaults.
//!
//! Stored series only carry what their source provided. Everything the
//! engine reads goes through these functions so that defaults are applied in
//! one place: missing `x` comes from the length of `y`, missing `episode`
//! from the series' position among its `(group, name)` cohort.

use std::collections::HashMap;

use super::model::{AttributeValue, GroupId, Series, Style, XData};

/// Resolved group, defaulting to `0`.
pub fn group(series: &Series) -> GroupId {
    series.group.clone().unwrap_or_default()
}

/// Resolved name, defaulting to `""`.
pub fn name(series: &Series) -> &str {
    series.name.as_deref().unwrap_or("")
}

pub fn xlabel(series: &Series) -> &str {
    series.xlabel.as_deref().unwrap_or("")
}

pub fn ylabel(series: &Series) -> &str {
    series.ylabel.as_deref().unwrap_or("")
}

pub fn style(series: &Series) -> Style {
    series.style.clone().unwrap_or_default()
}

/// Resolved x samples.
///
/// * explicit samples are returned unchanged
/// * a sample interval `dt` expands to `dt * [0, 1, .., len(y)-1]`
/// * no x at all gives `[0, 1, .., len(y)-1]`
///
/// Returns `None` when neither x samples nor y are available.
pub fn x_values(series: &Series) -> Option<Vec<f64>> {
    let n = series.y.as_ref().map(Vec::len);
    match (&series.x, n) {
        (Some(XData::Values(x)), _) => Some(x.clone()),
        (x, Some(n)) => {
            let dt = x.as_ref().and_then(XData::interval).unwrap_or(1.0);
            Some((0..n).map(|i| i as f64 * dt).collect())
        }
        (_, None) => None,
    }
}

/// Paired `(x, y)` for analysis, or `None` for an inert series. Lengths are
/// trimmed to the shorter of the two.
pub fn xy(series: &Series) -> Option<(Vec<f64>, Vec<f64>)> {
    let y = series.y.as_ref().filter(|y| !y.is_empty())?;
    let mut x = x_values(series)?;
    let n = x.len().min(y.len());
    x.truncate(n);
    Some((x, y[..n].to_vec()))
}

/// Resolved episode of `series_list[index]`: the stored value, or the index of
/// the series within its `(group, name)` cohort in collection order.
pub fn episode(series_list: &[Series], index: usize) -> i64 {
    let target = &series_list[index];
    if let Some(e) = target.episode {
        return e;
    }
    let g = group(target);
    let n = name(target);
    series_list[..index]
        .iter()
        .filter(|s| group(s) == g && name(s) == n)
        .count() as i64
}

/// Resolved episodes of the whole collection in one pass.
pub fn episodes(series_list: &[Series]) -> Vec<i64> {
    let mut cohort_sizes: HashMap<(GroupId, &str), i64> = HashMap::new();
    series_list
        .iter()
        .map(|s| {
            let position = cohort_sizes.entry((group(s), name(s))).or_insert(0);
            let resolved = s.episode.unwrap_or(*position);
            *position += 1;
            resolved
        })
        .collect()
}

/// Generic lookup by attribute name, for callers that address attributes by
/// string (tables, scripting). Unknown names read from `extra`.
pub fn resolve(series_list: &[Series], index: usize, attr: &str) -> AttributeValue {
    let series = &series_list[index];
    match attr {
        "x" => match (&series.x, x_values(series)) {
            // a bare interval with fewer than two samples stays a scalar
            (Some(XData::Interval(dt)), _) if series.y.as_ref().map_or(0, Vec::len) < 2 => {
                AttributeValue::Float(*dt)
            }
            (Some(XData::IntegerInterval(dt)), _) if series.y.as_ref().map_or(0, Vec::len) < 2 => {
                AttributeValue::Integer(*dt)
            }
            (_, Some(x)) => AttributeValue::Array(x),
            _ => AttributeValue::Null,
        },
        "y" => series
            .y
            .clone()
            .map_or(AttributeValue::Null, AttributeValue::Array),
        "episode" => AttributeValue::Integer(episode(series_list, index)),
        "group" => match group(series) {
            GroupId::Index(i) => AttributeValue::Integer(i),
            GroupId::Label(s) => AttributeValue::String(s),
        },
        "name" => AttributeValue::String(name(series).to_string()),
        "xlabel" => AttributeValue::String(xlabel(series).to_string()),
        "ylabel" => AttributeValue::String(ylabel(series).to_string()),
        "style" => AttributeValue::Map(style(series).to_map()),
        other => series.extra.get(other).cloned().unwrap_or(AttributeValue::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_x_is_sample_index() {
        let s = Series::from_y(vec![5.0, 6.0, 7.0, 8.0]);
        assert_eq!(x_values(&s), Some(vec![0.0, 1.0, 2.0, 3.0]));
    }

    #[test]
    fn interval_x_scales_sample_index() {
        let s = Series::from_y(vec![1.0, 1.0, 1.0]).with_interval(0.5);
        assert_eq!(x_values(&s), Some(vec![0.0, 0.5, 1.0]));

        let single = Series::from_y(vec![1.0]).with_interval(0.5);
        assert_eq!(resolve(&[single], 0, "x"), AttributeValue::Float(0.5));

        let stepped = Series {
            x: Some(XData::IntegerInterval(2)),
            ..Series::from_y(vec![1.0, 1.0, 1.0])
        };
        assert_eq!(x_values(&stepped), Some(vec![0.0, 2.0, 4.0]));
        let single = Series {
            x: Some(XData::IntegerInterval(2)),
            ..Series::from_y(vec![1.0])
        };
        assert_eq!(resolve(&[single], 0, "x"), AttributeValue::Integer(2));
    }

    #[test]
    fn no_x_and_no_y_resolves_to_nothing() {
        let s = Series::default();
        assert_eq!(x_values(&s), None);
        assert_eq!(resolve(&[s], 0, "x"), AttributeValue::Null);
    }

    #[test]
    fn explicit_x_is_returned_unchanged() {
        let s = Series::default().with_x(vec![3.0, 1.0]);
        assert_eq!(x_values(&s), Some(vec![3.0, 1.0]));
    }

    #[test]
    fn defaults_for_labels_group_and_name() {
        let list = vec![Series::from_y(vec![1.0])];
        assert_eq!(resolve(&list, 0, "group"), AttributeValue::Integer(0));
        assert_eq!(resolve(&list, 0, "name"), AttributeValue::String(String::new()));
        assert_eq!(resolve(&list, 0, "xlabel"), AttributeValue::String(String::new()));
        assert_eq!(resolve(&list, 0, "style"), AttributeValue::Map(Default::default()));
        assert_eq!(resolve(&list, 0, "labels"), AttributeValue::Null);
    }

    #[test]
    fn default_episodes_follow_cohort_order() {
        let list = vec![
            Series::from_y(vec![1.0]).with_group(0),
            Series::from_y(vec![1.0]).with_group(1),
            Series::from_y(vec![1.0]).with_group(0),
            Series::from_y(vec![1.0]).with_group(0).with_name("fit"),
            Series::from_y(vec![1.0]).with_group(0),
        ];
        assert_eq!(episodes(&list), vec![0, 0, 1, 0, 2]);
        for i in 0..list.len() {
            assert_eq!(episode(&list, i), episodes(&list)[i]);
        }
    }

    #[test]
    fn explicit_episode_still_occupies_a_cohort_slot() {
        let list = vec![
            Series::from_y(vec![1.0]).with_episode(7),
            Series::from_y(vec![1.0]),
        ];
        assert_eq!(episodes(&list), vec![7, 1]);
    }

    #[test]
    fn default_episodes_shift_after_removal() {
        let mut list = vec![
            Series::from_y(vec![1.0]),
            Series::from_y(vec![2.0]),
            Series::from_y(vec![3.0]),
        ];
        list.remove(0);
        assert_eq!(episodes(&list), vec![0, 1]);
    }
}
