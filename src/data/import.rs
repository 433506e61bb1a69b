//! Flattening of hierarchical instrument recordings.
//!
//! Acquisition software typically nests traces as
//! Group → Series → Sweep → Trace. The engine only understands a flat list of
//! series, so an importer produces [`InstrumentGroup`]s and [`flatten`] turns
//! them into [`Series`] records:
//!
//! * every sweep becomes one episode (counted across the whole import)
//! * the trace position within its sweep becomes the group
//! * axis labels are derived from per-trace unit metadata

use super::model::{GroupId, Series};

#[derive(Debug, Clone, Default)]
pub struct InstrumentGroup {
    pub label: String,
    pub series: Vec<RecordingSeries>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingSeries {
    pub label: String,
    pub sweeps: Vec<Sweep>,
}

#[derive(Debug, Clone, Default)]
pub struct Sweep {
    pub traces: Vec<Trace>,
}

#[derive(Debug, Clone, Default)]
pub struct Trace {
    /// Channel label, e.g. `"Imon"`.
    pub label: String,
    /// Seconds (or `x_units`) between consecutive samples.
    pub sample_interval: f64,
    pub x_units: String,
    pub y_units: String,
    pub values: Vec<f64>,
}

/// Flatten the hierarchy into series, sweep by sweep.
pub fn flatten(groups: &[InstrumentGroup]) -> Vec<Series> {
    let mut out = Vec::new();
    let mut episode = 0i64;
    for group in groups {
        for recording in &group.series {
            for sweep in &recording.sweeps {
                for (position, trace) in sweep.traces.iter().enumerate() {
                    out.push(Series {
                        xlabel: Some(axis_label("Time", &trace.x_units)),
                        ylabel: Some(axis_label(&trace.label, &trace.y_units)),
                        ..Series::from_y(trace.values.clone())
                            .with_interval(trace.sample_interval)
                            .with_episode(episode)
                            .with_group(GroupId::Index(position as i64))
                    });
                }
                episode += 1;
            }
        }
    }
    log::debug!("flattened {} sweeps into {} series", episode, out.len());
    out
}

fn axis_label(label: &str, units: &str) -> String {
    match (label.is_empty(), units.is_empty()) {
        (_, true) => label.to_string(),
        (true, false) => format!("({units})"),
        (false, false) => format!("{label} ({units})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::XData;

    fn trace(label: &str, units: &str, values: Vec<f64>) -> Trace {
        Trace {
            label: label.into(),
            sample_interval: 1e-4,
            x_units: "s".into(),
            y_units: units.into(),
            values,
        }
    }

    #[test]
    fn sweeps_become_episodes_and_traces_become_groups() {
        let sweep = |a: f64| Sweep {
            traces: vec![
                trace("Imon", "pA", vec![a, a]),
                trace("Vmon", "mV", vec![-a, -a]),
            ],
        };
        let groups = vec![InstrumentGroup {
            label: "cell 1".into(),
            series: vec![
                RecordingSeries {
                    label: "IV".into(),
                    sweeps: vec![sweep(1.0), sweep(2.0)],
                },
                RecordingSeries {
                    label: "ramp".into(),
                    sweeps: vec![sweep(3.0)],
                },
            ],
        }];

        let flat = flatten(&groups);
        assert_eq!(flat.len(), 6);
        let episodes: Vec<_> = flat.iter().map(|s| s.episode.unwrap()).collect();
        assert_eq!(episodes, vec![0, 0, 1, 1, 2, 2]);
        assert_eq!(flat[1].group, Some(GroupId::Index(1)));
        assert_eq!(flat[0].ylabel.as_deref(), Some("Imon (pA)"));
        assert_eq!(flat[0].xlabel.as_deref(), Some("Time (s)"));
        assert_eq!(flat[0].x, Some(XData::Interval(1e-4)));
    }

    #[test]
    fn labels_without_units() {
        assert_eq!(axis_label("Imon", ""), "Imon");
        assert_eq!(axis_label("", "mV"), "(mV)");
    }
}
