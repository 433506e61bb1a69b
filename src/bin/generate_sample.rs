use std::path::PathBuf;

use anyhow::Result;
use rand::prelude::*;
use rand_distr::Normal;

use series_analyzer::data::loader;
use series_analyzer::data::model::{AttributeValue, Series, Style};
use series_analyzer::data::store::SeriesStore;

const SAMPLE_INTERVAL: f64 = 1e-4;
const SAMPLES: usize = 2000;
const STEP_START: usize = 500;
const STEP_END: usize = 1500;

/// Membrane response to a current step: exponential charge and discharge
/// towards `rest + amplitude` with time constant `tau` (in samples).
fn step_response(
    rest: f64,
    amplitude: f64,
    tau: f64,
    noise: &Normal<f64>,
    rng: &mut StdRng,
) -> Vec<f64> {
    let mut v = rest;
    (0..SAMPLES)
        .map(|i| {
            let target = if (STEP_START..STEP_END).contains(&i) {
                rest + amplitude
            } else {
                rest
            };
            v += (target - v) / tau;
            v + noise.sample(rng)
        })
        .collect()
}

fn step_command(level: f64) -> Vec<f64> {
    (0..SAMPLES)
        .map(|i| if (STEP_START..STEP_END).contains(&i) { level } else { 0.0 })
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let output = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("sample_data.parquet"), PathBuf::from);

    let mut rng = StdRng::seed_from_u64(42);
    let noise = Normal::new(0.0, 0.3)?;
    let levels = [-40.0, -20.0, 0.0, 20.0, 40.0, 60.0, 80.0, 100.0];

    // One sweep per current level: a voltage trace (group 0) and the
    // command current (group "stim"). Episodes are implicit.
    let mut store = SeriesStore::new();
    for &level in &levels {
        let tau = rng.random_range(40.0..60.0);
        let mut vm = Series::from_y(step_response(-70.0, level * 0.25, tau, &noise, &mut rng))
            .with_interval(SAMPLE_INTERVAL)
            .with_group(0);
        vm.xlabel = Some("Time (s)".into());
        vm.ylabel = Some("Vm (mV)".into());
        store.add(vm);

        let mut stim = Series::from_y(step_command(level))
            .with_interval(SAMPLE_INTERVAL)
            .with_group("stim");
        stim.xlabel = Some("Time (s)".into());
        stim.ylabel = Some("I (pA)".into());
        let mut style = Style::new();
        style.set("c", AttributeValue::String("gray".into()));
        stim.style = Some(style);
        store.add(stim);
    }

    loader::save_file(&store, &output)?;
    println!(
        "Wrote {} episodes x 2 groups ({SAMPLES} samples each) to {}",
        levels.len(),
        output.display()
    );
    Ok(())
}
