use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use series_analyzer::analysis::expr::Expression;
use series_analyzer::analysis::fit::{CustomFit, FitKind, FitParameter, SplineParams};
use series_analyzer::analysis::measure::MeasurementKind;
use series_analyzer::config::AnalysisSettings;
use series_analyzer::data::loader;
use series_analyzer::data::model::GroupId;
use series_analyzer::data::store::OverwriteDecision;
use series_analyzer::state::AnalyzerState;

#[derive(Parser)]
#[command(version, about = "Select, fit and measure episodic time series")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarise the groups, episodes and names in a collection
    Info(SelectionArgs),
    /// Fit a curve to every selected series
    Fit(FitArgs),
    /// Measure every selected series per region of interest
    Measure(MeasureArgs),
}

#[derive(Args)]
struct SelectionArgs {
    /// Series collection (.json, .csv, .parquet)
    input: PathBuf,
    /// Episode range expression, e.g. "0-3, 7, 10:20:2"
    #[arg(long, default_value = "")]
    episodes: String,
    /// Comma separated groups (integers or labels)
    #[arg(long, value_delimiter = ',')]
    groups: Vec<String>,
    /// Comma separated names; unnamed series always match
    #[arg(long, value_delimiter = ',')]
    names: Option<Vec<String>>,
}

#[derive(Args)]
struct StoreArgs {
    /// Region of interest "xmin,xmax"; may be repeated
    #[arg(long = "roi", value_parser = parse_roi)]
    rois: Vec<(f64, f64)>,
    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the collection with the results added
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Name for stored results
    #[arg(long)]
    name: Option<String>,
    /// Replace existing results with the same episode, group and name
    #[arg(long, conflicts_with = "append")]
    overwrite: bool,
    /// Keep existing results and append new ones alongside
    #[arg(long)]
    append: bool,
}

#[derive(Args)]
struct FitArgs {
    #[command(flatten)]
    selection: SelectionArgs,
    #[command(flatten)]
    store: StoreArgs,
    /// mean | line | polynomial | spline | custom
    #[arg(long, default_value = "mean")]
    kind: String,
    #[arg(long)]
    degree: Option<usize>,
    /// Spline smoothing factor (residual sum of squares target)
    #[arg(long, conflicts_with = "segments")]
    smoothing: Option<f64>,
    /// Use a fixed-knot spline with this many segments
    #[arg(long, num_args = 0..=1)]
    segments: Option<Option<usize>>,
    /// Custom model in x, e.g. "a * exp(-x / tau) + c"
    #[arg(long = "expr")]
    expression: Option<String>,
    /// Custom parameter "name=initial[:min:max]"; may be repeated
    #[arg(long = "param")]
    params: Vec<FitParameter>,
    /// Evaluate the fit only inside visible ROIs
    #[arg(long)]
    restrict_output: bool,
    /// Optimise over the whole series even when ROIs are given
    #[arg(long)]
    ignore_rois_for_optimization: bool,
    #[arg(long)]
    max_iterations: Option<usize>,
}

#[derive(Args)]
struct MeasureArgs {
    #[command(flatten)]
    selection: SelectionArgs,
    #[command(flatten)]
    store: StoreArgs,
    /// mean | median | min | max | absmax | var | std
    #[arg(long)]
    kind: MeasurementKind,
}

fn parse_roi(s: &str) -> Result<(f64, f64), String> {
    let (a, b) = s
        .split_once(',')
        .ok_or_else(|| format!("'{s}' is not xmin,xmax"))?;
    let a = a.trim().parse::<f64>().map_err(|e| e.to_string())?;
    let b = b.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Ok((a, b))
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn open(selection: &SelectionArgs, settings: AnalysisSettings) -> Result<AnalyzerState> {
    let store = loader::load_file(&selection.input)?;
    let mut state = AnalyzerState::new(settings);
    state.set_store(store);

    if !selection.groups.is_empty() {
        state.visible_groups = Some(selection.groups.iter().map(|g| GroupId::parse(g)).collect());
    }
    state.visible_names = selection
        .names
        .as_ref()
        .map(|names| names.iter().cloned().collect());
    state
        .set_episode_text(&selection.episodes)
        .with_context(|| format!("Invalid episode range '{}'", selection.episodes))?;
    Ok(state)
}

fn decision(store: &StoreArgs) -> OverwriteDecision {
    if store.overwrite {
        OverwriteDecision::Overwrite
    } else if store.append {
        OverwriteDecision::Append
    } else {
        OverwriteDecision::Cancel
    }
}

fn add_rois(state: &mut AnalyzerState, rois: &[(f64, f64)]) {
    for &(a, b) in rois {
        state.rois.add(a, b);
    }
}

fn fit_kind(args: &FitArgs, settings: &AnalysisSettings) -> Result<FitKind> {
    let kind = match args.kind.parse::<FitKind>()? {
        FitKind::Polynomial { .. } => FitKind::Polynomial {
            degree: args.degree.unwrap_or(settings.polynomial_degree),
        },
        FitKind::Spline(_) => match args.segments {
            Some(n) => FitKind::Spline(SplineParams::Segments(n.unwrap_or(settings.spline_segments))),
            None => FitKind::Spline(SplineParams::Smoothing(
                args.smoothing.or(settings.spline_smoothing),
            )),
        },
        FitKind::Custom(_) => {
            let expression = args
                .expression
                .clone()
                .ok_or_else(|| anyhow!("custom fits need --expr"))?;
            let mut parameters = args.params.clone();
            // undeclared identifiers start at 1
            for name in Expression::free_identifiers(&expression)? {
                if !parameters.iter().any(|p| p.name == name) {
                    parameters.push(FitParameter::new(&name, 1.0));
                }
            }
            FitKind::Custom(CustomFit {
                expression,
                parameters,
            })
        }
        other => other,
    };
    Ok(kind)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn info_command(args: SelectionArgs) -> Result<()> {
    let state = open(&args, AnalysisSettings::default())?;
    let groups = state.groups();
    println!("{} series", state.store().len());
    println!("{} episodes", state.max_episode_count());
    for (group, name) in groups.iter().zip(state.group_names()) {
        println!("group {group}: {name}");
    }
    let mut names: Vec<&str> = state
        .store()
        .series()
        .iter()
        .filter_map(|s| s.name.as_deref())
        .collect();
    names.sort_unstable();
    names.dedup();
    if !names.is_empty() {
        println!("names: {}", names.join(", "));
    }
    println!("{} series selected", state.visible_indices()?.len());
    Ok(())
}

fn fit_command(args: FitArgs) -> Result<()> {
    let mut settings = AnalysisSettings::load_or_default(args.store.config.as_deref())?;
    if args.restrict_output {
        settings.restrict_output_to_rois = true;
    }
    if args.ignore_rois_for_optimization {
        settings.restrict_optimization_to_rois = false;
    }
    if let Some(n) = args.max_iterations {
        settings.max_iterations = n;
    }
    if let Some(name) = &args.store.name {
        settings.fit_name = name.clone();
    }
    let kind = fit_kind(&args, &settings)?;

    let mut state = open(&args.selection, settings)?;
    add_rois(&mut state, &args.store.rois);

    let report = state.fit_visible(&kind)?;
    for (index, result) in &report.results {
        println!("series {index}: {:?}", result.model);
    }
    for (index, error) in &report.failures {
        println!("series {index}: failed: {error}");
    }

    if let Some(output) = &args.store.output {
        let placed = state.store_fits(&report, |_| decision(&args.store))?;
        loader::save_file(state.store(), output)?;
        info!("Stored {} fits in {}", placed.len(), output.display());
    }
    Ok(())
}

fn measure_command(args: MeasureArgs) -> Result<()> {
    let mut settings = AnalysisSettings::load_or_default(args.store.config.as_deref())?;
    if let Some(name) = &args.store.name {
        settings.measurement_name = Some(name.clone());
    }
    let mut state = open(&args.selection, settings)?;
    add_rois(&mut state, &args.store.rois);

    let report = state.measure_visible(args.kind)?;
    for (index, m) in &report.results {
        let pairs: Vec<String> = m
            .x
            .iter()
            .zip(&m.y)
            .map(|(x, y)| format!("({x}, {y})"))
            .collect();
        println!("series {index}: {}", pairs.join(" "));
    }

    if let Some(output) = &args.store.output {
        let placed = state.store_measurements(&report, args.kind, |_| decision(&args.store))?;
        loader::save_file(state.store(), output)?;
        info!("Stored {} measurements in {}", placed.len(), output.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Info(args) => info_command(args),
        Command::Fit(args) => fit_command(args),
        Command::Measure(args) => measure_command(args),
    }
}
