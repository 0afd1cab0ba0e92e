use std::io;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use bg_tir::{
    Alignment, Band, DuplicatePolicy, Series, WindowRatio, WindowedAggregator, SECONDS_PER_WEEK,
};
use chrono::{Local, Weekday};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use rayon::prelude::*;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod libreview;
mod notes;
mod plot;
mod report;
mod wallclock;

use notes::Note;
use plot::ChartKind;
use report::{Goals, ReportConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Blood glucose time-in-range reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate charts, CSVs and an index page for LibreView exports
    Report(ReportArgs),
    /// Print time in range for a period and write per-window CSV rows
    Summary(SummaryArgs),
}

#[derive(Args, Debug)]
struct BandArgs {
    /// Lower bound of the target zone (mg/dL)
    #[arg(long, default_value_t = 70.0)]
    target_min: f64,

    /// Upper bound of the target zone (mg/dL)
    #[arg(long, default_value_t = 180.0)]
    target_max: f64,
}

impl BandArgs {
    fn band(&self) -> Result<Band> {
        Ok(Band::new(self.target_min, self.target_max)?)
    }
}

#[derive(Parser, Debug)]
struct ReportArgs {
    /// LibreView CSV exports; later files win on duplicate timestamps
    #[arg(long, required = true, num_args = 1.., value_hint = ValueHint::FilePath)]
    cgm_data: Vec<PathBuf>,

    /// JSON note files annotating the charts
    #[arg(long, num_args = 1.., value_hint = ValueHint::FilePath)]
    notes_data: Vec<PathBuf>,

    #[command(flatten)]
    band: BandArgs,

    /// Goal for the percentage of time in range
    #[arg(long, default_value_t = 80.0)]
    time_in_tz_min: f64,

    /// Upper edge of the goal band on ratio charts
    #[arg(long, default_value_t = 100.0)]
    time_in_tz_max: f64,

    /// Second-best percentage of time in range
    #[arg(long, default_value_t = 70.0)]
    time_in_tz_warn: f64,

    /// First day of weekly charts (name or 0=monday..6=sunday)
    #[arg(long, default_value = "sun", value_parser = parse_weekday)]
    weeks_start_on: Weekday,

    /// Directory receiving one timestamped report directory per run
    #[arg(long, default_value = "reports", value_hint = ValueHint::DirPath)]
    reports_dir: PathBuf,

    /// Chart image format
    #[arg(long, value_enum, default_value_t = ChartKind::Png)]
    format: ChartKind,

    /// Skip chart rendering (CSVs and index only)
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct SummaryArgs {
    /// LibreView CSV exports; later files win on duplicate timestamps
    #[arg(long, required = true, num_args = 1.., value_hint = ValueHint::FilePath)]
    cgm_data: Vec<PathBuf>,

    #[command(flatten)]
    band: BandArgs,

    /// Period start (`YYYY-MM-DD` or `YYYY-MM-DD HH:MM`), defaults to the first reading
    #[arg(long)]
    start: Option<String>,

    /// Period end, defaults to the last reading
    #[arg(long)]
    end: Option<String>,

    /// Per-window breakdown written to the CSV
    #[arg(long, value_enum, default_value_t = IntervalOpt::Day)]
    interval: IntervalOpt,

    /// First day of weekly windows (name or 0=monday..6=sunday)
    #[arg(long, default_value = "sun", value_parser = parse_weekday)]
    weeks_start_on: Weekday,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum IntervalOpt {
    Day,
    Week,
    /// A single row for the whole period
    #[value(name = "none")]
    Whole,
}

fn parse_weekday(input: &str) -> Result<Weekday, String> {
    if let Ok(index) = input.parse::<u8>() {
        return Weekday::try_from(index)
            .map_err(|_| format!("weekday index must be 0 (monday) to 6 (sunday), got {index}"));
    }
    input
        .parse::<Weekday>()
        .map_err(|_| format!("unknown weekday '{input}'"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Report(args) => args.verbose,
        Command::Summary(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Report(args) => handle_report(args),
        Command::Summary(args) => handle_summary(args),
    }
}

fn handle_report(args: ReportArgs) -> Result<()> {
    let config = ReportConfig {
        band: args.band.band()?,
        goals: Goals {
            min_pct: args.time_in_tz_min,
            max_pct: args.time_in_tz_max,
            warn_pct: args.time_in_tz_warn,
        },
        week_start: args.weeks_start_on,
        chart_kind: args.format,
        plots: !args.no_plot,
    };
    config.goals.validate()?;

    let (series, mut notes) = load_cgm(&args.cgm_data)?;
    for path in &args.notes_data {
        notes.extend(notes::load_notes(path)?);
    }
    notes.sort_by(|a, b| a.at.total_cmp(&b.at));

    let out_dir = args
        .reports_dir
        .join(wallclock::stamp(Local::now().naive_local()));
    let t_report = Instant::now();
    let summary = report::generate(&series, &notes, &config, &out_dir)?;
    if args.verbose {
        info!(
            "Report stage: {:.1} ms ({} charts)",
            t_report.elapsed().as_secs_f64() * 1000.0,
            summary.charts.len()
        );
    }
    info!("Report written: {}", summary.index.display());
    Ok(())
}

fn handle_summary(args: SummaryArgs) -> Result<()> {
    let band = args.band.band()?;
    let start = args.start.as_deref().map(parse_bound).transpose()?;
    let end = args.end.as_deref().map(parse_bound).transpose()?;

    let (series, _) = load_cgm(&args.cgm_data)?;
    let occupancy = series
        .occupancy(&band, start, end)
        .context("failed to compute time in range")?;
    let ratio = occupancy.ratio();
    match occupancy.window {
        Some(window) => info!(
            "Time in range {:.1}% ({:.1} of {:.1} hours, {} to {})",
            ratio * 100.0,
            occupancy.in_band_seconds() / 3600.0,
            window.span() / 3600.0,
            wallclock::format(window.start, "%Y-%m-%d %H:%M"),
            wallclock::format(window.end, "%Y-%m-%d %H:%M")
        ),
        None => info!("No readings inside the requested period"),
    }

    let rows: Vec<WindowRatio> = match args.interval {
        IntervalOpt::Whole => occupancy
            .window
            .map(|window| WindowRatio {
                start: window.start,
                end: window.end,
                ratio,
            })
            .into_iter()
            .collect(),
        IntervalOpt::Day => {
            window_rows(WindowedAggregator::daily(&series, band)?, start, end)?
        }
        IntervalOpt::Week => window_rows(
            WindowedAggregator::new(&series, band, SECONDS_PER_WEEK)?
                .with_alignment(Alignment::Week(args.weeks_start_on)),
            start,
            end,
        )?,
    };

    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut writer = csv::Writer::from_writer(stdout.lock());
        report::write_ratio_rows(&rows, &mut writer)
    } else {
        report::write_ratio_csv(&rows, &args.output)?;
        info!("Wrote {} rows: {}", rows.len(), args.output.display());
        Ok(())
    }
}

/// Windows overlapping `[start, end]`.
fn window_rows(
    aggregator: WindowedAggregator<'_>,
    start: Option<f64>,
    end: Option<f64>,
) -> Result<Vec<WindowRatio>> {
    let lo = start.unwrap_or(f64::NEG_INFINITY);
    let hi = end.unwrap_or(f64::INFINITY);
    let rows = aggregator
        .par_ratios()?
        .into_iter()
        .filter(|row| row.end > lo && row.start < hi)
        .collect();
    Ok(rows)
}

fn parse_bound(input: &str) -> Result<f64> {
    wallclock::parse(input)
        .map(wallclock::to_seconds)
        .ok_or_else(|| anyhow!("invalid date '{}', expected YYYY-MM-DD or YYYY-MM-DD HH:MM", input))
}

/// Parse every export in parallel, then merge in argument order so later
/// files win on duplicate timestamps.
fn load_cgm(paths: &[PathBuf]) -> Result<(Series, Vec<Note>)> {
    if paths.is_empty() {
        return Err(anyhow!("no CGM files supplied"));
    }
    let t_parse = Instant::now();
    let mut exports = paths
        .par_iter()
        .enumerate()
        .map(|(file_id, path)| -> Result<(usize, libreview::Export)> {
            let export = libreview::load_export(path)?;
            debug!(
                "{}: {} readings, {} other rows",
                path.display(),
                export.samples.len(),
                export.skipped
            );
            Ok((file_id, export))
        })
        .collect::<Result<Vec<_>>>()?;
    exports.sort_by_key(|(id, _)| *id);

    let mut samples = Vec::new();
    let mut notes = Vec::new();
    let mut skipped = 0;
    for (_, export) in exports {
        samples.extend(export.samples);
        notes.extend(export.notes);
        skipped += export.skipped;
    }
    let parsed = samples.len();
    let series = Series::from_unordered(samples, DuplicatePolicy::LastWins)
        .context("no usable glucose readings")?;
    info!(
        "Loaded {} readings from {} files ({} duplicates replaced, {} rows without glucose) in {:.1} ms",
        series.len(),
        paths.len(),
        parsed - series.len(),
        skipped,
        t_parse.elapsed().as_secs_f64() * 1000.0
    );
    Ok((series, notes))
}
