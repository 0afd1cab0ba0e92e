//! Report directory: per-week glucose charts, all-time charts, time-in-range
//! CSVs and an `index.html` tying them together.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bg_tir::{Band, Series, WindowRatio, WindowedAggregator};
use chrono::Weekday;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::notes::Note;
use crate::plot::{self, ChartKind, GlucoseChart, RatioChart};
use crate::wallclock;

/// Crossings shared between adjacent windows; a few per window is typical.
const MEMO_CAPACITY: u64 = 4_096;

/// Goal percentages for time in range, drawn as bands on the ratio charts.
#[derive(Clone, Debug, PartialEq)]
pub struct Goals {
    pub min_pct: f64,
    pub max_pct: f64,
    pub warn_pct: f64,
}

impl Default for Goals {
    fn default() -> Self {
        Self {
            min_pct: 80.0,
            max_pct: 100.0,
            warn_pct: 70.0,
        }
    }
}

impl Goals {
    pub fn validate(&self) -> Result<()> {
        let ordered = 0.0 <= self.warn_pct
            && self.warn_pct <= self.min_pct
            && self.min_pct <= self.max_pct
            && self.max_pct <= 100.0;
        if !ordered {
            return Err(anyhow!(
                "goal percentages must satisfy 0 <= warn ({}) <= min ({}) <= max ({}) <= 100",
                self.warn_pct,
                self.min_pct,
                self.max_pct
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ReportConfig {
    pub band: Band,
    pub goals: Goals,
    pub week_start: Weekday,
    pub chart_kind: ChartKind,
    pub plots: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            band: Band::default(),
            goals: Goals::default(),
            week_start: Weekday::Sun,
            chart_kind: ChartKind::Png,
            plots: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReportSummary {
    pub overall_ratio: f64,
    pub daily: Vec<WindowRatio>,
    pub weekly: Vec<WindowRatio>,
    /// Charts that rendered successfully, in index order.
    pub charts: Vec<PathBuf>,
    pub index: PathBuf,
}

struct Section {
    heading: String,
    images: Vec<String>,
}

pub fn generate(
    series: &Series,
    notes: &[Note],
    config: &ReportConfig,
    out_dir: &Path,
) -> Result<ReportSummary> {
    config.goals.validate()?;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let band = config.band;
    let overall_ratio = series
        .time_in_band(&band, None, None)
        .context("failed to compute overall time in range")?;
    let daily = WindowedAggregator::daily(series, band)?
        .with_memo(MEMO_CAPACITY)
        .par_ratios()
        .context("failed to compute daily time in range")?;
    let weekly = WindowedAggregator::weekly(series, band, config.week_start)?
        .with_memo(MEMO_CAPACITY)
        .par_ratios()
        .context("failed to compute weekly time in range")?;
    info!(
        "Time in range {:.1}% over {} days / {} weeks",
        overall_ratio * 100.0,
        daily.len(),
        weekly.len()
    );

    write_ratio_csv(&daily, &out_dir.join("daily_tir.csv"))?;
    write_ratio_csv(&weekly, &out_dir.join("weekly_tir.csv"))?;

    let mut sections = Vec::new();
    let mut charts = Vec::new();
    if config.plots {
        let ext = config.chart_kind.extension();
        let mut overview = |heading: &str, file: String, rendered: Result<(), String>, path: &Path| {
            match rendered {
                Ok(()) => {
                    info!("Wrote chart: {}", path.display());
                    charts.push(path.to_path_buf());
                    sections.push(Section {
                        heading: heading.to_string(),
                        images: vec![file],
                    });
                }
                Err(err) => warn!("Skipping chart ({}): {}", path.display(), err),
            }
        };

        let file = format!("all-time-glucose-graph.{ext}");
        let path = out_dir.join(&file);
        let rendered = plot::render_glucose_chart(
            &path,
            config.chart_kind,
            &GlucoseChart {
                title: format!(
                    "All-Time Blood Glucose Levels (time in target: {:.1}%)",
                    overall_ratio * 100.0
                ),
                samples: series.samples(),
                band,
                notes,
            },
        );
        overview("All-Time Glucose Levels", file, rendered, &path);

        for (heading, title, rows, name) in [
            (
                "All-Time daily time spent in zone",
                "All-Time Daily Percentage Time in Target Zone",
                &daily,
                "all-time-tz-graph",
            ),
            (
                "All-Time weekly time spent in zone",
                "All-Time Weekly Percentage Time in Target Zone",
                &weekly,
                "weekly-tz-graph",
            ),
        ] {
            let file = format!("{name}.{ext}");
            let path = out_dir.join(&file);
            let rendered = plot::render_ratio_chart(
                &path,
                config.chart_kind,
                &RatioChart {
                    title: format!("{} (all-time average: {:.1}%)", title, average_pct(rows)),
                    rows,
                    goals: &config.goals,
                    notes,
                },
            );
            overview(heading, file, rendered, &path);
        }

        let week_charts = render_week_charts(series, notes, config, &weekly, out_dir);
        let mut images = Vec::with_capacity(week_charts.len());
        for (file, path) in week_charts {
            images.push(file);
            charts.push(path);
        }
        if !images.is_empty() {
            sections.push(Section {
                heading: "Weekly Blood Glucose Reports".to_string(),
                images,
            });
        }
    }

    let index = out_dir.join("index.html");
    let html = render_index(overall_ratio, &weekly, &sections);
    fs::write(&index, html).with_context(|| format!("failed to write {}", index.display()))?;
    info!("Wrote report index: {}", index.display());

    Ok(ReportSummary {
        overall_ratio,
        daily,
        weekly,
        charts,
        index,
    })
}

/// One glucose chart per weekly window, rendered on the rayon pool. Returns
/// the file name and path of every chart that rendered.
fn render_week_charts(
    series: &Series,
    notes: &[Note],
    config: &ReportConfig,
    weekly: &[WindowRatio],
    out_dir: &Path,
) -> Vec<(String, PathBuf)> {
    let ext = config.chart_kind.extension();
    weekly
        .par_iter()
        .filter_map(|week| {
            let samples = series.slice(week.start, week.end);
            let day = wallclock::format(week.start, "%Y-%m-%d");
            if samples.is_empty() {
                debug!("No readings in week starting {}", day);
                return None;
            }
            let file = format!("{day}_weekly.{ext}");
            let path = out_dir.join(&file);
            let chart = GlucoseChart {
                title: format!(
                    "Blood Glucose Levels for the week starting {} (time in target: {:.1}%)",
                    day,
                    week.ratio * 100.0
                ),
                samples,
                band: config.band,
                notes,
            };
            match plot::render_glucose_chart(&path, config.chart_kind, &chart) {
                Ok(()) => {
                    debug!("Wrote chart: {}", path.display());
                    Some((file, path))
                }
                Err(err) => {
                    warn!("Skipping chart ({}): {}", path.display(), err);
                    None
                }
            }
        })
        .collect()
}

fn average_pct(rows: &[WindowRatio]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().map(|row| row.ratio).sum::<f64>() / rows.len() as f64 * 100.0
}

pub fn write_ratio_csv(rows: &[WindowRatio], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_ratio_rows(rows, &mut writer)
}

pub fn write_ratio_rows<W: Write>(rows: &[WindowRatio], writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(["window_start", "window_end", "time_in_range_pct"])?;
    for row in rows {
        writer.write_record([
            wallclock::format(row.start, "%Y-%m-%d %H:%M:%S"),
            wallclock::format(row.end, "%Y-%m-%d %H:%M:%S"),
            format!("{:.3}", row.ratio * 100.0),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn render_index(overall_ratio: f64, weekly: &[WindowRatio], sections: &[Section]) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n");
    html.push_str("<head><meta charset=\"utf-8\"><title>Blood Glucose Reports</title></head>\n");
    html.push_str("<body>\n");
    let _ = writeln!(
        html,
        "<p>All-time time in target: {:.1}%</p>",
        overall_ratio * 100.0
    );

    for section in sections {
        let _ = writeln!(html, "<h1>{}</h1>", escape(&section.heading));
        for image in &section.images {
            let _ = writeln!(html, "<p><img src=\"{}\"/></p>", escape(image));
        }
    }

    html.push_str("<h1>Weekly time in target</h1>\n<table>\n");
    html.push_str("<tr><th>Week starting</th><th>Time in target (%)</th></tr>\n");
    for week in weekly {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{:.1}</td></tr>",
            wallclock::format(week.start, "%Y-%m-%d"),
            week.ratio * 100.0
        );
    }
    html.push_str("</table>\n");

    let _ = writeln!(
        html,
        "<footer>bg-tir {} ({})</footer>",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH")
    );
    html.push_str("</body>\n</html>\n");
    html
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bg_tir::{Sample, SECONDS_PER_DAY};

    /// Sunday 2022-04-03 00:00 through Wednesday, a reading every 15 minutes,
    /// in range except 12:00-18:00 each day.
    fn fixture() -> Series {
        let start = wallclock::to_seconds(wallclock::parse("2022-04-03").unwrap());
        let samples = (0..(4 * 24 * 4))
            .map(|i| {
                let t = start + i as f64 * 900.0;
                let hour = (i / 4) % 24;
                let value = if (12..18).contains(&hour) { 220.0 } else { 110.0 };
                Sample::new(t, value)
            })
            .collect();
        Series::new(samples).unwrap()
    }

    fn no_plots() -> ReportConfig {
        ReportConfig {
            plots: false,
            ..ReportConfig::default()
        }
    }

    #[test]
    fn writes_csvs_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let series = fixture();
        let summary = generate(&series, &[], &no_plots(), dir.path()).unwrap();

        assert_eq!(summary.daily.len(), 4);
        assert_eq!(summary.weekly.len(), 1);
        assert!(summary.charts.is_empty());
        assert!(summary.overall_ratio > 0.7 && summary.overall_ratio < 0.8);
        assert_eq!(summary.daily[1].end - summary.daily[1].start, SECONDS_PER_DAY);

        let daily = fs::read_to_string(dir.path().join("daily_tir.csv")).unwrap();
        let mut lines = daily.lines();
        assert_eq!(lines.next(), Some("window_start,window_end,time_in_range_pct"));
        assert!(lines.next().unwrap().starts_with("2022-04-03 00:00:00,2022-04-04 00:00:00,"));
        assert_eq!(daily.lines().count(), 5);

        let weekly = fs::read_to_string(dir.path().join("weekly_tir.csv")).unwrap();
        assert!(weekly.contains("2022-04-03 00:00:00,2022-04-10 00:00:00,"));

        let index = fs::read_to_string(&summary.index).unwrap();
        assert!(index.contains("<td>2022-04-03</td>"));
        assert!(index.contains(env!("CARGO_PKG_VERSION")));
        assert!(!index.contains("<img"));
    }

    #[test]
    fn week_start_moves_weekly_windows() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReportConfig {
            week_start: Weekday::Mon,
            ..no_plots()
        };
        let summary = generate(&fixture(), &[], &config, dir.path()).unwrap();
        assert_eq!(summary.weekly.len(), 2);
        assert_eq!(
            wallclock::format(summary.weekly[0].start, "%Y-%m-%d"),
            "2022-03-28"
        );
    }

    #[test]
    fn rejects_unordered_goals() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReportConfig {
            goals: Goals {
                min_pct: 60.0,
                max_pct: 100.0,
                warn_pct: 70.0,
            },
            ..no_plots()
        };
        assert!(generate(&fixture(), &[], &config, dir.path()).is_err());
    }

    #[test]
    fn ratio_rows_format_percentages() {
        let rows = [WindowRatio {
            start: 0.0,
            end: SECONDS_PER_DAY,
            ratio: 0.5,
        }];
        let mut writer = csv::Writer::from_writer(Vec::new());
        write_ratio_rows(&rows, &mut writer).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(
            text,
            "window_start,window_end,time_in_range_pct\n\
             1970-01-01 00:00:00,1970-01-02 00:00:00,50.000\n"
        );
    }

    #[test]
    fn index_escapes_markup() {
        let html = render_index(
            0.5,
            &[],
            &[Section {
                heading: "a<b".to_string(),
                images: vec!["x\".png".to_string()],
            }],
        );
        assert!(html.contains("<h1>a&lt;b</h1>"));
        assert!(html.contains("x&quot;.png"));
    }
}
