use std::panic;
use std::path::Path;

use anyhow::Result;
use bg_tir::{Band, Sample, WindowRatio, SECONDS_PER_DAY};
use clap::ValueEnum;
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};

use crate::notes::Note;
use crate::report::Goals;
use crate::wallclock;

const GLUCOSE_SIZE: (u32, u32) = (2000, 480);
const RATIO_SIZE: (u32, u32) = (2000, 420);

const PALE_GREEN: RGBColor = RGBColor(152, 251, 152);
const PALE_GOLDENROD: RGBColor = RGBColor(238, 232, 170);
const ORANGE: RGBColor = RGBColor(255, 165, 0);
const NOTE_COLOR: RGBColor = RGBColor(200, 0, 0);

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ChartKind {
    Png,
    Svg,
}

impl ChartKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ChartKind::Png => "png",
            ChartKind::Svg => "svg",
        }
    }
}

/// Readings over time with the target band shaded.
pub struct GlucoseChart<'a> {
    pub title: String,
    pub samples: &'a [Sample],
    pub band: Band,
    pub notes: &'a [Note],
}

/// Percentage of each window spent in range, against the goal bands.
pub struct RatioChart<'a> {
    pub title: String,
    pub rows: &'a [WindowRatio],
    pub goals: &'a Goals,
    pub notes: &'a [Note],
}

type TimeAxes = Cartesian2d<RangedCoordf64, RangedCoordf64>;

pub fn render_glucose_chart(path: &Path, kind: ChartKind, chart: &GlucoseChart) -> Result<(), String> {
    render_guard(|| match kind {
        ChartKind::Png => {
            draw_glucose_chart(BitMapBackend::new(path, GLUCOSE_SIZE).into_drawing_area(), chart)
        }
        ChartKind::Svg => {
            draw_glucose_chart(SVGBackend::new(path, GLUCOSE_SIZE).into_drawing_area(), chart)
        }
    })
}

pub fn render_ratio_chart(path: &Path, kind: ChartKind, chart: &RatioChart) -> Result<(), String> {
    render_guard(|| match kind {
        ChartKind::Png => {
            draw_ratio_chart(BitMapBackend::new(path, RATIO_SIZE).into_drawing_area(), chart)
        }
        ChartKind::Svg => {
            draw_ratio_chart(SVGBackend::new(path, RATIO_SIZE).into_drawing_area(), chart)
        }
    })
}

/// Font lookup in the bitmap backend can panic on hosts without system fonts.
fn render_guard<F>(render: F) -> Result<(), String>
where
    F: FnOnce() -> Result<()>,
{
    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
        .map_err(|err| format!("plotting error: {}", err))
}

fn draw_glucose_chart<DB>(root: DrawingArea<DB, plotters::coord::Shift>, chart: &GlucoseChart) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let (x_min, x_max) = time_extent(chart.samples.iter().map(|s| s.t));
    let lowest = chart
        .samples
        .iter()
        .map(|s| s.value)
        .fold(chart.band.low, f64::min);
    let highest = chart
        .samples
        .iter()
        .map(|s| s.value)
        .fold(chart.band.high, f64::max);
    let y_min = round_to(lowest * 0.95, 20.0, f64::floor).max(0.0);
    let y_max = round_to(highest * 1.05, 20.0, f64::ceil);

    let mut ctx = ChartBuilder::on(&root)
        .caption(&chart.title, title_font())
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    ctx.configure_mesh()
        .x_desc("Date")
        .y_desc("Blood Glucose Level (mg/dL)")
        .x_labels(14)
        .x_label_formatter(&|t| wallclock::format(*t, "%m-%d %H:%M"))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .label_style(axis_font())
        .draw()?;

    ctx.draw_series(std::iter::once(Rectangle::new(
        [(x_min, chart.band.low), (x_max, chart.band.high)],
        PALE_GREEN.filled(),
    )))?;
    ctx.draw_series(LineSeries::new([(x_min, chart.band.low), (x_max, chart.band.low)], &GREEN))?;
    ctx.draw_series(LineSeries::new([(x_min, chart.band.high), (x_max, chart.band.high)], &RED))?;

    ctx.draw_series(LineSeries::new(
        chart.samples.iter().map(|s| (s.t, s.value)),
        &BLACK,
    ))?
    .label("Blood Glucose Level (mg/dL)")
    .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], BLACK));
    ctx.draw_series(
        chart
            .samples
            .iter()
            .map(|s| Circle::new((s.t, s.value), 2, BLACK.filled())),
    )?;

    draw_notes(&mut ctx, chart.notes, (x_min, x_max), (y_min, y_max))?;

    ctx.configure_series_labels()
        .background_style(&WHITE.mix(0.7))
        .border_style(&BLACK.mix(0.3))
        .label_font(axis_font())
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_ratio_chart<DB>(root: DrawingArea<DB, plotters::coord::Shift>, chart: &RatioChart) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let (x_min, x_max) = time_extent(chart.rows.iter().map(|r| r.start));
    let goals = chart.goals;

    let mut ctx = ChartBuilder::on(&root)
        .caption(&chart.title, title_font())
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(x_min..x_max, 0.0..100.0)?;

    ctx.configure_mesh()
        .x_desc("Date")
        .y_desc("Time in target zone (%)")
        .x_labels(14)
        .y_labels(21)
        .x_label_formatter(&|t| wallclock::format(*t, "%Y-%m-%d"))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .label_style(axis_font())
        .draw()?;

    ctx.draw_series([
        Rectangle::new([(x_min, goals.min_pct), (x_max, goals.max_pct)], PALE_GREEN.filled()),
        Rectangle::new([(x_min, goals.warn_pct), (x_max, goals.min_pct)], PALE_GOLDENROD.filled()),
    ])?;
    for (level, color) in [(goals.max_pct, GREEN), (goals.min_pct, ORANGE), (goals.warn_pct, RED)] {
        ctx.draw_series(LineSeries::new([(x_min, level), (x_max, level)], &color))?;
    }

    ctx.draw_series(LineSeries::new(
        chart.rows.iter().map(|r| (r.start, r.ratio * 100.0)),
        &BLACK,
    ))?
    .label("Time in target zone (%)")
    .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], BLACK));
    ctx.draw_series(
        chart
            .rows
            .iter()
            .map(|r| Circle::new((r.start, r.ratio * 100.0), 3, BLACK.filled())),
    )?;

    draw_notes(&mut ctx, chart.notes, (x_min, x_max), (0.0, 100.0))?;

    ctx.configure_series_labels()
        .background_style(&WHITE.mix(0.7))
        .border_style(&BLACK.mix(0.3))
        .label_font(axis_font())
        .position(SeriesLabelPosition::LowerLeft)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Marker line at the bottom of the plot plus the note text.
fn draw_notes<DB>(
    ctx: &mut ChartContext<'_, DB, TimeAxes>,
    notes: &[Note],
    (x_min, x_max): (f64, f64),
    (y_min, y_max): (f64, f64),
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let visible: Vec<&Note> = notes
        .iter()
        .filter(|note| note.at >= x_min && note.at <= x_max)
        .collect();
    if visible.is_empty() {
        return Ok(());
    }
    let marker_top = y_min + (y_max - y_min) * 0.08;
    let note_font = FontDesc::new(FontFamily::SansSerif, 13.0, FontStyle::Normal).color(&NOTE_COLOR);

    ctx.draw_series(visible.iter().map(|note| {
        PathElement::new(vec![(note.at, y_min), (note.at, marker_top)], NOTE_COLOR)
    }))?;
    ctx.draw_series(
        visible
            .iter()
            .map(|note| Text::new(note.text.clone(), (note.at, marker_top), note_font.clone())),
    )?;
    Ok(())
}

fn title_font() -> FontDesc<'static> {
    FontDesc::new(FontFamily::SansSerif, 22.0, FontStyle::Normal)
}

fn axis_font() -> TextStyle<'static> {
    FontDesc::new(FontFamily::SansSerif, 15.0, FontStyle::Normal).color(&BLACK.mix(0.85))
}

/// Range of the timestamps, widened to a day when there is only one.
fn time_extent(times: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = times.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| {
        (lo.min(t), hi.max(t))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, SECONDS_PER_DAY);
    }
    if hi > lo {
        (lo, hi)
    } else {
        (lo, lo + SECONDS_PER_DAY)
    }
}

fn round_to(value: f64, step: f64, round: fn(f64) -> f64) -> f64 {
    round(value / step) * step
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_handles_degenerate_input() {
        assert_eq!(time_extent([10.0, 5.0, 30.0].into_iter()), (5.0, 30.0));
        assert_eq!(time_extent([7.0].into_iter()), (7.0, 7.0 + SECONDS_PER_DAY));
        assert_eq!(time_extent(std::iter::empty()), (0.0, SECONDS_PER_DAY));
    }

    #[test]
    fn axis_rounding() {
        assert_eq!(round_to(66.5, 20.0, f64::floor), 60.0);
        assert_eq!(round_to(262.5, 20.0, f64::ceil), 280.0);
    }

    #[test]
    fn chart_extensions() {
        assert_eq!(ChartKind::Png.extension(), "png");
        assert_eq!(ChartKind::Svg.extension(), "svg");
    }
}
