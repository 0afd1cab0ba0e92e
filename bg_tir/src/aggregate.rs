//! Time-in-band over consecutive fixed-length windows (per day, per week).

use chrono::{DateTime, Datelike, Weekday};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::integrate;
use crate::interp::CrossingMemo;
use crate::{Band, Series, TirError, SECONDS_PER_DAY, SECONDS_PER_WEEK};

/// Where the first window starts relative to the first sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Alignment {
    /// At the first sample.
    Unaligned,
    /// At midnight on or before the first sample.
    #[default]
    Day,
    /// At midnight of the given weekday on or before the first sample.
    Week(Weekday),
}

impl Alignment {
    /// Start of the first window for data beginning at `t`.
    pub fn origin(&self, t: f64) -> f64 {
        match self {
            Alignment::Unaligned => t,
            Alignment::Day => day_floor(t),
            Alignment::Week(week_start) => {
                let midnight = day_floor(t);
                let weekday = match DateTime::from_timestamp(midnight as i64, 0) {
                    Some(dt) => dt.weekday(),
                    None => return midnight,
                };
                let back = (weekday.num_days_from_monday() + 7
                    - week_start.num_days_from_monday())
                    % 7;
                midnight - back as f64 * SECONDS_PER_DAY
            }
        }
    }
}

fn day_floor(t: f64) -> f64 {
    t - t.rem_euclid(SECONDS_PER_DAY)
}

/// Time in band for one window `[start, end]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowRatio {
    pub start: f64,
    pub end: f64,
    pub ratio: f64,
}

/// Evaluates contiguous, non-overlapping windows of a fixed length across a
/// series. Each window is an independent integration over the shared,
/// read-only samples.
#[derive(Clone, Debug)]
pub struct WindowedAggregator<'a> {
    series: &'a Series,
    band: Band,
    window_s: f64,
    alignment: Alignment,
    origin: f64,
    last: f64,
    memo: Option<CrossingMemo>,
}

impl<'a> WindowedAggregator<'a> {
    pub fn new(series: &'a Series, band: Band, window_s: f64) -> Result<Self, TirError> {
        band.validate()?;
        if !(window_s.is_finite() && window_s > 0.0) {
            return Err(TirError::InvalidParameter(format!(
                "window length must be positive, got {window_s}"
            )));
        }
        let coverage = series.coverage().ok_or(TirError::EmptySeries)?;
        let alignment = Alignment::default();
        Ok(Self {
            series,
            band,
            window_s,
            alignment,
            origin: alignment.origin(coverage.start),
            last: coverage.end,
            memo: None,
        })
    }

    pub fn daily(series: &'a Series, band: Band) -> Result<Self, TirError> {
        Self::new(series, band, SECONDS_PER_DAY)
    }

    pub fn weekly(series: &'a Series, band: Band, week_start: Weekday) -> Result<Self, TirError> {
        Ok(Self::new(series, band, SECONDS_PER_WEEK)?.with_alignment(Alignment::Week(week_start)))
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        if let Some(first) = self.series.first() {
            self.origin = alignment.origin(first.t);
        }
        self
    }

    /// Cache boundary crossings across windows, keeping at most `capacity`.
    pub fn with_memo(mut self, capacity: u64) -> Self {
        self.memo = Some(CrossingMemo::new(capacity));
        self
    }

    pub fn window_len(&self) -> f64 {
        self.window_s
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// Start of the `index`-th window, `None` once past the last sample.
    pub fn window_start(&self, index: usize) -> Option<f64> {
        let start = self.origin + index as f64 * self.window_s;
        (start < self.last).then_some(start)
    }

    pub fn window_starts(&self) -> impl Iterator<Item = f64> + '_ {
        (0..).map_while(move |index| self.window_start(index))
    }

    pub fn evaluate(&self, start: f64) -> Result<WindowRatio, TirError> {
        let end = start + self.window_s;
        let occupancy = integrate::occupancy(
            self.series.samples(),
            &self.band,
            Some(start),
            Some(end),
            self.memo.as_ref(),
        )?;
        Ok(WindowRatio {
            start,
            end,
            ratio: occupancy.ratio(),
        })
    }

    /// Lazy window sequence; clone it or call again to restart.
    pub fn windows(&self) -> WindowRatios<'_> {
        WindowRatios {
            aggregator: self,
            next: 0,
        }
    }

    pub fn ratios(&self) -> Result<Vec<WindowRatio>, TirError> {
        let rows = self.windows().collect::<Result<Vec<_>, _>>()?;
        debug!(windows = rows.len(), window_s = self.window_s, "window ratios");
        Ok(rows)
    }

    /// Same rows as [`ratios`](Self::ratios), evaluated on the rayon pool.
    pub fn par_ratios(&self) -> Result<Vec<WindowRatio>, TirError> {
        let starts: Vec<f64> = self.window_starts().collect();
        let rows = starts
            .par_iter()
            .map(|&start| self.evaluate(start))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(windows = rows.len(), window_s = self.window_s, "window ratios (parallel)");
        Ok(rows)
    }
}

#[derive(Clone, Debug)]
pub struct WindowRatios<'a> {
    aggregator: &'a WindowedAggregator<'a>,
    next: usize,
}

impl Iterator for WindowRatios<'_> {
    type Item = Result<WindowRatio, TirError>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.aggregator.window_start(self.next)?;
        self.next += 1;
        Some(self.aggregator.evaluate(start))
    }
}
