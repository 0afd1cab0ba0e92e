//! Time-in-band integration over a sample sequence.
//!
//! The scan is a three-state machine over [`Zone`]. Each step between two
//! adjacent samples maps the ordered pair of zones to a [`Transition`], and
//! only entries into and exits from the band touch the accumulated time.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::interp::{crossing_time, value_at, CrossingMemo};
use crate::zone::{classify, Zone};
use crate::{validate_samples, Band, Sample, TirError, Window};

/// A stretch of time spent inside the band.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub from: f64,
    pub to: f64,
}

impl Interval {
    pub fn duration(&self) -> f64 {
        (self.to - self.from).max(0.0)
    }
}

/// Result of one integration pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Occupancy {
    /// Window after clipping to the data, `None` when the request did not
    /// intersect the data or collapsed to a single instant.
    pub window: Option<Window>,
    pub intervals: Vec<Interval>,
}

impl Occupancy {
    fn empty() -> Self {
        Self {
            window: None,
            intervals: Vec::new(),
        }
    }

    pub fn in_band_seconds(&self) -> f64 {
        self.intervals.iter().map(Interval::duration).sum()
    }

    /// Fraction of the clipped window spent in band, in `[0, 1]`.
    pub fn ratio(&self) -> f64 {
        let span = match self.window {
            Some(window) if window.span() > 0.0 => window.span(),
            _ => return 0.0,
        };
        let total = self.in_band_seconds();
        if total <= 0.0 {
            return 0.0;
        }
        (total / span).clamp(0.0, 1.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Boundary {
    Low,
    High,
}

impl Boundary {
    fn value(self, band: &Band) -> f64 {
        match self {
            Boundary::Low => band.low,
            Boundary::High => band.high,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transition {
    Hold,
    Enter(Boundary),
    Exit(Boundary),
    /// The step jumped straight across the band. Treated as never in band:
    /// a gap that wide makes the interpolated path meaningless.
    Skip,
}

fn transition(from: Zone, to: Zone) -> Transition {
    match (from, to) {
        (Zone::In, Zone::Above) => Transition::Exit(Boundary::High),
        (Zone::In, Zone::Below) => Transition::Exit(Boundary::Low),
        (Zone::Above, Zone::In) => Transition::Enter(Boundary::High),
        (Zone::Below, Zone::In) => Transition::Enter(Boundary::Low),
        (Zone::Above, Zone::Below) | (Zone::Below, Zone::Above) => Transition::Skip,
        (Zone::Below, Zone::Below) | (Zone::In, Zone::In) | (Zone::Above, Zone::Above) => {
            Transition::Hold
        }
    }
}

/// Fraction of `[start, end]` that the interpolated readings spent in `band`.
///
/// Missing bounds default to the first/last sample. Windows reaching past the
/// data are clipped to it; windows that miss the data entirely yield `0`.
/// `samples` must be non-empty with strictly increasing timestamps.
pub fn time_in_band_ratio(
    samples: &[Sample],
    band: &Band,
    start: Option<f64>,
    end: Option<f64>,
) -> Result<f64, TirError> {
    validate_samples(samples)?;
    Ok(occupancy(samples, band, start, end, None)?.ratio())
}

/// Scan `samples`, which the caller has already validated.
pub(crate) fn occupancy(
    samples: &[Sample],
    band: &Band,
    start: Option<f64>,
    end: Option<f64>,
    memo: Option<&CrossingMemo>,
) -> Result<Occupancy, TirError> {
    band.validate()?;
    if let (Some(start), Some(end)) = (start, end) {
        Window::new(start, end)?;
    }
    for bound in [start, end].into_iter().flatten() {
        if !bound.is_finite() {
            return Err(TirError::InvalidWindow {
                start: start.unwrap_or(f64::NAN),
                end: end.unwrap_or(f64::NAN),
            });
        }
    }

    let window = match resolve_window(samples, start, end)? {
        Some(window) => window,
        None => return Ok(Occupancy::empty()),
    };

    let intervals = scan(samples, band, window, memo)?;
    let occupancy = Occupancy {
        window: Some(window),
        intervals,
    };
    debug!(
        intervals = occupancy.intervals.len(),
        in_band_s = occupancy.in_band_seconds(),
        span_s = window.span(),
        ratio = occupancy.ratio(),
        "time in band"
    );
    Ok(occupancy)
}

/// Clip the requested window to the data. `None` means there is nothing to
/// integrate: the request misses the data or collapses to one instant.
fn resolve_window(
    samples: &[Sample],
    start: Option<f64>,
    end: Option<f64>,
) -> Result<Option<Window>, TirError> {
    let (first, last) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => (first.t, last.t),
        _ => return Err(TirError::EmptySeries),
    };
    let start = start.unwrap_or(first);
    let end = end.unwrap_or(last);
    if start > last || end < first {
        return Ok(None);
    }
    let window = Window {
        start: start.max(first),
        end: end.min(last),
    };
    if window.span() <= 0.0 {
        return Ok(None);
    }
    Ok(Some(window))
}

fn scan(
    samples: &[Sample],
    band: &Band,
    window: Window,
    memo: Option<&CrossingMemo>,
) -> Result<Vec<Interval>, TirError> {
    let crossing = |index: usize, boundary: Boundary| -> Result<f64, TirError> {
        let before = &samples[index - 1];
        let after = &samples[index];
        let target = boundary.value(band);
        match memo {
            Some(memo) => memo.crossing(index, before, target, after),
            None => crossing_time(before.t, before.value, target, after.t, after.value),
        }
    };

    // `window.start` lies in [first, last) so `at` is a valid index, and is
    // non-zero whenever the start falls strictly between two samples.
    let at = samples.partition_point(|s| s.t < window.start);
    let (mut zone, next) = if samples[at].t == window.start {
        (classify(samples[at].value, band), at + 1)
    } else {
        let before = &samples[at - 1];
        let after = &samples[at];
        let v = value_at(before.t, before.value, window.start, after.t, after.value)?;
        (classify(v, band), at)
    };

    let mut intervals = Vec::new();
    let mut entered_at = window.start;

    for index in next..samples.len() {
        let before = &samples[index - 1];
        let sample = &samples[index];

        if sample.t > window.end {
            // The end falls inside this step. Only an unbroken stay in band
            // up to the end is counted; if the path leaves the band before
            // `end`, the partial stretch from `entered_at` to the exit is not
            // recovered here.
            if zone == Zone::In {
                let v = value_at(before.t, before.value, window.end, sample.t, sample.value)?;
                if classify(v, band) == Zone::In {
                    intervals.push(Interval {
                        from: entered_at,
                        to: window.end,
                    });
                }
            }
            return Ok(intervals);
        }

        if sample.t == window.end {
            // A reading exactly on `end` closes the window in the state held
            // before it; its own zone is not applied.
            if zone == Zone::In {
                intervals.push(Interval {
                    from: entered_at,
                    to: window.end,
                });
            }
            return Ok(intervals);
        }

        let next_zone = classify(sample.value, band);
        match transition(zone, next_zone) {
            Transition::Hold | Transition::Skip => {}
            Transition::Exit(boundary) => {
                let left_at = crossing(index, boundary)?;
                intervals.push(Interval {
                    from: entered_at,
                    to: left_at,
                });
            }
            Transition::Enter(boundary) => {
                entered_at = crossing(index, boundary)?;
            }
        }
        zone = next_zone;
    }

    Ok(intervals)
}
