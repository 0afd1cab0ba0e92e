//! Time-in-band computation over irregularly sampled glucose readings.
//!
//! Readings are treated as a piecewise-linear trajectory. The integrator
//! walks that trajectory across a window and reports the fraction of the
//! window spent inside an inclusive target band.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod aggregate;
pub mod integrate;
pub mod interp;
pub mod zone;

pub use aggregate::{Alignment, WindowRatio, WindowRatios, WindowedAggregator};
pub use integrate::{time_in_band_ratio, Interval, Occupancy};
pub use interp::{crossing_time, value_at, CrossingMemo};
pub use zone::{classify, Zone};

pub const SECONDS_PER_DAY: f64 = 86_400.0;
pub const SECONDS_PER_WEEK: f64 = 7.0 * SECONDS_PER_DAY;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TirError {
    #[error("sample series is empty")]
    EmptySeries,
    #[error("sample {index} has a non-finite timestamp or value")]
    NonFiniteSample { index: usize },
    #[error("timestamps must increase: sample {index} at {t} follows {prev}")]
    NonMonotonic { index: usize, prev: f64, t: f64 },
    #[error("duplicate timestamp {t} at sample {index}")]
    DuplicateTimestamp { index: usize, t: f64 },
    #[error("invalid band: low {low} must not exceed high {high}")]
    InvalidBand { low: f64, high: f64 },
    #[error("invalid window: start {start} must not exceed end {end}")]
    InvalidWindow { start: f64, end: f64 },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("interpolation precondition violated: {0}")]
    Interpolation(String),
}

/// Broad category of a [`TirError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The sample sequence breaks an ordering or content invariant.
    InputInvariant,
    /// Band, window or aggregator parameters are unusable.
    Configuration,
    /// An interpolator was called outside its contract. Unreachable from the
    /// integrator unless its transition logic is broken.
    InterpolationPrecondition,
}

impl TirError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TirError::EmptySeries
            | TirError::NonFiniteSample { .. }
            | TirError::NonMonotonic { .. }
            | TirError::DuplicateTimestamp { .. } => ErrorKind::InputInvariant,
            TirError::InvalidBand { .. }
            | TirError::InvalidWindow { .. }
            | TirError::InvalidParameter(_) => ErrorKind::Configuration,
            TirError::Interpolation(_) => ErrorKind::InterpolationPrecondition,
        }
    }
}

/// One reading: `t` in seconds, `value` in the reading's unit (mg/dL).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub t: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(t: f64, value: f64) -> Self {
        Self { t, value }
    }
}

/// Inclusive target band.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub fn new(low: f64, high: f64) -> Result<Self, TirError> {
        let band = Self { low, high };
        band.validate()?;
        Ok(band)
    }

    pub fn validate(&self) -> Result<(), TirError> {
        if !self.low.is_finite() || !self.high.is_finite() || self.low > self.high {
            return Err(TirError::InvalidBand {
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }

    pub fn contains(&self, value: f64) -> bool {
        classify(value, self) == Zone::In
    }
}

impl Default for Band {
    fn default() -> Self {
        Self {
            low: 70.0,
            high: 180.0,
        }
    }
}

/// Closed time range `[start, end]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

impl Window {
    pub fn new(start: f64, end: f64) -> Result<Self, TirError> {
        if !start.is_finite() || !end.is_finite() || start > end {
            return Err(TirError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn span(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }
}

/// Tie-break rule for readings that share a timestamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// Any repeated timestamp is an error.
    #[default]
    Reject,
    /// Keep the reading that came last in input order.
    LastWins,
}

/// Samples with strictly increasing, finite timestamps.
#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    samples: Vec<Sample>,
}

impl Series {
    /// Wrap samples that are already in order. Fails on the first
    /// out-of-order, duplicate or non-finite sample.
    pub fn new(samples: Vec<Sample>) -> Result<Self, TirError> {
        validate_samples(&samples)?;
        Ok(Self { samples })
    }

    /// Sort samples by time and resolve equal timestamps with `policy`.
    /// The sort is stable, so "last" means last in the given order.
    pub fn from_unordered(
        mut samples: Vec<Sample>,
        policy: DuplicatePolicy,
    ) -> Result<Self, TirError> {
        if let Some(index) = samples
            .iter()
            .position(|s| !s.t.is_finite() || !s.value.is_finite())
        {
            return Err(TirError::NonFiniteSample { index });
        }
        samples.sort_by(|a, b| a.t.total_cmp(&b.t));

        match policy {
            DuplicatePolicy::Reject => {
                if let Some(index) = samples.windows(2).position(|w| w[0].t == w[1].t) {
                    return Err(TirError::DuplicateTimestamp {
                        index: index + 1,
                        t: samples[index].t,
                    });
                }
            }
            DuplicatePolicy::LastWins => {
                let mut deduped: Vec<Sample> = Vec::with_capacity(samples.len());
                for sample in samples {
                    match deduped.last_mut() {
                        Some(last) if last.t == sample.t => *last = sample,
                        _ => deduped.push(sample),
                    }
                }
                samples = deduped;
            }
        }

        Self::new(samples)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Time covered by the samples, `None` when empty.
    pub fn coverage(&self) -> Option<Window> {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => Some(Window {
                start: first.t,
                end: last.t,
            }),
            _ => None,
        }
    }

    /// Samples whose timestamps fall inside `[start, end]`.
    pub fn slice(&self, start: f64, end: f64) -> &[Sample] {
        let lo = self.samples.partition_point(|s| s.t < start);
        let hi = self.samples.partition_point(|s| s.t <= end);
        &self.samples[lo..hi.max(lo)]
    }

    pub fn time_in_band(
        &self,
        band: &Band,
        start: Option<f64>,
        end: Option<f64>,
    ) -> Result<f64, TirError> {
        Ok(self.occupancy(band, start, end)?.ratio())
    }

    pub fn occupancy(
        &self,
        band: &Band,
        start: Option<f64>,
        end: Option<f64>,
    ) -> Result<Occupancy, TirError> {
        integrate::occupancy(&self.samples, band, start, end, None)
    }
}

impl TryFrom<Vec<Sample>> for Series {
    type Error = TirError;

    fn try_from(samples: Vec<Sample>) -> Result<Self, Self::Error> {
        Series::new(samples)
    }
}

/// Check that `samples` is non-empty, finite and strictly increasing in time.
pub fn validate_samples(samples: &[Sample]) -> Result<(), TirError> {
    if samples.is_empty() {
        return Err(TirError::EmptySeries);
    }
    for (index, sample) in samples.iter().enumerate() {
        if !sample.t.is_finite() || !sample.value.is_finite() {
            return Err(TirError::NonFiniteSample { index });
        }
        if index == 0 {
            continue;
        }
        let prev = samples[index - 1].t;
        if sample.t == prev {
            return Err(TirError::DuplicateTimestamp { index, t: sample.t });
        }
        if sample.t < prev {
            return Err(TirError::NonMonotonic {
                index,
                prev,
                t: sample.t,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(t: f64, value: f64) -> Sample {
        Sample::new(t, value)
    }

    #[test]
    fn series_rejects_empty() {
        assert_eq!(Series::new(Vec::new()), Err(TirError::EmptySeries));
    }

    #[test]
    fn series_rejects_out_of_order() {
        let err = Series::new(vec![s(0.0, 100.0), s(10.0, 110.0), s(5.0, 120.0)]).unwrap_err();
        assert_eq!(
            err,
            TirError::NonMonotonic {
                index: 2,
                prev: 10.0,
                t: 5.0
            }
        );
        assert_eq!(err.kind(), ErrorKind::InputInvariant);
    }

    #[test]
    fn series_rejects_duplicates_and_nan() {
        let err = Series::new(vec![s(0.0, 100.0), s(0.0, 110.0)]).unwrap_err();
        assert!(matches!(err, TirError::DuplicateTimestamp { index: 1, .. }));

        let err = Series::new(vec![s(0.0, f64::NAN)]).unwrap_err();
        assert_eq!(err, TirError::NonFiniteSample { index: 0 });
    }

    #[test]
    fn last_wins_keeps_latest_reading() {
        let series = Series::from_unordered(
            vec![s(20.0, 1.0), s(10.0, 2.0), s(20.0, 3.0), s(10.0, 4.0)],
            DuplicatePolicy::LastWins,
        )
        .unwrap();
        assert_eq!(series.samples(), &[s(10.0, 4.0), s(20.0, 3.0)]);
    }

    #[test]
    fn reject_policy_reports_duplicates() {
        let err = Series::from_unordered(
            vec![s(20.0, 1.0), s(10.0, 2.0), s(20.0, 3.0)],
            DuplicatePolicy::Reject,
        )
        .unwrap_err();
        assert_eq!(err, TirError::DuplicateTimestamp { index: 2, t: 20.0 });
    }

    #[test]
    fn band_validation() {
        let err = Band::new(180.0, 70.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(Band::new(100.0, 100.0).is_ok());
        assert!(Band::new(f64::NAN, 100.0).is_err());
    }

    #[test]
    fn band_and_window_bounds_are_inclusive() {
        let band = Band::default();
        assert!(band.contains(70.0) && band.contains(180.0));
        assert!(!band.contains(69.9) && !band.contains(180.1));

        let window = Window::new(10.0, 20.0).unwrap();
        assert!(window.contains(10.0) && window.contains(20.0));
        assert!(!window.contains(9.0) && !window.contains(21.0));
        assert_eq!(window.span(), 10.0);
        assert!(Window::new(20.0, 10.0).is_err());
    }

    #[test]
    fn slice_is_inclusive() {
        let series = Series::new(vec![s(0.0, 1.0), s(10.0, 2.0), s(20.0, 3.0)]).unwrap();
        assert_eq!(series.slice(0.0, 10.0).len(), 2);
        assert_eq!(series.slice(11.0, 19.0).len(), 0);
        assert_eq!(series.slice(30.0, 10.0).len(), 0);
    }
}
