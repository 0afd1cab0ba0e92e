//! Linear interpolation along the segment joining two adjacent samples.

use std::fmt;

use moka::sync::Cache;
use ordered_float::OrderedFloat;

use crate::{Sample, TirError};

/// Instant at which the segment `(t_a, v_a) -> (t_b, v_b)` reaches `target`.
///
/// `target` must lie between `v_a` and `v_b` (either direction, endpoints
/// included) and the segment must not be flat; anything else is an
/// interpolation precondition error rather than a guessed timestamp.
/// The integrator reaches the endpoint case whenever a reading sits exactly
/// on a band bound, since band bounds are inclusive.
pub fn crossing_time(t_a: f64, v_a: f64, target: f64, t_b: f64, v_b: f64) -> Result<f64, TirError> {
    if !(t_a < t_b) {
        return Err(TirError::Interpolation(format!(
            "crossing bracket must move forward in time ({t_a} -> {t_b})"
        )));
    }
    if v_a == v_b {
        return Err(TirError::Interpolation(format!(
            "flat segment at {v_a} cannot cross {target}"
        )));
    }
    let (lo, hi) = if v_a < v_b { (v_a, v_b) } else { (v_b, v_a) };
    if !(target >= lo && target <= hi) {
        return Err(TirError::Interpolation(format!(
            "target {target} outside segment values [{lo}, {hi}]"
        )));
    }
    Ok(t_a + ((target - v_a) / (v_b - v_a)) * (t_b - t_a))
}

/// Value of the segment `(t_a, v_a) -> (t_b, v_b)` at `target_time`.
///
/// Returns the stored sample value exactly when `target_time` hits either end.
pub fn value_at(t_a: f64, v_a: f64, target_time: f64, t_b: f64, v_b: f64) -> Result<f64, TirError> {
    if !(t_a <= target_time && target_time <= t_b) {
        return Err(TirError::Interpolation(format!(
            "time {target_time} outside bracket [{t_a}, {t_b}]"
        )));
    }
    if target_time == t_a {
        return Ok(v_a);
    }
    if target_time == t_b {
        return Ok(v_b);
    }
    Ok(v_a + (v_b - v_a) * ((target_time - t_a) / (t_b - t_a)))
}

/// Bounded, thread-safe memo of boundary crossings.
///
/// Keys are the index of the later sample of a pair plus the target value, so
/// a memo must only ever be used with one sample sequence.
#[derive(Clone)]
pub struct CrossingMemo {
    cache: Cache<(usize, OrderedFloat<f64>), f64>,
}

impl CrossingMemo {
    pub fn new(max_entries: u64) -> Self {
        Self {
            cache: Cache::new(max_entries),
        }
    }

    /// Crossing between `samples[index - 1]` and `samples[index]`.
    pub fn crossing(
        &self,
        index: usize,
        before: &Sample,
        target: f64,
        after: &Sample,
    ) -> Result<f64, TirError> {
        let key = (index, OrderedFloat(target));
        if let Some(t) = self.cache.get(&key) {
            return Ok(t);
        }
        let t = crossing_time(before.t, before.value, target, after.t, after.value)?;
        self.cache.insert(key, t);
        Ok(t)
    }
}

impl fmt::Debug for CrossingMemo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossingMemo")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn crossing_on_rising_ramp() {
        assert!(close(crossing_time(0.0, 100.0, 120.0, 100.0, 200.0).unwrap(), 20.0));
        assert!(close(crossing_time(0.0, 100.0, 145.0, 100.0, 200.0).unwrap(), 45.0));
    }

    #[test]
    fn crossing_on_falling_ramp() {
        assert!(close(crossing_time(0.0, 200.0, 185.0, 100.0, 100.0).unwrap(), 15.0));
    }

    #[test]
    fn crossing_at_segment_ends() {
        assert_eq!(crossing_time(10.0, 180.0, 180.0, 20.0, 200.0).unwrap(), 10.0);
        assert_eq!(crossing_time(10.0, 200.0, 180.0, 20.0, 180.0).unwrap(), 20.0);
    }

    #[test]
    fn crossing_rejects_flat_segment() {
        let err = crossing_time(0.0, 150.0, 150.0, 10.0, 150.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InterpolationPrecondition);
    }

    #[test]
    fn crossing_rejects_target_outside_segment() {
        assert!(crossing_time(0.0, 100.0, 250.0, 10.0, 200.0).is_err());
        assert!(crossing_time(0.0, 100.0, 50.0, 10.0, 200.0).is_err());
        assert!(crossing_time(10.0, 100.0, 150.0, 10.0, 200.0).is_err());
    }

    #[test]
    fn value_within_one_day() {
        let four_hours = value_at(0.0, 100.0, 14_400.0, 86_400.0, 200.0).unwrap();
        assert!((four_hours - 116.667).abs() < 1e-3);
        assert_eq!(value_at(0.0, 100.0, 43_200.0, 86_400.0, 200.0).unwrap(), 150.0);

        let falling = value_at(0.0, 200.0, 14_400.0, 86_400.0, 100.0).unwrap();
        assert!((falling - 183.333).abs() < 1e-3);
    }

    #[test]
    fn value_at_endpoints_is_exact() {
        assert_eq!(value_at(3.0, 0.1, 3.0, 7.0, 0.7).unwrap(), 0.1);
        assert_eq!(value_at(3.0, 0.1, 7.0, 7.0, 0.7).unwrap(), 0.7);
    }

    #[test]
    fn value_outside_bracket_fails() {
        assert!(value_at(0.0, 100.0, -1.0, 10.0, 200.0).is_err());
        assert!(value_at(0.0, 100.0, 11.0, 10.0, 200.0).is_err());
    }

    #[test]
    fn memo_returns_computed_crossing() {
        let memo = CrossingMemo::new(16);
        let a = Sample::new(0.0, 100.0);
        let b = Sample::new(100.0, 200.0);
        let first = memo.crossing(1, &a, 180.0, &b).unwrap();
        let second = memo.crossing(1, &a, 180.0, &b).unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
        assert!(close(first, 80.0));
        assert!(memo.crossing(1, &a, 250.0, &b).is_err());
    }
}
