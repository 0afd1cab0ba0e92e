use serde::{Deserialize, Serialize};

use crate::Band;

/// Position of a value relative to a band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    Below,
    In,
    Above,
}

/// Band bounds are inclusive: a value equal to `low` or `high` is `In`.
pub fn classify(value: f64, band: &Band) -> Zone {
    if value < band.low {
        Zone::Below
    } else if value > band.high {
        Zone::Above
    } else {
        Zone::In
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_inclusive() {
        let band = Band::new(70.0, 180.0).unwrap();
        assert_eq!(classify(69.9, &band), Zone::Below);
        assert_eq!(classify(70.0, &band), Zone::In);
        assert_eq!(classify(125.0, &band), Zone::In);
        assert_eq!(classify(180.0, &band), Zone::In);
        assert_eq!(classify(180.1, &band), Zone::Above);
    }

    #[test]
    fn degenerate_band_has_one_in_value() {
        let band = Band::new(100.0, 100.0).unwrap();
        assert_eq!(classify(100.0, &band), Zone::In);
        assert_eq!(classify(99.0, &band), Zone::Below);
        assert_eq!(classify(101.0, &band), Zone::Above);
    }
}
