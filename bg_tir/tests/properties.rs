use bg_tir::{
    classify, time_in_band_ratio, Band, DuplicatePolicy, Sample, Series, WindowedAggregator, Zone,
};
use proptest::prelude::*;

/// Strictly increasing timestamps built from positive gaps.
fn samples_strategy(values: impl Strategy<Value = f64> + Clone) -> impl Strategy<Value = Vec<Sample>> {
    prop::collection::vec((1u32..7_200, values), 2..80).prop_map(|steps| {
        let mut t = 1_600_000_000.0;
        steps
            .into_iter()
            .map(|(gap, value)| {
                t += gap as f64;
                Sample::new(t, value)
            })
            .collect()
    })
}

fn band() -> Band {
    Band::new(70.0, 180.0).unwrap()
}

proptest! {
    #[test]
    fn ratio_is_a_fraction(
        samples in samples_strategy(20.0f64..400.0),
        a in -0.2f64..1.2,
        b in -0.2f64..1.2,
    ) {
        let first = samples[0].t;
        let span = samples[samples.len() - 1].t - first;
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let ratio = time_in_band_ratio(
            &samples,
            &band(),
            Some(first + lo * span),
            Some(first + hi * span),
        ).unwrap();
        prop_assert!((0.0..=1.0).contains(&ratio));
    }

    #[test]
    fn constant_in_band_is_always_one(
        samples in samples_strategy(Just(120.0)),
        a in 0.0f64..0.5,
        b in 0.5f64..1.5,
    ) {
        let first = samples[0].t;
        let span = samples[samples.len() - 1].t - first;
        let ratio = time_in_band_ratio(
            &samples,
            &band(),
            Some(first + a * span),
            Some(first + b * span),
        ).unwrap();
        prop_assert_eq!(ratio, 1.0);
    }

    #[test]
    fn constant_outside_band_is_always_zero(
        samples in samples_strategy(Just(250.0)),
        low in any::<bool>(),
    ) {
        let samples: Vec<Sample> = if low {
            samples.into_iter().map(|s| Sample::new(s.t, 40.0)).collect()
        } else {
            samples
        };
        prop_assert_eq!(time_in_band_ratio(&samples, &band(), None, None).unwrap(), 0.0);
    }

    #[test]
    fn repeated_calls_are_identical(samples in samples_strategy(20.0f64..400.0)) {
        let a = time_in_band_ratio(&samples, &band(), None, None).unwrap();
        let b = time_in_band_ratio(&samples, &band(), None, None).unwrap();
        prop_assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn aggregation_paths_agree(samples in samples_strategy(20.0f64..400.0)) {
        let series = Series::new(samples).unwrap();
        let plain = WindowedAggregator::new(&series, band(), 6.0 * 3600.0).unwrap();
        let memo = WindowedAggregator::new(&series, band(), 6.0 * 3600.0).unwrap().with_memo(256);
        let sequential = plain.ratios().unwrap();
        prop_assert_eq!(&plain.par_ratios().unwrap(), &sequential);
        prop_assert_eq!(&memo.par_ratios().unwrap(), &sequential);
    }

    #[test]
    fn last_wins_keeps_final_reading(
        samples in samples_strategy(20.0f64..400.0),
        shift in 1.0f64..50.0,
    ) {
        let mut doubled = samples.clone();
        doubled.extend(samples.iter().map(|s| Sample::new(s.t, s.value + shift)));
        let series = Series::from_unordered(doubled, DuplicatePolicy::LastWins).unwrap();
        prop_assert_eq!(series.len(), samples.len());
        for (kept, original) in series.samples().iter().zip(&samples) {
            prop_assert_eq!(kept.value, original.value + shift);
        }
    }

    #[test]
    fn classification_matches_band_bounds(value in 0.0f64..400.0) {
        let zone = classify(value, &band());
        prop_assert_eq!(zone == Zone::In, (70.0..=180.0).contains(&value));
    }
}
