// Property: parsing a Range header yields exactly the slice the header
// describes, in the unit system the header names, and degrades to the full
// range only for shape-malformed input.

use earshot::{RangeSpec, ServeError};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// For any valid `bytes=<a>-<b>` header, parsing yields exactly that
    /// byte range.
    #[test]
    fn prop_byte_range_parsing(
        start in 0u64..=u64::MAX / 2,
        stop in 0u64..=u64::MAX / 2,
    ) {
        let header = format!("bytes={}-{}", start, stop);
        let spec = RangeSpec::parse(&header).expect("valid byte header must parse");

        prop_assert_eq!(spec, RangeSpec::Bytes { start, stop: Some(stop) });
    }

    /// `bytes=<a>-` always yields an open-ended range starting at `a`.
    #[test]
    fn prop_open_ended_byte_range(start in 0u64..=u64::MAX / 2) {
        let header = format!("bytes={}-", start);
        let spec = RangeSpec::parse(&header).expect("open-ended header must parse");

        prop_assert_eq!(spec, RangeSpec::Bytes { start, stop: None });
    }

    /// For any valid `seconds=<a>-<b>` header, the parsed start equals `a`
    /// seconds converted to picoseconds exactly, and the duration equals
    /// `(b - a)` seconds in picoseconds.
    #[test]
    fn prop_time_range_picosecond_conversion(
        start in 0.0f64..10_000.0,
        extent in 0.0f64..10_000.0,
    ) {
        let stop = start + extent;
        let header = format!("seconds={}-{}", start, stop);
        let spec = RangeSpec::parse(&header).expect("valid time header must parse");

        let ts = spec.as_time().expect("seconds unit must yield a time range");
        prop_assert_eq!(ts.start_ps, (start * 1e12).round() as i64);
        prop_assert_eq!(ts.duration_ps, Some(((stop - start) * 1e12).round() as i64));
    }

    /// `seconds=<a>-` yields an open-ended time range.
    #[test]
    fn prop_open_ended_time_range(start in 0.0f64..10_000.0) {
        let header = format!("seconds={}-", start);
        let spec = RangeSpec::parse(&header).expect("open-ended header must parse");

        let ts = spec.as_time().expect("seconds unit must yield a time range");
        prop_assert_eq!(ts.start_ps, (start * 1e12).round() as i64);
        prop_assert_eq!(ts.duration_ps, None);
    }

    /// Any unit other than bytes/seconds fails with the offending token;
    /// the shape being otherwise valid does not save it.
    #[test]
    fn prop_unknown_unit_is_fatal(
        unit in "[a-z]{1,12}",
        start in 0u64..=1000u64,
        stop in 0u64..=1000u64,
    ) {
        prop_assume!(unit != "bytes" && unit != "seconds");

        let header = format!("{}={}-{}", unit, start, stop);
        match RangeSpec::parse(&header) {
            Err(ServeError::RangeUnitUnsupported(token)) => prop_assert_eq!(token, unit),
            other => prop_assert!(false, "expected RangeUnitUnsupported, got {:?}", other),
        }
    }

    /// Headers without the `<unit>=<start>-<stop>` shape never error; they
    /// degrade to the full range.
    #[test]
    fn prop_shapeless_header_is_full(raw in "[a-z0-9 ]{0,24}") {
        // No '=' anywhere, so the shape can never match.
        let spec = RangeSpec::parse(&raw).expect("shapeless header must not error");
        prop_assert_eq!(spec, RangeSpec::Full);
    }

    /// An unparseable stop in a byte header means "to end", while the start
    /// must always parse.
    #[test]
    fn prop_byte_stop_is_lenient(start in 0u64..=1000u64, junk in "[a-z]{1,8}") {
        let header = format!("bytes={}-{}", start, junk);
        let spec = RangeSpec::parse(&header).expect("junk stop must be lenient");
        prop_assert_eq!(spec, RangeSpec::Bytes { start, stop: None });
    }
}

#[cfg(test)]
mod unit_tests {
    use earshot::RangeSpec;

    #[test]
    fn test_empty_header_is_full() {
        assert_eq!(RangeSpec::parse("").unwrap(), RangeSpec::Full);
    }

    #[test]
    fn test_documented_examples() {
        assert_eq!(
            RangeSpec::parse("bytes=10-").unwrap(),
            RangeSpec::Bytes { start: 10, stop: None }
        );

        let spec = RangeSpec::parse("seconds=1.5-2").unwrap();
        let ts = spec.as_time().unwrap();
        assert_eq!(ts.start_ps, 1_500_000_000_000);
        assert_eq!(ts.duration_ps, Some(500_000_000_000));
    }
}
