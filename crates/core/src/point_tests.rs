// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::interval::CycleInterval;

#[yare::parameterized(
    long_date = { "2013-09-24", "20130924T0000Z" },
    short_date = { "20130924", "20130924T0000Z" },
    long_datetime = { "2013-09-24T06:30", "20130924T0630Z" },
    short_datetime = { "20130924T0630", "20130924T0630Z" },
    zulu = { "20130924T0630Z", "20130924T0630Z" },
    hour_only = { "20130924T06", "20130924T0600Z" },
)]
fn parse_gregorian_canonicalises(input: &str, canonical: &str) {
    let p = CyclePoint::parse(input, CyclingMode::Gregorian).unwrap();
    assert_eq!(p.to_string(), canonical);
}

#[test]
fn parse_fixed_offset_preserves_zone() {
    let p = CyclePoint::parse("2013-09-24T06:00+05:30", CyclingMode::Gregorian).unwrap();
    assert_eq!(p.to_string(), "20130924T0600+0530");
    // Same instant as 00:30 UTC
    let utc = CyclePoint::parse("20130924T0030Z", CyclingMode::Gregorian).unwrap();
    assert_eq!(p, utc);
}

#[test]
fn parse_integer_points() {
    assert_eq!(
        CyclePoint::parse("5", CyclingMode::Integer).unwrap(),
        CyclePoint::integer(5)
    );
    assert!(CyclePoint::parse("20130924", CyclingMode::Integer).is_ok());
    assert!(CyclePoint::parse("abc", CyclingMode::Integer).is_err());
}

#[test]
fn ordering_is_total_within_calendar() {
    let a = CyclePoint::parse("20130924", CyclingMode::Gregorian).unwrap();
    let b = CyclePoint::parse("20130925", CyclingMode::Gregorian).unwrap();
    assert!(a < b);
    assert!(CyclePoint::integer(1) < CyclePoint::integer(2));
}

#[test]
fn add_day_and_diff() {
    let a = CyclePoint::parse("20130924", CyclingMode::Gregorian).unwrap();
    let day = CycleInterval::parse("P1D").unwrap();
    let b = a.add(&day).unwrap();
    assert_eq!(b.to_string(), "20130925T0000Z");
    assert_eq!(b.diff(&a).unwrap(), CycleInterval::seconds(86_400));
}

#[test]
fn add_month_is_calendar_aware() {
    let jan31 = CyclePoint::parse("20230131", CyclingMode::Gregorian).unwrap();
    let month = CycleInterval::parse("P1M").unwrap();
    // chrono clamps to the end of February
    assert_eq!(jan31.add(&month).unwrap().to_string(), "20230228T0000Z");
}

#[test]
fn subtract_negative_offset() {
    let p = CyclePoint::parse("20130925", CyclingMode::Gregorian).unwrap();
    let minus_day = CycleInterval::parse("-P1D").unwrap();
    assert_eq!(p.add(&minus_day).unwrap().to_string(), "20130924T0000Z");
}

#[test]
fn calendar_mismatch_is_an_error() {
    let p = CyclePoint::integer(3);
    let day = CycleInterval::parse("P1D").unwrap();
    assert_eq!(p.add(&day), Err(PointError::CalendarMismatch));
}

#[test]
fn integer_steps_arithmetic() {
    let p = CyclePoint::integer(3);
    assert_eq!(p.add(&CycleInterval::Steps(2)).unwrap(), CyclePoint::integer(5));
    assert_eq!(
        p.diff(&CyclePoint::integer(1)).unwrap(),
        CycleInterval::Steps(2)
    );
}

#[test]
fn serde_round_trip() {
    for (input, mode) in [
        ("20130924T0600Z", CyclingMode::Gregorian),
        ("7", CyclingMode::Integer),
    ] {
        let p = CyclePoint::parse(input, mode).unwrap();
        let json = serde_json::to_string(&p).unwrap();
        let back: CyclePoint = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
