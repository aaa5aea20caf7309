// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cycle intervals: integer step counts and ISO 8601 durations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors from interval parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalParseError {
    #[error("invalid interval: {0}")]
    Invalid(String),
    #[error("empty interval")]
    Empty,
}

/// A distance along the cycling axis.
///
/// Integer workflows use bare step counts (`P3`); datetime workflows use
/// ISO 8601 durations (`P1D`, `PT30M`, `-P1M`). Calendar months are kept
/// separate from fixed seconds because month length varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleInterval {
    /// Whole cycles in an integer workflow.
    Steps(i64),
    /// Calendar-aware duration: `months` advance by calendar, the rest is
    /// a fixed number of seconds.
    Calendar { months: i32, seconds: i64 },
}

impl CycleInterval {
    pub fn zero() -> Self {
        CycleInterval::Steps(0)
    }

    pub fn seconds(seconds: i64) -> Self {
        CycleInterval::Calendar { months: 0, seconds }
    }

    pub fn days(days: i64) -> Self {
        Self::seconds(days * 86_400)
    }

    pub fn is_zero(&self) -> bool {
        match self {
            CycleInterval::Steps(n) => *n == 0,
            CycleInterval::Calendar { months, seconds } => *months == 0 && *seconds == 0,
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            CycleInterval::Steps(n) => *n < 0,
            CycleInterval::Calendar { months, seconds } => {
                *months < 0 || (*months == 0 && *seconds < 0)
            }
        }
    }

    pub fn negated(&self) -> Self {
        match self {
            CycleInterval::Steps(n) => CycleInterval::Steps(-n),
            CycleInterval::Calendar { months, seconds } => CycleInterval::Calendar {
                months: -months,
                seconds: -seconds,
            },
        }
    }

    /// Fixed length in seconds, if the interval has one (no calendar months).
    pub fn fixed_seconds(&self) -> Option<i64> {
        match self {
            CycleInterval::Steps(_) => None,
            CycleInterval::Calendar { months: 0, seconds } => Some(*seconds),
            CycleInterval::Calendar { .. } => None,
        }
    }

    /// Convert a non-negative fixed interval to a std `Duration`.
    ///
    /// Used for retry delays and polling schedules, which are always
    /// fixed-length. Steps and calendar-month intervals return `None`.
    pub fn to_duration(&self) -> Option<Duration> {
        match self.fixed_seconds() {
            Some(s) if s >= 0 => Some(Duration::from_secs(s as u64)),
            _ => None,
        }
    }

    /// Parse `P`-notation: a bare `P<n>` is an integer step count, anything
    /// with date/time designators is an ISO 8601 duration.
    pub fn parse(input: &str) -> Result<Self, IntervalParseError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(IntervalParseError::Empty);
        }

        let (negative, s) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        let body = s
            .strip_prefix('P')
            .ok_or_else(|| IntervalParseError::Invalid(input.to_string()))?;
        if body.is_empty() {
            return Err(IntervalParseError::Invalid(input.to_string()));
        }

        // Bare step count: P3 (integer cycling)
        if body.chars().all(|c| c.is_ascii_digit()) {
            let n: i64 = body
                .parse()
                .map_err(|_| IntervalParseError::Invalid(input.to_string()))?;
            return Ok(CycleInterval::Steps(if negative { -n } else { n }));
        }

        let (date_part, time_part) = match body.split_once('T') {
            Some((d, t)) => (d, Some(t)),
            None => (body, None),
        };

        let mut months: i32 = 0;
        let mut seconds: i64 = 0;

        let mut scan = |part: &str, in_time: bool| -> Result<(), IntervalParseError> {
            let mut num = String::new();
            for c in part.chars() {
                if c.is_ascii_digit() {
                    num.push(c);
                    continue;
                }
                let n: i64 = num
                    .parse()
                    .map_err(|_| IntervalParseError::Invalid(input.to_string()))?;
                num.clear();
                match (c, in_time) {
                    ('Y', false) => months += (n as i32) * 12,
                    ('M', false) => months += n as i32,
                    ('W', false) => seconds += n * 7 * 86_400,
                    ('D', false) => seconds += n * 86_400,
                    ('H', true) => seconds += n * 3_600,
                    ('M', true) => seconds += n * 60,
                    ('S', true) => seconds += n,
                    _ => return Err(IntervalParseError::Invalid(input.to_string())),
                }
            }
            if !num.is_empty() {
                return Err(IntervalParseError::Invalid(input.to_string()));
            }
            Ok(())
        };

        scan(date_part, false)?;
        if let Some(t) = time_part {
            if t.is_empty() {
                return Err(IntervalParseError::Invalid(input.to_string()));
            }
            scan(t, true)?;
        }

        if negative {
            months = -months;
            seconds = -seconds;
        }
        Ok(CycleInterval::Calendar { months, seconds })
    }
}

impl fmt::Display for CycleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleInterval::Steps(n) => {
                if *n < 0 {
                    write!(f, "-P{}", -n)
                } else {
                    write!(f, "P{}", n)
                }
            }
            CycleInterval::Calendar { months, seconds } => {
                if self.is_negative() {
                    write!(f, "-")?;
                }
                let months = months.unsigned_abs();
                let mut secs = seconds.unsigned_abs();
                write!(f, "P")?;
                if months >= 12 {
                    write!(f, "{}Y", months / 12)?;
                }
                if months % 12 != 0 {
                    write!(f, "{}M", months % 12)?;
                }
                let days = secs / 86_400;
                secs %= 86_400;
                if days > 0 {
                    write!(f, "{}D", days)?;
                }
                if secs > 0 {
                    write!(f, "T")?;
                    let h = secs / 3_600;
                    let m = (secs % 3_600) / 60;
                    let s = secs % 60;
                    if h > 0 {
                        write!(f, "{}H", h)?;
                    }
                    if m > 0 {
                        write!(f, "{}M", m)?;
                    }
                    if s > 0 {
                        write!(f, "{}S", s)?;
                    }
                } else if months == 0 && days == 0 {
                    // Zero duration
                    write!(f, "T0S")?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for CycleInterval {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CycleInterval {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CycleInterval::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "interval_tests.rs"]
mod tests;
