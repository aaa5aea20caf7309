// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recurrence sequences: generators of cycle points within `[icp, fcp]`.
//!
//! The recognised notation is the ISO 8601 recurrence subset used by the
//! graph configuration: `R1`, `P1D`, `R5/20130101T0000Z/P1D`, with `^`
//! (initial point) and `$` (final point) anchors, optionally offset
//! (`^+PT6H`).

use crate::interval::CycleInterval;
use crate::point::{CyclePoint, CyclingMode, PointError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The workflow cycling range a sequence is clipped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceBounds {
    pub initial: CyclePoint,
    pub final_point: Option<CyclePoint>,
}

impl SequenceBounds {
    pub fn new(initial: CyclePoint, final_point: Option<CyclePoint>) -> Self {
        Self {
            initial,
            final_point,
        }
    }

    /// True when `point` lies within `[icp, fcp]`.
    pub fn contains(&self, point: &CyclePoint) -> bool {
        if *point < self.initial {
            return false;
        }
        match &self.final_point {
            Some(fcp) => point <= fcp,
            None => true,
        }
    }
}

/// A recurrence rule yielding monotonically increasing cycle points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    start: CyclePoint,
    /// `None` for single-shot (`R1`) sequences.
    interval: Option<CycleInterval>,
    /// `None` means unbounded repetition (still clipped by `fcp`).
    repetitions: Option<u64>,
    bounds: SequenceBounds,
}

impl Sequence {
    /// Parse a recurrence expression against the workflow bounds.
    pub fn parse(
        expr: &str,
        mode: CyclingMode,
        bounds: &SequenceBounds,
    ) -> Result<Self, PointError> {
        let expr = expr.trim();
        let parts: Vec<&str> = expr.split('/').collect();

        let parse_anchor = |s: &str| -> Result<CyclePoint, PointError> {
            resolve_anchor(s, mode, bounds)
        };

        let (repetitions, rest): (Option<u64>, &[&str]) = match parts.first() {
            Some(p) if p.starts_with('R') => {
                let n: u64 = p[1..].parse().map_err(|_| PointError::Parse {
                    input: expr.to_string(),
                    reason: "bad repetition count".into(),
                })?;
                (Some(n), &parts[1..])
            }
            _ => (None, &parts[..]),
        };

        let (start, interval) = match rest {
            // R1 / Rn alone: anchored at the initial point
            [] => (bounds.initial, None),
            [one] => {
                if one.starts_with('P') || one.starts_with("-P") {
                    // P1D — from the initial point
                    (bounds.initial, Some(CycleInterval::parse(one)?))
                } else {
                    // R1/<anchor>
                    (parse_anchor(one)?, None)
                }
            }
            [anchor, period] => {
                let start = parse_anchor(anchor)?;
                let interval = CycleInterval::parse(period)?;
                (start, Some(interval))
            }
            _ => {
                return Err(PointError::Parse {
                    input: expr.to_string(),
                    reason: "too many '/' sections".into(),
                })
            }
        };

        if let Some(iv) = &interval {
            if iv.is_zero() || iv.is_negative() {
                return Err(PointError::Parse {
                    input: expr.to_string(),
                    reason: "recurrence interval must be positive".into(),
                });
            }
        }
        if interval.is_none() && repetitions.map_or(false, |n| n > 1) {
            return Err(PointError::Parse {
                input: expr.to_string(),
                reason: "repetitions > 1 require an interval".into(),
            });
        }

        Ok(Self {
            start,
            interval,
            repetitions,
            bounds: *bounds,
        })
    }

    /// Single point at `start`, clipped by the bounds. Used for `R1` graphs.
    pub fn once_at(point: CyclePoint, bounds: &SequenceBounds) -> Self {
        Self {
            start: point,
            interval: None,
            repetitions: Some(1),
            bounds: *bounds,
        }
    }

    pub fn bounds(&self) -> &SequenceBounds {
        &self.bounds
    }

    pub fn is_finite(&self) -> bool {
        self.repetitions.is_some() || self.bounds.final_point.is_some() || self.interval.is_none()
    }

    /// First point of the sequence at or after the initial cycle point.
    pub fn first(&self) -> Option<CyclePoint> {
        if self.start >= self.bounds.initial {
            return self.bounds.contains(&self.start).then_some(self.start);
        }
        // Start lies before the window; advance into it.
        self.next_after(&self.bounds.initial.sub(&unit_epsilon(&self.bounds.initial)).ok()?)
            .or_else(|| {
                // Degenerate epsilon failure: walk from start.
                self.next_on_or_after(&self.bounds.initial)
            })
    }

    /// Smallest sequence point strictly greater than `after`.
    pub fn next_after(&self, after: &CyclePoint) -> Option<CyclePoint> {
        let interval = match &self.interval {
            None => {
                // Single-shot sequence
                return (self.start > *after && self.bounds.contains(&self.start))
                    .then_some(self.start);
            }
            Some(iv) => iv,
        };

        let candidate = if *after < self.start {
            self.start
        } else {
            match step_count(&self.start, after, interval) {
                // Fixed-length interval: O(1) index arithmetic
                Some(k) => self.start.add_n(interval, k + 1)?,
                // Calendar months: walk forward from start
                None => {
                    let mut p = self.start;
                    loop {
                        p = p.add(interval).ok()?;
                        if p > *after {
                            break p;
                        }
                    }
                }
            }
        };

        if !self.bounds.contains(&candidate) {
            return None;
        }
        if let Some(reps) = self.repetitions {
            let idx = self.index_of(&candidate)?;
            if idx >= reps {
                return None;
            }
        }
        Some(candidate)
    }

    fn next_on_or_after(&self, point: &CyclePoint) -> Option<CyclePoint> {
        if self.contains(point) {
            Some(*point)
        } else {
            self.next_after(point)
        }
    }

    /// True when `point` is generated by this sequence.
    pub fn contains(&self, point: &CyclePoint) -> bool {
        if !self.bounds.contains(point) || *point < self.start {
            return false;
        }
        match self.index_of(point) {
            Some(idx) => self.repetitions.map_or(true, |reps| idx < reps),
            None => false,
        }
    }

    /// Zero-based index of `point` within the recurrence, if it is on it.
    fn index_of(&self, point: &CyclePoint) -> Option<u64> {
        if *point == self.start {
            return Some(0);
        }
        let interval = self.interval.as_ref()?;
        match step_count(&self.start, point, interval) {
            Some(k) => {
                // Exact only if re-adding lands on the point
                let back = self.start.add_n(interval, k)?;
                (back == *point).then_some(k)
            }
            None => {
                // Calendar months: walk and compare
                let mut p = self.start;
                let mut k = 0u64;
                while p < *point {
                    p = p.add(interval).ok()?;
                    k += 1;
                    if let Some(reps) = self.repetitions {
                        if k > reps {
                            return None;
                        }
                    }
                }
                (p == *point).then_some(k)
            }
        }
    }
}

/// Number of whole intervals from `start` to `point` for fixed-length
/// intervals; `None` when the interval is calendar-varying.
fn step_count(start: &CyclePoint, point: &CyclePoint, interval: &CycleInterval) -> Option<u64> {
    match (start, point, interval) {
        (CyclePoint::Integer(a), CyclePoint::Integer(b), CycleInterval::Steps(step)) => {
            if *step <= 0 || b < a {
                return None;
            }
            Some(((b - a) / step) as u64)
        }
        (CyclePoint::DateTime(a), CyclePoint::DateTime(b), iv) => {
            let len = iv.fixed_seconds()?;
            if len <= 0 {
                return None;
            }
            let diff = b.signed_duration_since(*a).num_seconds();
            if diff < 0 {
                return None;
            }
            Some((diff / len) as u64)
        }
        _ => None,
    }
}

/// Smallest representable step for "just before" arithmetic in `first`.
fn unit_epsilon(point: &CyclePoint) -> CycleInterval {
    match point {
        CyclePoint::Integer(_) => CycleInterval::Steps(1),
        CyclePoint::DateTime(_) => CycleInterval::seconds(1),
    }
}

impl CyclePoint {
    /// `self + n * interval` without iterating for fixed-length intervals.
    fn add_n(&self, interval: &CycleInterval, n: u64) -> Option<CyclePoint> {
        match interval {
            CycleInterval::Steps(step) => {
                let delta = step.checked_mul(n as i64)?;
                self.add(&CycleInterval::Steps(delta)).ok()
            }
            CycleInterval::Calendar { months: 0, seconds } => {
                let delta = seconds.checked_mul(n as i64)?;
                self.add(&CycleInterval::seconds(delta)).ok()
            }
            CycleInterval::Calendar { .. } => {
                let mut p = *self;
                for _ in 0..n {
                    p = p.add(interval).ok()?;
                }
                Some(p)
            }
        }
    }
}

/// Resolve `^`, `$`, `^+P1D`, `$-PT6H`, or an absolute point.
fn resolve_anchor(
    s: &str,
    mode: CyclingMode,
    bounds: &SequenceBounds,
) -> Result<CyclePoint, PointError> {
    let s = s.trim();
    let (base, offset_str) = if let Some(rest) = s.strip_prefix('^') {
        (bounds.initial, rest)
    } else if let Some(rest) = s.strip_prefix('$') {
        let fcp = bounds
            .final_point
            .ok_or_else(|| PointError::Parse {
                input: s.to_string(),
                reason: "'$' anchor requires a final cycle point".into(),
            })?;
        (fcp, rest)
    } else {
        return CyclePoint::parse(s, mode);
    };

    if offset_str.is_empty() {
        return Ok(base);
    }
    let interval = CycleInterval::parse(offset_str)?;
    base.add(&interval)
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(reps) = self.repetitions {
            write!(f, "R{}/", reps)?;
        }
        write!(f, "{}", self.start)?;
        if let Some(iv) = &self.interval {
            write!(f, "/{}", iv)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "sequence_tests.rs"]
mod tests;
