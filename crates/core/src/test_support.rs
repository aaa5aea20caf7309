// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders shared across the workspace (behind `test-support`).

use crate::flow::FlowSet;
use crate::interval::CycleInterval;
use crate::point::{CyclePoint, CyclingMode};
use crate::prereq::PrereqExpression;
use crate::sequence::{Sequence, SequenceBounds};
use crate::task::{TaskKey, TaskProxy};
use crate::taskdef::{GraphEdge, OffsetSpec, TaskDef};

/// Integer bounds `[1, fcp]`.
pub fn int_bounds(fcp: Option<i64>) -> SequenceBounds {
    SequenceBounds::new(CyclePoint::integer(1), fcp.map(CyclePoint::integer))
}

/// An `R1` sequence anchored at the initial point.
pub fn once(bounds: &SequenceBounds) -> Sequence {
    Sequence::once_at(bounds.initial, bounds)
}

/// An integer `P1` recurrence over the whole range.
#[allow(clippy::unwrap_used)]
pub fn every_cycle(bounds: &SequenceBounds) -> Sequence {
    Sequence::parse("P1", CyclingMode::Integer, bounds).unwrap()
}

/// A task definition on the given sequences.
pub fn def(name: &str, sequences: Vec<Sequence>) -> TaskDef {
    TaskDef::new(name, sequences)
}

/// A same-point dependency edge `upstream:succeeded => downstream`.
pub fn edge(upstream: &str, downstream: &str) -> GraphEdge {
    GraphEdge {
        upstream: upstream.to_string(),
        offset: OffsetSpec::Zero,
        output: crate::taskdef::OUTPUT_SUCCEEDED.to_string(),
        downstream: downstream.to_string(),
        sequence: 0,
        alt_group: None,
    }
}

/// An offset dependency edge `upstream[offset]:succeeded => downstream`.
pub fn offset_edge(upstream: &str, offset: CycleInterval, downstream: &str) -> GraphEdge {
    GraphEdge {
        offset: OffsetSpec::Interval(offset),
        ..edge(upstream, downstream)
    }
}

/// A waiting proxy in flow 1 with no prerequisites.
pub fn proxy(point: CyclePoint, name: &str) -> TaskProxy {
    TaskProxy::new(
        TaskKey::new(point, name),
        FlowSet::single(1),
        PrereqExpression::empty(),
        0,
    )
}
