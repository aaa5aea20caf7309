// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::interval::CycleInterval;
use crate::point::CyclingMode;
use crate::sequence::Sequence;
use crate::taskdef::{GraphEdge, TaskDef, OUTPUT_SUCCEEDED};

fn bounds() -> SequenceBounds {
    SequenceBounds::new(CyclePoint::integer(1), Some(CyclePoint::integer(10)))
}

fn every_cycle() -> Sequence {
    Sequence::parse("P1", CyclingMode::Integer, &bounds()).unwrap()
}

fn edge(upstream: &str, downstream: &str) -> GraphEdge {
    GraphEdge {
        upstream: upstream.to_string(),
        offset: OffsetSpec::Zero,
        output: OUTPUT_SUCCEEDED.to_string(),
        downstream: downstream.to_string(),
        sequence: 0,
        alt_group: None,
    }
}

fn atom(task: &str, point: i64, output: &str) -> PrereqAtom {
    PrereqAtom::new(task, CyclePoint::integer(point), output)
}

#[test]
fn same_point_edge_materialises_one_atom() {
    let def = TaskDef::new("bar", vec![every_cycle()]);
    let edges = vec![edge("foo", "bar")];
    let expr = materialise(&def, &CyclePoint::integer(3), &edges, &bounds());

    assert_eq!(expr.conjuncts.len(), 1);
    assert_eq!(expr.conjuncts[0], vec![atom("foo", 3, OUTPUT_SUCCEEDED)]);
}

#[test]
fn negative_offset_resolves_upstream_point() {
    let def = TaskDef::new("foo", vec![every_cycle()]);
    let edges = vec![GraphEdge {
        offset: OffsetSpec::Interval(CycleInterval::Steps(-1)),
        ..edge("foo", "foo")
    }];

    let expr = materialise(&def, &CyclePoint::integer(3), &edges, &bounds());
    assert_eq!(expr.conjuncts[0], vec![atom("foo", 2, OUTPUT_SUCCEEDED)]);
}

#[test]
fn pre_initial_dependency_auto_satisfies() {
    // foo[-P1] => foo at the initial point: upstream would be cycle 0
    let def = TaskDef::new("foo", vec![every_cycle()]);
    let edges = vec![GraphEdge {
        offset: OffsetSpec::Interval(CycleInterval::Steps(-1)),
        ..edge("foo", "foo")
    }];

    let expr = materialise(&def, &CyclePoint::integer(1), &edges, &bounds());
    assert!(expr.is_trivial());
    assert!(expr.evaluate(&Default::default()).satisfied);
}

#[test]
fn initial_anchor_resolves_to_icp() {
    let def = TaskDef::new("bar", vec![every_cycle()]);
    let edges = vec![GraphEdge {
        offset: OffsetSpec::Initial,
        ..edge("foo", "bar")
    }];

    let expr = materialise(&def, &CyclePoint::integer(7), &edges, &bounds());
    assert_eq!(expr.conjuncts[0], vec![atom("foo", 1, OUTPUT_SUCCEEDED)]);
}

#[test]
fn edges_on_other_sequences_do_not_apply() {
    // bar runs every cycle but the edge is tied to an R1 sequence
    let def = TaskDef::new(
        "bar",
        vec![
            Sequence::once_at(CyclePoint::integer(1), &bounds()),
            every_cycle(),
        ],
    );
    let edges = vec![GraphEdge {
        sequence: 0,
        ..edge("foo", "bar")
    }];

    let at_first = materialise(&def, &CyclePoint::integer(1), &edges, &bounds());
    assert!(!at_first.is_trivial());
    let later = materialise(&def, &CyclePoint::integer(2), &edges, &bounds());
    assert!(later.is_trivial());
}

#[test]
fn evaluate_reports_missing_atoms() {
    let def = TaskDef::new("baz", vec![every_cycle()]);
    let edges = vec![edge("foo", "baz"), edge("bar", "baz")];
    let expr = materialise(&def, &CyclePoint::integer(2), &edges, &bounds());

    let mut completed = std::collections::BTreeSet::new();
    let sat = expr.evaluate(&completed);
    assert!(!sat.satisfied);
    assert_eq!(sat.unsatisfied.len(), 2);

    completed.insert(atom("foo", 2, OUTPUT_SUCCEEDED));
    let sat = expr.evaluate(&completed);
    assert!(!sat.satisfied);
    assert_eq!(sat.unsatisfied, vec![atom("bar", 2, OUTPUT_SUCCEEDED)]);

    completed.insert(atom("bar", 2, OUTPUT_SUCCEEDED));
    assert!(expr.evaluate(&completed).satisfied);
}

#[test]
fn alt_groups_expand_to_dnf() {
    // (a or b) and c
    let def = TaskDef::new("target", vec![every_cycle()]);
    let edges = vec![
        GraphEdge {
            alt_group: Some(1),
            ..edge("a", "target")
        },
        GraphEdge {
            alt_group: Some(1),
            ..edge("b", "target")
        },
        edge("c", "target"),
    ];
    let expr = materialise(&def, &CyclePoint::integer(4), &edges, &bounds());
    assert_eq!(expr.conjuncts.len(), 2);

    // b and c alone satisfy
    let completed: std::collections::BTreeSet<_> = [
        atom("b", 4, OUTPUT_SUCCEEDED),
        atom("c", 4, OUTPUT_SUCCEEDED),
    ]
    .into();
    assert!(expr.evaluate(&completed).satisfied);

    // a alone does not
    let completed: std::collections::BTreeSet<_> = [atom("a", 4, OUTPUT_SUCCEEDED)].into();
    assert!(!expr.evaluate(&completed).satisfied);
}

#[test]
fn xtriggers_become_atoms_at_own_point() {
    let mut def = TaskDef::new("obs", vec![every_cycle()]);
    def.xtriggers.push("data_ready".to_string());
    let expr = materialise(&def, &CyclePoint::integer(2), &[], &bounds());

    assert!(!expr.is_trivial());
    assert!(expr.references(&atom("xtrigger", 2, "data_ready")));
}

#[test]
fn no_edges_means_trivially_satisfied() {
    let def = TaskDef::new("lone", vec![every_cycle()]);
    let expr = materialise(&def, &CyclePoint::integer(1), &[], &bounds());
    assert!(expr.is_trivial());
}
