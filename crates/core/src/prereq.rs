// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prerequisite materialisation and evaluation.
//!
//! `materialise` instantiates a task's graph edges at a concrete cycle
//! point, producing a disjunctive-normal-form expression over atomic
//! propositions `(upstream task, upstream point, output label)`.
//! `evaluate` checks the expression against the set of outputs already
//! produced. Both are pure.

use crate::point::CyclePoint;
use crate::sequence::SequenceBounds;
use crate::taskdef::{GraphEdge, OffsetSpec, TaskDef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One atomic proposition: `upstream@point produced output`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrereqAtom {
    pub task: String,
    pub point: CyclePoint,
    pub output: String,
}

impl PrereqAtom {
    pub fn new(task: impl Into<String>, point: CyclePoint, output: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            point,
            output: output.into(),
        }
    }
}

impl fmt::Display for PrereqAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.point, self.task, self.output)
    }
}

/// DNF: satisfied when every atom of at least one conjunct holds.
///
/// An empty conjunct list means the task has no prerequisites (trivially
/// satisfied); an empty conjunct is likewise trivially true (all of its
/// atoms were auto-satisfied as pre-initial).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrereqExpression {
    pub conjuncts: Vec<Vec<PrereqAtom>>,
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Satisfaction {
    pub satisfied: bool,
    /// Atoms still needed on the closest-to-complete conjunct.
    pub unsatisfied: Vec<PrereqAtom>,
}

impl PrereqExpression {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_trivial(&self) -> bool {
        self.conjuncts.is_empty() || self.conjuncts.iter().any(|c| c.is_empty())
    }

    /// Every atom referenced anywhere in the expression.
    pub fn atoms(&self) -> impl Iterator<Item = &PrereqAtom> {
        self.conjuncts.iter().flatten()
    }

    /// True when `atom` appears in the expression.
    pub fn references(&self, atom: &PrereqAtom) -> bool {
        self.atoms().any(|a| a == atom)
    }

    /// Evaluate against the produced-output set.
    pub fn evaluate(&self, completed: &BTreeSet<PrereqAtom>) -> Satisfaction {
        if self.is_trivial() {
            return Satisfaction {
                satisfied: true,
                unsatisfied: Vec::new(),
            };
        }

        let mut best: Option<Vec<PrereqAtom>> = None;
        for conjunct in &self.conjuncts {
            let missing: Vec<PrereqAtom> = conjunct
                .iter()
                .filter(|a| !completed.contains(*a))
                .cloned()
                .collect();
            if missing.is_empty() {
                return Satisfaction {
                    satisfied: true,
                    unsatisfied: Vec::new(),
                };
            }
            match &best {
                Some(b) if b.len() <= missing.len() => {}
                _ => best = Some(missing),
            }
        }

        Satisfaction {
            satisfied: false,
            unsatisfied: best.unwrap_or_default(),
        }
    }
}

/// Instantiate `def`'s prerequisite edges at `point`.
///
/// Edges whose resolved upstream point falls outside `[icp, fcp]` are
/// auto-satisfied (pre-initial dependencies hold by definition), which
/// lets bootstrap cycles like `foo[-P1D] => foo` start.
pub fn materialise(
    def: &TaskDef,
    point: &CyclePoint,
    edges: &[GraphEdge],
    bounds: &SequenceBounds,
) -> PrereqExpression {
    let mut and_atoms: Vec<PrereqAtom> = Vec::new();
    let mut groups: Vec<(u32, Vec<PrereqAtom>)> = Vec::new();

    for edge in edges.iter().filter(|e| e.downstream == def.name) {
        // Only edges on a sequence this point belongs to apply.
        match def.sequences.get(edge.sequence) {
            Some(seq) if seq.contains(point) => {}
            _ => continue,
        }

        let upstream_point = match &edge.offset {
            OffsetSpec::Zero => Some(*point),
            OffsetSpec::Interval(iv) => point.add(iv).ok(),
            OffsetSpec::Absolute(p) => Some(*p),
            OffsetSpec::Initial => Some(bounds.initial),
        };

        let upstream_point = match upstream_point {
            // Out of the cycling range entirely: auto-satisfied.
            Some(p) if bounds.contains(&p) => p,
            _ => continue,
        };

        let atom = PrereqAtom::new(edge.upstream.clone(), upstream_point, edge.output.clone());
        match edge.alt_group {
            None => and_atoms.push(atom),
            Some(g) => match groups.iter_mut().find(|(id, _)| *id == g) {
                Some((_, atoms)) => atoms.push(atom),
                None => groups.push((g, vec![atom])),
            },
        }
    }

    // Xtriggers join the conjunction as synthetic atoms at the task's own
    // point; the pool satisfies them when the trigger fires.
    for label in &def.xtriggers {
        and_atoms.push(PrereqAtom::new("xtrigger", *point, label.clone()));
    }

    if and_atoms.is_empty() && groups.is_empty() {
        return PrereqExpression::empty();
    }

    // Cross-product the OR groups into DNF conjuncts, each seeded with the
    // plain AND atoms.
    let mut conjuncts: Vec<Vec<PrereqAtom>> = vec![and_atoms];
    for (_, alternatives) in groups {
        let mut expanded = Vec::with_capacity(conjuncts.len() * alternatives.len());
        for conjunct in &conjuncts {
            for alt in &alternatives {
                let mut next = conjunct.clone();
                next.push(alt.clone());
                expanded.push(next);
            }
        }
        conjuncts = expanded;
    }

    PrereqExpression { conjuncts }
}

#[cfg(test)]
#[path = "prereq_tests.rs"]
mod tests;
