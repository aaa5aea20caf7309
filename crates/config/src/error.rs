// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration errors. All are fatal at startup; reload catches them
//! and keeps the previous definition.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("failed to parse workflow definition: {0}")]
    Parse(String),
    #[error("invalid cycle point: {0}")]
    Point(#[from] cad_core::PointError),
    #[error("invalid interval '{input}': {reason}")]
    Interval { input: String, reason: String },
    #[error("graph references undefined task: {0}")]
    UndefinedTask(String),
    #[error("graph references undeclared xtrigger: {0}")]
    UndeclaredXtrigger(String),
    #[error("runtime inheritance cycle through: {0}")]
    InheritanceCycle(String),
    #[error("runtime section '{child}' inherits unknown namespace: {parent}")]
    UnknownParent { child: String, parent: String },
    #[error("completion expression for '{task}' references undeclared output: {output}")]
    UndeclaredOutput { task: String, output: String },
    #[error("final cycle point precedes initial cycle point")]
    InvertedRange,
    #[error("{0}")]
    Invalid(String),
}
