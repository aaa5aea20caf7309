// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup validation. Any error here is fatal (or, on reload, rejects
//! the new definition wholesale).

use crate::error::ConfigError;
use crate::resolve::WorkflowConfig;
use cad_core::is_lifecycle_output;
use tracing::debug;

pub(crate) fn validate(config: &WorkflowConfig) -> Result<(), ConfigError> {
    if let Some(fcp) = &config.bounds.final_point {
        if *fcp < config.bounds.initial {
            return Err(ConfigError::InvertedRange);
        }
    }

    for edge in &config.edges {
        if !config.tasks.contains_key(&edge.upstream) {
            return Err(ConfigError::UndefinedTask(edge.upstream.clone()));
        }
        if !config.tasks.contains_key(&edge.downstream) {
            return Err(ConfigError::UndefinedTask(edge.downstream.clone()));
        }
        // An edge may require a custom output the upstream never declares.
        let upstream = &config.tasks[&edge.upstream];
        if !upstream.knows_output(&edge.output) {
            return Err(ConfigError::UndeclaredOutput {
                task: edge.upstream.clone(),
                output: edge.output.clone(),
            });
        }
    }

    for def in config.tasks.values() {
        for label in def.completion.labels() {
            if !is_lifecycle_output(label) && !def.custom_outputs.contains_key(label) {
                return Err(ConfigError::UndeclaredOutput {
                    task: def.name.clone(),
                    output: label.to_string(),
                });
            }
        }
        for label in &def.xtriggers {
            if !config.xtriggers.contains_key(label) {
                return Err(ConfigError::UndeclaredXtrigger(label.clone()));
            }
        }
    }

    debug!(
        tasks = config.tasks.len(),
        edges = config.edges.len(),
        "workflow definition validated"
    );
    Ok(())
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
