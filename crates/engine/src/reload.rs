// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hot reload: adopt a changed definition wholesale, or keep the old one.

use crate::scheduler::Scheduler;
use cad_core::prereq::materialise;
use cad_core::{Clock, CommandError, CommandOutcome, TaskState};
use cad_platforms::JobRunner;
use tracing::{info, warn};

impl<R: JobRunner, C: Clock> Scheduler<R, C> {
    /// Transactional reload: parse and validate the definition first;
    /// only a fully valid new tree replaces the running one.
    pub(crate) fn cmd_reload(&mut self) -> Result<CommandOutcome, CommandError> {
        let Some(path) = self.paths.config_path.clone() else {
            return Err(CommandError::Invalid(
                "reload unavailable: no definition path".to_string(),
            ));
        };

        let new_config = match cad_config::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Reload failed");
                return Err(CommandError::Invalid(format!("Reload failed: {e}")));
            }
        };

        if new_config.hash == self.config.hash {
            info!("reload: definition unchanged");
            return Ok(CommandOutcome::touched(0));
        }

        info!(
            old = self.config.short_hash(),
            new = new_config.short_hash(),
            "reloading workflow definition"
        );

        self.config = new_config;
        self.xtriggers.set_specs(self.config.xtriggers.clone());
        self.write_inheritance();

        // Re-materialise prerequisites for waiting proxies against the
        // new graph; satisfied atoms carry over where still referenced.
        let keys = self.pool.keys();
        let mut touched = 0;
        for key in keys {
            let Some(def) = self.config.task(&key.name) else {
                warn!(task = %key, "task dropped by reload; proxy retained until terminal");
                continue;
            };
            let expr = materialise(def, &key.point, &self.config.edges, &self.config.bounds);
            if let Some(proxy) = self.pool.get_mut(&key) {
                if proxy.state == TaskState::Waiting {
                    let kept = proxy
                        .satisfied
                        .iter()
                        .filter(|atom| expr.references(atom))
                        .cloned()
                        .collect();
                    proxy.prereqs = expr;
                    proxy.satisfied = kept;
                    touched += 1;
                    self.persist_proxy(&key);
                }
            }
        }

        info!(touched, "reload complete");
        Ok(CommandOutcome::touched(touched))
    }
}
