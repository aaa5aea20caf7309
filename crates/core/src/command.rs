// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The command surface: every external mutation of the scheduler arrives
//! as a [`Command`], applied in arrival order on the main loop.

use crate::broadcast::BroadcastSelector;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Selector over live task proxies: a point glob and a name-or-family glob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMatcher {
    /// Glob over the canonical point string; `None` matches every point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<String>,
    /// Glob over the task name or any family in its lineage.
    pub name: String,
}

impl TaskMatcher {
    pub fn new(point: Option<&str>, name: &str) -> Self {
        Self {
            point: point.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Match every instance of every task.
    pub fn all() -> Self {
        Self {
            point: None,
            name: "*".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), CommandError> {
        glob::Pattern::new(&self.name)
            .map_err(|_| CommandError::InvalidSelector(self.name.clone()))?;
        if let Some(p) = &self.point {
            glob::Pattern::new(p).map_err(|_| CommandError::InvalidSelector(p.clone()))?;
        }
        Ok(())
    }

    pub fn matches(&self, point: &str, name: &str, lineage: &[String]) -> bool {
        let name_pat = match glob::Pattern::new(&self.name) {
            Ok(p) => p,
            Err(_) => return false,
        };
        let name_hit =
            name_pat.matches(name) || lineage.iter().any(|family| name_pat.matches(family));
        if !name_hit {
            return false;
        }
        match &self.point {
            None => true,
            Some(pat) => glob::Pattern::new(pat)
                .map(|p| p.matches(point))
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for TaskMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.point {
            Some(p) => write!(f, "{}/{}", p, self.name),
            None => write!(f, "*/{}", self.name),
        }
    }
}

/// Which flow(s) a manual trigger runs in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowSpec {
    /// Reuse the target's current flow set (or all active flows if new).
    #[default]
    Same,
    /// Allocate a fresh flow id.
    New,
    /// Run without a flow: no downstream spawning.
    None,
    /// Specific existing flow ids.
    Ids(Vec<u64>),
}

/// How the scheduler shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopMode {
    /// Stop once active jobs finish.
    #[default]
    Request,
    /// Stop immediately, orphaning active jobs.
    Now,
    /// Kill active jobs, wait for terminal states, then stop.
    Kill,
}

/// External mutations, serialised into the main loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    Hold { matcher: TaskMatcher },
    Release { matcher: TaskMatcher },
    Trigger {
        matcher: TaskMatcher,
        #[serde(default)]
        flow: FlowSpec,
        #[serde(default)]
        wait: bool,
    },
    SetOutputs {
        matcher: TaskMatcher,
        labels: Vec<String>,
    },
    Remove { matcher: TaskMatcher },
    Pause,
    Resume,
    Stop {
        #[serde(default)]
        mode: StopMode,
    },
    Reload,
    BroadcastSet {
        point: String,
        namespace: String,
        setting: String,
        value: serde_json::Value,
    },
    BroadcastClear { selector: BroadcastSelector },
    Poll { matcher: TaskMatcher },
    Kill { matcher: TaskMatcher },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Hold { .. } => "hold",
            Command::Release { .. } => "release",
            Command::Trigger { .. } => "trigger",
            Command::SetOutputs { .. } => "set-outputs",
            Command::Remove { .. } => "remove",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop { .. } => "stop",
            Command::Reload => "reload",
            Command::BroadcastSet { .. } => "broadcast-set",
            Command::BroadcastClear { .. } => "broadcast-clear",
            Command::Poll { .. } => "poll",
            Command::Kill { .. } => "kill",
        }
    }
}

/// Successful command application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// How many proxies (or entries) the command touched.
    pub matched: usize,
}

impl CommandOutcome {
    pub fn touched(matched: usize) -> Self {
        Self { matched }
    }
}

/// Command validation and application errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid selector pattern: {0}")]
    InvalidSelector(String),
    #[error("no matching task proxies: {0}")]
    NoMatch(String),
    #[error("task already active: {0}")]
    AlreadyActive(String),
    #[error("unknown flow id: {0}")]
    UnknownFlow(u64),
    #[error("scheduler is stopping")]
    Stopping,
    #[error("{0}")]
    Invalid(String),
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
