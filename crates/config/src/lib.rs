// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cad-config: the typed workflow definition consumed by the scheduler.
//!
//! The graph/runtime parser is external; this crate ingests the
//! normalised tree it produces (TOML on disk), resolves runtime
//! inheritance into immutable task definitions, validates the result,
//! and computes a content hash for hot reload.

mod error;
mod platform;
mod raw;
mod resolve;
mod validate;

pub use error::ConfigError;
pub use platform::PlatformConfig;
pub use raw::{RawEdge, RawGraphBlock, RawWorkflow, XtriggerSpec};
pub use resolve::{EventsConfig, WorkflowConfig};

use sha2::{Digest, Sha256};
use std::path::Path;

/// Load and resolve a workflow definition from a normalised TOML tree.
pub fn load(path: &Path) -> Result<WorkflowConfig, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
    load_str(&text)
}

/// Resolve a workflow definition from normalised TOML text.
pub fn load_str(text: &str) -> Result<WorkflowConfig, ConfigError> {
    let raw: RawWorkflow = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let hash = content_hash(text);
    let config = resolve::resolve(raw, hash)?;
    validate::validate(&config)?;
    Ok(config)
}

/// Stable content hash of the definition text, for reload change detection.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("{:x}", digest)
}
