// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The contact file: records how to reach a live scheduler and doubles
//! as the double-start lock.

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// `.service/contact` contents while a scheduler is running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactFile {
    pub host: String,
    pub port: u16,
    pub pid: u32,
    pub version: String,
    pub uuid: String,
}

impl ContactFile {
    pub fn new(uuid: String) -> Self {
        Self {
            host: hostname(),
            // The command transport is external; no port is bound here.
            port: 0,
            pid: std::process::id(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uuid,
        }
    }

    pub fn path(run_dir: &Path) -> PathBuf {
        run_dir.join(".service").join("contact")
    }

    /// Write the contact file under an exclusive lock. The lock is held
    /// by the returned guard until shutdown; a second scheduler on the
    /// same run directory fails here.
    pub fn write(&self, run_dir: &Path) -> std::io::Result<ContactGuard> {
        let path = Self::path(run_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        file.try_lock_exclusive()?;
        let body = serde_json::to_string_pretty(self)?;
        file.write_all(body.as_bytes())?;
        file.sync_all()?;
        Ok(ContactGuard { file, path })
    }

    /// Read a contact file if present (stale-detection on startup).
    pub fn read(run_dir: &Path) -> Option<Self> {
        let text = std::fs::read_to_string(Self::path(run_dir)).ok()?;
        serde_json::from_str(&text).ok()
    }
}

/// Holds the contact lock; removes the file on drop.
pub struct ContactGuard {
    // NOTE(lifetime): held to maintain the exclusive lock until shutdown
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl Drop for ContactGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "could not remove contact file");
        }
    }
}

fn hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
#[path = "contact_tests.rs"]
mod tests;
