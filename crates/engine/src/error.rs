// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine.

use thiserror::Error;

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] cad_store::StoreError),
    #[error("config error: {0}")]
    Config(#[from] cad_config::ConfigError),
    #[error("cycle point error: {0}")]
    Point(#[from] cad_core::PointError),
    #[error("runner error: {0}")]
    Runner(#[from] cad_platforms::RunnerError),
    #[error("event channel closed")]
    ChannelClosed,
    #[error("{0}")]
    Internal(String),
}
