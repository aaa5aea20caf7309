// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cad-engine: the scheduler main loop and task pool.
//!
//! All pool, broadcast, and store mutation happens on one logical
//! thread — the main loop. Runner I/O runs on worker tasks that talk
//! back exclusively through the event channel.

mod broadcast;
mod commands;
mod dispatch;
mod error;
mod events;
mod pool;
mod reload;
mod scheduler;
mod timers;
mod xtrigger;

pub use broadcast::BroadcastManager;
pub use dispatch::Dispatcher;
pub use error::EngineError;
pub use pool::{SpawnOutcome, TaskPool};
pub use scheduler::{Scheduler, SchedulerClient, SchedulerExit, SchedulerPaths};
pub use timers::Timers;
pub use xtrigger::{XtriggerFn, XtriggerOutcome, XtriggerRegistry};
