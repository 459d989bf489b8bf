// SPDX-License-Identifier: MIT

//! Per-machine supervisor state machine (D): spawn, watch, respawn, stop
//! races (spec.md §4.3).

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod state;

pub use state::{Supervisor, SupervisorState};
