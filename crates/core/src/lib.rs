// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zd-core: shared ids, spec types, and error kinds used across the zd
//! hypervisor control daemon.

pub mod error;
pub mod id;
pub mod spec;

pub use error::{Error, Result};
pub use id::{DiskId, MachineId};
pub use spec::{DiskOptions, DiskSpec, DiskType, MachineOptions, MachineSpec, PropertyMap, RuntimeKind};
