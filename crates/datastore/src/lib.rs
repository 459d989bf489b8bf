// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zd-datastore: the rooted directory holding JSON manifests and raw disk
//! bytes (spec.md §4.1), and the state store built on top of it (§4.6).

pub mod disk_provision;
pub mod fs_write;
pub mod state_store;
pub mod store;

pub use disk_provision::provision_disk;
pub use state_store::StateStore;
pub use store::Datastore;
