// SPDX-License-Identifier: MIT

//! Runtime driver and TAP device manager: turns a `MachineSpec` into an
//! actual OS process (qemu or docker) and back again.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod argvalue;
pub mod container;
pub mod driver;
pub mod emulator;
pub mod subprocess;
pub mod tap;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use container::ContainerDriver;
pub use driver::{format_args, ChildHandle, DiskResolver, ProcessStatus, RuntimeDriver, Spawned};
pub use emulator::EmulatorDriver;
pub use tap::{TapDevice, TapManager};

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeRuntimeDriver;
