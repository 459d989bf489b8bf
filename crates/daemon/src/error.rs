// SPDX-License-Identifier: MIT

//! Daemon-boundary errors: config/log I/O and other startup concerns not
//! already covered by `zd_core::Error`. Mirrors the teacher's
//! `daemon::lifecycle::LifecycleError` (one thin error enum per crate
//! boundary, wrapping the lower-level crates' errors).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is not valid JSON: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("config must configure a datastore named \"default\"")]
    NoDefaultDatastore,

    #[error("could not determine a log directory")]
    NoStateDir,

    #[error("failed to bind HTTP listener on port {0}: {1}")]
    BindFailed(u16, std::io::Error),

    #[error(transparent)]
    Core(#[from] zd_core::Error),
}
