// SPDX-License-Identifier: MIT

//! Shared error kinds produced by the core, datastore, runtime, supervisor,
//! and registry crates.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors the core daemon produces. See spec §7 for the authoritative list.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("machine busy: {0}")]
    MachineBusy(String),

    #[error("disk busy (referenced by a machine): {0}")]
    DiskBusy(String),

    #[error("already running: {0}")]
    AlreadyRunning(String),

    #[error("failed to spawn {machine_id}: {message}")]
    SpawnFailed { machine_id: String, message: String },

    #[error("unknown runtime type: {0}")]
    UnknownRuntime(String),

    #[error("unknown disk type: {0}")]
    UnknownDiskType(String),

    #[error("datastore {0} is not initialized")]
    DatastoreUninitialized(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("runtime error: {0}")]
    RuntimeError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True if this error kind should map to HTTP 404 at the API boundary.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_classification() {
        assert!(Error::NotFound("m1".into()).is_not_found());
        assert!(!Error::MachineBusy("m1".into()).is_not_found());
    }

    #[test]
    fn display_includes_context() {
        let e = Error::SpawnFailed {
            machine_id: "m1".into(),
            message: "boom".into(),
        };
        assert_eq!(e.to_string(), "failed to spawn m1: boom");
    }
}
