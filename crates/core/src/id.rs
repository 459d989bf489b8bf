// SPDX-License-Identifier: MIT

//! Identifier newtypes for machines and disks.

use crate::error::{Error, Result};

/// Returns true if `s` is nonempty and safe to use as a filename component
/// (alphanumeric, `-`, `_`, `.`, with no path separators or leading dot-dot).
fn is_filename_safe(s: &str) -> bool {
    if s.is_empty() || s == "." || s == ".." {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Define a newtype ID wrapper around `String` that validates filename-safety
/// at construction.
///
/// Generates `new()`/`try_new()`, `as_str()`, `Display`, `From<String>`,
/// `TryFrom<String>`, `PartialEq<str>`, and `Borrow<str>` implementations.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Construct from a trusted, already-validated string (e.g. a
            /// filename observed on disk). Panics are never used here by
            /// design; callers that need validation should use [`Self::parse`].
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Validate and construct. Returns [`Error::ValidationFailed`] if
            /// `id` is empty or not filename-safe.
            pub fn parse(id: impl Into<String>) -> Result<Self> {
                let id = id.into();
                if !is_filename_safe(&id) {
                    return Err(Error::ValidationFailed(format!(
                        "invalid {}: {:?} (must be nonempty and filename-safe)",
                        stringify!($name),
                        id
                    )));
                }
                Ok(Self(id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;
            fn try_from(s: String) -> Result<Self> {
                Self::parse(s)
            }
        }
    };
}

define_id! {
    /// Identifies a machine (a supervised VM or container) within a daemon instance.
    pub struct MachineId;
}

define_id! {
    /// Identifies a disk (emulated-disk or ISO) within a datastore.
    pub struct DiskId;
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
