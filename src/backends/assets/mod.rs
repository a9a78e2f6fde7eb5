// SPDX-License-Identifier: MPL-2.0

//! Asset store boundary
//!
//! Filters live in a read-only hierarchical store keyed by filter id:
//!
//! ```text
//! <root>/
//!   cat-ears/
//!     filter.json
//!     ears.png
//!   pink-streaks/
//!     filter.json
//!     streaks.png
//! ```
//!
//! Missing entries are reported as [`StorageError::NotFound`], never as a
//! panic.
//!
//! # Modules
//!
//! - [`directory`]: filters unpacked on disk
//! - [`embedded`]: built-in filters compiled into the binary
//! - [`memory`]: in-memory store for tests and generated filters

pub mod directory;
pub mod embedded;
pub mod memory;

pub use directory::DirectoryAssetStore;
pub use embedded::EmbeddedAssetStore;
pub use memory::InMemoryAssetStore;

use crate::errors::StorageError;

/// Read-only store of filter assets
///
/// Calls may block on I/O; async callers run them on the blocking pool.
pub trait AssetStore: Send + Sync {
    /// Check if `name` exists under filter `filter_id`
    fn exists(&self, filter_id: &str, name: &str) -> bool;

    /// Read the bytes of asset `name` under filter `filter_id`
    fn read(&self, filter_id: &str, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Names of the assets stored under `filter_id`, sorted
    fn list(&self, filter_id: &str) -> Result<Vec<String>, StorageError>;

    /// Ids of every filter in the store, sorted
    fn list_filters(&self) -> Result<Vec<String>, StorageError>;
}

/// Reject ids and names that could escape their directory
pub(crate) fn validate_component(component: &str) -> Result<(), StorageError> {
    let bad = component.is_empty()
        || component == "."
        || component == ".."
        || component.contains(['/', '\\', '\0']);
    if bad {
        return Err(StorageError::InvalidPath(component.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_component() {
        assert!(validate_component("cat-ears").is_ok());
        assert!(validate_component("ears.png").is_ok());
        assert!(validate_component("..").is_err());
        assert!(validate_component("../secrets").is_err());
        assert!(validate_component("a\\b").is_err());
        assert!(validate_component("").is_err());
    }
}
