// SPDX-License-Identifier: MPL-2.0

//! Built-in filters compiled into the binary

use super::{AssetStore, validate_component};
use crate::errors::StorageError;
use rust_embed::RustEmbed;
use std::collections::BTreeSet;

#[derive(RustEmbed)]
#[folder = "assets/filters/"]
struct BuiltinFilters;

/// Asset store serving the filters shipped with the application
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedAssetStore;

impl EmbeddedAssetStore {
    pub fn new() -> Self {
        Self
    }
}

impl AssetStore for EmbeddedAssetStore {
    fn exists(&self, filter_id: &str, name: &str) -> bool {
        BuiltinFilters::get(&format!("{}/{}", filter_id, name)).is_some()
    }

    fn read(&self, filter_id: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        validate_component(filter_id)?;
        validate_component(name)?;
        let path = format!("{}/{}", filter_id, name);
        BuiltinFilters::get(&path)
            .map(|file| file.data.into_owned())
            .ok_or(StorageError::NotFound(path))
    }

    fn list(&self, filter_id: &str) -> Result<Vec<String>, StorageError> {
        validate_component(filter_id)?;
        let prefix = format!("{}/", filter_id);
        let names: Vec<String> = BuiltinFilters::iter()
            .filter_map(|path| {
                path.strip_prefix(&prefix)
                    .filter(|rest| !rest.contains('/'))
                    .map(str::to_string)
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if names.is_empty() {
            return Err(StorageError::NotFound(filter_id.to_string()));
        }
        Ok(names)
    }

    fn list_filters(&self) -> Result<Vec<String>, StorageError> {
        Ok(BuiltinFilters::iter()
            .filter_map(|path| path.split_once('/').map(|(id, _)| id.to_string()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }
}
