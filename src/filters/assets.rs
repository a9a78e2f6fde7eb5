// SPDX-License-Identifier: GPL-3.0-only

//! Decoded filter assets

use super::definition::FilterDefinition;
use crate::backends::assets::AssetStore;
use crate::errors::{FilterLoadError, StorageError};
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A filter definition together with its decoded layer images
///
/// Only ever handed out fully populated.
#[derive(Debug)]
pub struct FilterAssets {
    definition: FilterDefinition,
    images: HashMap<String, Arc<RgbaImage>>,
    byte_size: usize,
}

impl FilterAssets {
    /// Read and decode a filter and every image its layers reference
    pub fn load(store: &dyn AssetStore, filter_id: &str) -> Result<Self, FilterLoadError> {
        let start = std::time::Instant::now();
        let definition = FilterDefinition::load(store, filter_id)?;

        let mut images = HashMap::new();
        for name in definition.image_names() {
            let bytes = store.read(filter_id, name).map_err(|e| match e {
                StorageError::NotFound(_) => FilterLoadError::MissingLayerImage {
                    filter_id: filter_id.to_string(),
                    image: name.to_string(),
                },
                other => FilterLoadError::Storage(other),
            })?;

            let image = image::load_from_memory(&bytes)
                .map_err(|e| FilterLoadError::UndecodableLayerImage {
                    filter_id: filter_id.to_string(),
                    image: name.to_string(),
                    reason: e.to_string(),
                })?
                .to_rgba8();

            if image.width() == 0 || image.height() == 0 {
                return Err(FilterLoadError::UndecodableLayerImage {
                    filter_id: filter_id.to_string(),
                    image: name.to_string(),
                    reason: "image is empty".to_string(),
                });
            }

            images.insert(name.to_string(), Arc::new(image));
        }

        let assets = Self::from_parts(definition, images);
        debug!(
            filter = filter_id,
            images = assets.images.len(),
            bytes = assets.byte_size,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Decoded filter assets"
        );
        Ok(assets)
    }

    /// Assemble assets from already decoded images
    pub fn from_parts(definition: FilterDefinition, images: HashMap<String, Arc<RgbaImage>>) -> Self {
        let byte_size = images.values().map(|image| image.as_raw().len()).sum();
        Self {
            definition,
            images,
            byte_size,
        }
    }

    pub fn definition(&self) -> &FilterDefinition {
        &self.definition
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    /// Decoded image for a layer image name
    pub fn image(&self, name: &str) -> Option<&Arc<RgbaImage>> {
        self.images.get(name)
    }

    /// Decoded size of all images, used for the cache budget
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }
}
