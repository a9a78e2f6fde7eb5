// SPDX-License-Identifier: GPL-3.0-only

//! Filter definitions
//!
//! A filter is an ordered list of image layers. Each layer names an image
//! stored next to the filter's `filter.json`, a blend mode, an opacity and an
//! anchor describing where the layer goes:
//!
//! ```json
//! {
//!   "id": "cat-ears",
//!   "name": "Cat Ears",
//!   "category": "face",
//!   "layers": [
//!     {
//!       "image": "ears.png",
//!       "blend": "normal",
//!       "anchor": { "type": "face", "feature": "crown", "scale": 1.2, "offset_y": -0.3 }
//!     }
//!   ]
//! }
//! ```

use crate::backends::assets::AssetStore;
use crate::constants::FILTER_METADATA_FILE;
use crate::errors::{FilterLoadError, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Display category of a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterCategory {
    Face,
    Hair,
    Combo,
}

impl FilterCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Face => "Face",
            Self::Hair => "Hair",
            Self::Combo => "Combo",
        }
    }
}

/// Per-pixel formula combining a layer with the frame beneath it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Normal,
    Screen,
    Overlay,
    Multiply,
}

/// Facial feature a face-anchored layer is centred on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceFeature {
    /// Midpoint between the eyes
    Eyes,
    Nose,
    Mouth,
    /// Top of the head (hairline top, or the top of the face box)
    Crown,
    /// Centre of the face bounding box
    Face,
}

/// Where a layer is placed on the frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Anchor {
    /// Follows face landmarks; sized relative to the face width and rotated
    /// with the eye line. Offsets are fractions of the placed layer size.
    Face {
        feature: FaceFeature,
        #[serde(default = "default_scale")]
        scale: f32,
        #[serde(default)]
        offset_x: f32,
        #[serde(default)]
        offset_y: f32,
    },
    /// Stretched over the bounds of the hair mask
    Hair {
        #[serde(default)]
        clip_to_mask: bool,
        #[serde(default = "default_scale")]
        scale: f32,
    },
    /// Fixed normalized rectangle of the frame
    Fixed {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

fn default_scale() -> f32 {
    1.0
}

fn default_opacity() -> f32 {
    1.0
}

/// One image layer of a filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterLayer {
    /// Asset name of the layer image
    pub image: String,
    #[serde(default)]
    pub blend: BlendMode,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    pub anchor: Anchor,
}

/// Immutable description of a filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    pub id: String,
    pub name: String,
    pub category: FilterCategory,
    /// Applied in order; later layers blend over earlier ones
    pub layers: Vec<FilterLayer>,
}

impl FilterDefinition {
    /// Parse and validate `filter.json` for the filter stored under `filter_id`
    pub fn from_json(filter_id: &str, bytes: &[u8]) -> Result<Self, FilterLoadError> {
        let corrupt = |reason: String| FilterLoadError::CorruptMetadata {
            filter_id: filter_id.to_string(),
            reason,
        };

        let definition: FilterDefinition =
            serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;

        if definition.id != filter_id {
            return Err(corrupt(format!(
                "id '{}' does not match its directory",
                definition.id
            )));
        }
        definition.validate().map_err(corrupt)?;
        Ok(definition)
    }

    /// Read the definition of `filter_id` from an asset store
    pub fn load(store: &dyn AssetStore, filter_id: &str) -> Result<Self, FilterLoadError> {
        let bytes = store
            .read(filter_id, FILTER_METADATA_FILE)
            .map_err(|e| match e {
                StorageError::NotFound(_) => FilterLoadError::NotFound(filter_id.to_string()),
                other => FilterLoadError::Storage(other),
            })?;
        Self::from_json(filter_id, &bytes)
    }

    fn validate(&self) -> Result<(), String> {
        if self.layers.is_empty() {
            return Err("filter has no layers".to_string());
        }

        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.image.is_empty() {
                return Err(format!("layer {} has no image", idx));
            }
            if !(0.0..=1.0).contains(&layer.opacity) {
                return Err(format!(
                    "layer {} opacity {} outside [0, 1]",
                    idx, layer.opacity
                ));
            }
            match layer.anchor {
                Anchor::Face {
                    scale,
                    offset_x,
                    offset_y,
                    ..
                } => {
                    if !(scale.is_finite() && scale > 0.0) {
                        return Err(format!("layer {} scale must be positive", idx));
                    }
                    if !offset_x.is_finite() || !offset_y.is_finite() {
                        return Err(format!("layer {} offset is not finite", idx));
                    }
                }
                Anchor::Hair { scale, .. } => {
                    if !(scale.is_finite() && scale > 0.0) {
                        return Err(format!("layer {} scale must be positive", idx));
                    }
                }
                Anchor::Fixed {
                    x,
                    y,
                    width,
                    height,
                } => {
                    if ![x, y, width, height].iter().all(|v| v.is_finite())
                        || width <= 0.0
                        || height <= 0.0
                    {
                        return Err(format!("layer {} fixed rectangle is empty", idx));
                    }
                }
            }
        }

        Ok(())
    }

    /// Distinct layer image names, in first-use order
    pub fn image_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            if !names.contains(&layer.image.as_str()) {
                names.push(&layer.image);
            }
        }
        names
    }
}

/// All filters available in an asset store
#[derive(Debug, Clone, Default)]
pub struct FilterCatalog {
    filters: BTreeMap<String, FilterDefinition>,
}

impl FilterCatalog {
    /// Parse every filter in `store`
    ///
    /// Filters with missing or invalid metadata are logged and skipped.
    pub fn discover(store: &dyn AssetStore) -> Result<Self, StorageError> {
        let mut filters = BTreeMap::new();

        for id in store.list_filters()? {
            match FilterDefinition::load(store, &id) {
                Ok(definition) => {
                    debug!(filter = %id, layers = definition.layers.len(), "Discovered filter");
                    filters.insert(id, definition);
                }
                Err(e) => warn!(filter = %id, error = %e, "Skipping filter"),
            }
        }

        Ok(Self { filters })
    }

    pub fn get(&self, id: &str) -> Option<&FilterDefinition> {
        self.filters.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterDefinition> {
        self.filters.values()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
