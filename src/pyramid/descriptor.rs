//! Pyramid descriptor JSON schema.
//!
//! Required keys are `Option`s so that loading can report the exact missing
//! attribute instead of a generic parse failure.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top level of a pyramid descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PyramidDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_matrix_set: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<LevelDescriptor>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raster_specifications: Option<RasterSpecifications>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_format: Option<String>,
}

/// Raster pyramid pixel description.
///
/// Only `channels` is interpreted; other keys (`nodata`, `photometric`,
/// `interpolation`...) are kept as they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterSpecifications {
    pub channels: u32,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// One entry of `levels`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiles_per_width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiles_per_height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_limits: Option<TileLimits>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<LevelStorage>,

    /// Vector pyramids only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<Value>>,
}

/// Extreme tile indices holding data in a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileLimits {
    pub min_col: u64,
    pub max_row: u64,
    pub max_col: u64,
    pub min_row: u64,
}

impl TileLimits {
    pub fn contains(&self, column: u64, row: u64) -> bool {
        self.min_row <= row && row <= self.max_row && self.min_col <= column && column <= self.max_col
    }
}

/// Storage block of a level.
///
/// FILE levels use `image_directory`/`path_depth`/`mask_directory`; object
/// levels use `image_prefix`/`mask_prefix` with `pool_name` (CEPH) or
/// `bucket_name` (S3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelStorage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_directory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_depth: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_directory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_prefix: Option<String>,
}

impl LevelStorage {
    /// Whether the level declares mask slabs.
    pub fn has_masks(&self) -> bool {
        self.mask_directory.is_some() || self.mask_prefix.is_some()
    }
}
