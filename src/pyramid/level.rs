//! Pyramid levels.

use serde_json::Value;

use super::descriptor::{LevelDescriptor, LevelStorage, TileLimits};
use super::model::PyramidStorage;
use super::tms::{BoundingBox, TileMatrix};
use crate::error::PyramidError;
use crate::storage::StorageKind;
use crate::tile::PyramidType;

/// What a level needs to know about its pyramid while being loaded.
pub(crate) struct LevelContext<'a> {
    pub descriptor: &'a str,
    pub storage: &'a mut PyramidStorage,
    pub own_masks: bool,
    pub pyramid_type: PyramidType,
}

/// One resolution step of a pyramid.
///
/// A level only keeps the name of its pyramid; storage and format lookups go
/// through the owning [`Pyramid`](super::Pyramid).
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    id: String,
    pyramid: String,
    tile_limits: TileLimits,
    slab_size: (u32, u32),
    tables: Option<Vec<Value>>,
}

impl Level {
    pub(crate) fn from_descriptor(
        data: &LevelDescriptor,
        pyramid: &str,
        context: LevelContext<'_>,
    ) -> Result<Self, PyramidError> {
        let descriptor = context.descriptor;
        let missing = |key: &str| PyramidError::missing(descriptor, format!("levels[].{}", key));

        let id = data.id.clone().ok_or_else(|| missing("id"))?;
        let tile_limits = data.tile_limits.ok_or_else(|| missing("tile_limits"))?;
        let slab_size = (
            data.tiles_per_width.ok_or_else(|| missing("tiles_per_width"))?,
            data.tiles_per_height.ok_or_else(|| missing("tiles_per_height"))?,
        );
        if slab_size.0 == 0 || slab_size.1 == 0 {
            return Err(PyramidError::Invalid(format!(
                "Pyramid {} owns level {} with an empty slab size",
                descriptor, id
            )));
        }
        let storage = data.storage.as_ref().ok_or_else(|| missing("storage"))?;

        let kind = storage.kind.as_deref().ok_or_else(|| missing("storage.type"))?;
        if kind != context.storage.kind.name() {
            return Err(PyramidError::Invalid(format!(
                "Pyramid {} owns levels using different storage types ({}) than its one ({})",
                context.descriptor, kind, context.storage.kind
            )));
        }

        if context.storage.kind == StorageKind::File {
            let depth = storage.path_depth.ok_or_else(|| missing("storage.path_depth"))?;
            match context.storage.depth {
                Some(current) if current != depth => {
                    return Err(PyramidError::Invalid(format!(
                        "Pyramid {} owns levels with different path depths",
                        context.descriptor
                    )))
                }
                _ => context.storage.depth = Some(depth),
            }
        }

        match (storage.has_masks(), context.own_masks) {
            (true, false) => {
                return Err(PyramidError::Invalid(format!(
                    "Pyramid {} does not define a mask format but level {} define mask storage informations",
                    context.descriptor, id
                )))
            }
            (false, true) => {
                return Err(PyramidError::Invalid(format!(
                    "Pyramid {} define a mask format but level {} does not define mask storage informations",
                    context.descriptor, id
                )))
            }
            _ => {}
        }

        let tables = match context.pyramid_type {
            PyramidType::Vector => Some(data.tables.clone().ok_or_else(|| missing("tables"))?),
            PyramidType::Raster => None,
        };

        Ok(Self {
            id,
            pyramid: pyramid.to_string(),
            tile_limits,
            slab_size,
            tables,
        })
    }

    /// Same level, bound to another pyramid.
    pub(crate) fn rebind(&self, pyramid: &str) -> Self {
        Self {
            pyramid: pyramid.to_string(),
            ..self.clone()
        }
    }

    /// Descriptor entry of the level, as stored by `pyramid`.
    pub(crate) fn to_descriptor(&self, storage: &PyramidStorage, own_masks: bool) -> LevelDescriptor {
        let data_name = |kind: &str| match storage.kind {
            StorageKind::File => format!("{}/{}/{}", self.pyramid, kind, self.id),
            _ => format!("{}/{}_{}", self.pyramid, kind, self.id),
        };

        let mut level_storage = LevelStorage {
            kind: Some(storage.kind.name().to_string()),
            ..LevelStorage::default()
        };

        match storage.kind {
            StorageKind::File => {
                level_storage.image_directory = Some(data_name("DATA"));
                level_storage.path_depth = storage.depth;
                if own_masks {
                    level_storage.mask_directory = Some(data_name("MASK"));
                }
            }
            kind => {
                level_storage.image_prefix = Some(data_name("DATA"));
                if kind == StorageKind::Ceph {
                    level_storage.pool_name = Some(storage.bare_root().to_string());
                } else {
                    level_storage.bucket_name = Some(storage.bare_root().to_string());
                }
                if own_masks {
                    level_storage.mask_prefix = Some(data_name("MASK"));
                }
            }
        }

        LevelDescriptor {
            id: Some(self.id.clone()),
            tiles_per_width: Some(self.slab_size.0),
            tiles_per_height: Some(self.slab_size.1),
            tile_limits: Some(self.tile_limits),
            storage: Some(level_storage),
            tables: self.tables.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the owning pyramid.
    pub fn pyramid(&self) -> &str {
        &self.pyramid
    }

    pub fn tile_limits(&self) -> TileLimits {
        self.tile_limits
    }

    /// Slab width and height, in tiles.
    pub fn slab_size(&self) -> (u32, u32) {
        self.slab_size
    }

    pub fn slab_width(&self) -> u32 {
        self.slab_size.0
    }

    pub fn slab_height(&self) -> u32 {
        self.slab_size.1
    }

    /// Vector tables description, vector pyramids only.
    pub fn tables(&self) -> Option<&[Value]> {
        self.tables.as_deref()
    }

    pub fn is_in_limits(&self, column: u64, row: u64) -> bool {
        self.tile_limits.contains(column, row)
    }

    /// Extent covered by the level's tile limits.
    pub fn bbox(&self, tile_matrix: &TileMatrix) -> BoundingBox {
        let limits = &self.tile_limits;
        let upper_left = tile_matrix.tile_to_bbox(limits.min_col, limits.min_row);
        let lower_right = tile_matrix.tile_to_bbox(limits.max_col, limits.max_row);

        (upper_left.0, lower_right.1, lower_right.2, upper_left.3)
    }

    /// Recompute the tile limits from an extent.
    pub fn set_limits_from_bbox(&mut self, tile_matrix: &TileMatrix, bbox: BoundingBox) {
        let (min_col, min_row, max_col, max_row) = tile_matrix.bbox_to_tiles(bbox);
        self.tile_limits = TileLimits {
            min_col,
            max_row,
            max_col,
            min_row,
        };
    }
}
