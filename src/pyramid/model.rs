//! Pyramid model.
//!
//! A [`Pyramid`] is loaded from its JSON descriptor, or derived from another
//! pyramid with a new name and storage. It owns its [`Level`]s, knows where
//! its slabs live and can write its descriptor back.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::addressing::{
    decode_file_slab_path, decode_object_key, encode_file_path, encode_object_key, SlabInfos,
    SlabKind,
};
use super::descriptor::{PyramidDescriptor, RasterSpecifications};
use super::level::{Level, LevelContext};
use super::list::{self, ListEntry};
use super::tms::{BoundingBox, TileMatrix, TileMatrixSet, TileMatrixSetProvider};
use crate::error::PyramidError;
use crate::storage::{build_path, Storage, StorageKind, StorageLocation};
use crate::tile::{PyramidType, TileFormat};

/// Path depth of FILE pyramids when none is given.
pub const DEFAULT_PATH_DEPTH: usize = 2;

/// Mask format written in descriptors of pyramids owning masks.
pub const MASK_FORMAT: &str = "TIFF_ZIP_UINT8";

/// Where a pyramid stores its slabs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyramidStorage {
    pub kind: StorageKind,
    /// Directory, bucket (optionally `bucket@cluster`) or pool
    pub root: String,
    /// Slab path depth, FILE storage only
    pub depth: Option<usize>,
}

impl PyramidStorage {
    /// Root without the `@cluster` suffix.
    pub fn bare_root(&self) -> &str {
        self.root
            .split_once('@')
            .map(|(root, _)| root)
            .unwrap_or(&self.root)
    }
}

/// A multi-resolution tile pyramid.
#[derive(Debug)]
pub struct Pyramid {
    name: String,
    descriptor: String,
    list: String,
    tms: Arc<TileMatrixSet>,
    format: TileFormat,
    storage: PyramidStorage,
    own_masks: bool,
    raster_specifications: Option<RasterSpecifications>,
    levels: HashMap<String, Level>,
    content: OnceCell<Arc<Vec<ListEntry>>>,
    size: OnceCell<u64>,
}

impl Pyramid {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Load a pyramid from its descriptor.
    ///
    /// The pyramid's name is the descriptor's base name without `.json`, and
    /// its storage root is the descriptor's directory, bucket or pool.
    pub async fn from_descriptor(
        storage: &Storage,
        provider: &dyn TileMatrixSetProvider,
        descriptor: &str,
    ) -> Result<Self, PyramidError> {
        let content = storage.read_string(descriptor).await?;
        let data: PyramidDescriptor = serde_json::from_str(&content)
            .map_err(|e| PyramidError::format("JSON", descriptor, e))?;

        let location = StorageLocation::parse(descriptor)?;
        let name = location
            .object
            .strip_suffix(".json")
            .unwrap_or(&location.object)
            .to_string();
        let mut pyramid_storage = PyramidStorage {
            kind: location.kind,
            root: location.container.clone(),
            depth: None,
        };
        let list = build_path(location.kind, &[&location.container, &format!("{}.list", name)]);

        let tms_name = data
            .tile_matrix_set
            .as_deref()
            .ok_or_else(|| PyramidError::missing(descriptor, "tile_matrix_set"))?;
        let tms = provider.tile_matrix_set(tms_name).await?;

        let format: TileFormat = data
            .format
            .as_deref()
            .ok_or_else(|| PyramidError::missing(descriptor, "format"))?
            .parse()?;

        let (raster_specifications, own_masks) = match format.pyramid_type() {
            PyramidType::Raster => (
                Some(
                    data.raster_specifications
                        .clone()
                        .ok_or_else(|| PyramidError::missing(descriptor, "raster_specifications"))?,
                ),
                data.mask_format.is_some(),
            ),
            PyramidType::Vector => (None, false),
        };

        let levels_data = data
            .levels
            .as_ref()
            .ok_or_else(|| PyramidError::missing(descriptor, "levels"))?;

        let mut levels = HashMap::with_capacity(levels_data.len());
        for level_data in levels_data {
            let level = Level::from_descriptor(
                level_data,
                &name,
                LevelContext {
                    descriptor,
                    storage: &mut pyramid_storage,
                    own_masks,
                    pyramid_type: format.pyramid_type(),
                },
            )?;

            if tms.level(level.id()).is_none() {
                return Err(PyramidError::Invalid(format!(
                    "Pyramid {} owns a level with the ID '{}', not defined in the TMS '{}'",
                    descriptor,
                    level.id(),
                    tms.name
                )));
            }

            levels.insert(level.id().to_string(), level);
        }

        if levels.is_empty() {
            return Err(PyramidError::Invalid(format!(
                "Pyramid '{}' has no level",
                descriptor
            )));
        }

        debug!(
            descriptor,
            name = %name,
            format = %format,
            levels = levels.len(),
            "pyramid loaded"
        );

        Ok(Self {
            name,
            descriptor: descriptor.to_string(),
            list,
            tms,
            format,
            storage: pyramid_storage,
            own_masks,
            raster_specifications,
            levels,
            content: OnceCell::new(),
            size: OnceCell::new(),
        })
    }

    /// Same pyramid with a new name and storage.
    ///
    /// FILE pyramid names cannot contain `/`, and FILE storage gets
    /// [`DEFAULT_PATH_DEPTH`] when no depth is given.
    pub fn from_other(
        other: &Pyramid,
        name: &str,
        mut storage: PyramidStorage,
    ) -> Result<Self, PyramidError> {
        if storage.kind == StorageKind::File {
            if name.contains('/') {
                return Err(PyramidError::Invalid(format!(
                    "A FILE stored pyramid's name cannot contain '/' : '{}'",
                    name
                )));
            }
            storage.depth.get_or_insert(DEFAULT_PATH_DEPTH);
        } else {
            storage.depth = None;
        }

        let descriptor = build_path(storage.kind, &[&storage.root, &format!("{}.json", name)]);
        let list = build_path(storage.kind, &[&storage.root, &format!("{}.list", name)]);

        let levels = other
            .levels
            .iter()
            .map(|(id, level)| (id.clone(), level.rebind(name)))
            .collect();

        Ok(Self {
            name: name.to_string(),
            descriptor,
            list,
            tms: other.tms.clone(),
            format: other.format,
            storage,
            own_masks: other.own_masks,
            raster_specifications: other.raster_specifications.clone(),
            levels,
            content: OnceCell::new(),
            size: OnceCell::new(),
        })
    }

    // =========================================================================
    // Descriptor
    // =========================================================================

    /// Descriptor content, levels from the coarsest to the finest.
    pub fn serializable(&self) -> PyramidDescriptor {
        let mut levels: Vec<&Level> = self.levels.values().collect();
        levels.sort_by(|a, b| self.resolution(b).total_cmp(&self.resolution(a)));

        PyramidDescriptor {
            tile_matrix_set: Some(self.tms.name.clone()),
            format: Some(self.format.name().to_string()),
            levels: Some(
                levels
                    .into_iter()
                    .map(|l| l.to_descriptor(&self.storage, self.own_masks))
                    .collect(),
            ),
            raster_specifications: self.raster_specifications.clone(),
            mask_format: self.own_masks.then(|| MASK_FORMAT.to_string()),
        }
    }

    /// Write the descriptor to [`Pyramid::descriptor`].
    pub async fn write_descriptor(&self, storage: &Storage) -> Result<(), PyramidError> {
        let content = serde_json::to_string(&self.serializable())
            .map_err(|e| PyramidError::format("JSON", &self.descriptor, e))?;
        storage.write_string(&self.descriptor, &content).await?;

        info!(descriptor = %self.descriptor, "pyramid descriptor written");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptor path.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// List file path.
    pub fn list(&self) -> &str {
        &self.list
    }

    pub fn tms(&self) -> &TileMatrixSet {
        &self.tms
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    pub fn pyramid_type(&self) -> PyramidType {
        self.format.pyramid_type()
    }

    pub fn tile_extension(&self) -> &'static str {
        self.format.extension()
    }

    pub fn storage(&self) -> &PyramidStorage {
        &self.storage
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.storage.kind
    }

    /// Storage root without the S3 cluster suffix.
    pub fn storage_root(&self) -> &str {
        self.storage.bare_root()
    }

    /// S3 cluster host named by the storage root, if any.
    pub fn storage_s3_cluster(&self) -> Option<&str> {
        if self.storage.kind != StorageKind::S3 {
            return None;
        }
        self.storage.root.split_once('@').map(|(_, cluster)| cluster)
    }

    pub fn storage_depth(&self) -> Option<usize> {
        self.storage.depth
    }

    pub fn own_masks(&self) -> bool {
        self.own_masks
    }

    pub fn raster_specifications(&self) -> Option<&RasterSpecifications> {
        self.raster_specifications.as_ref()
    }

    /// Number of channels of raster tiles.
    pub fn channels(&self) -> Option<u32> {
        self.raster_specifications.as_ref().map(|s| s.channels)
    }

    // =========================================================================
    // Levels
    // =========================================================================

    pub fn level(&self, id: &str) -> Option<&Level> {
        self.levels.get(id)
    }

    pub fn levels(&self) -> impl Iterator<Item = &Level> {
        self.levels.values()
    }

    /// Tile matrix of a level.
    pub fn tile_matrix(&self, level: &str) -> Result<&TileMatrix, PyramidError> {
        self.tms
            .level(level)
            .ok_or_else(|| PyramidError::UnknownLevel(level.to_string()))
    }

    fn resolution(&self, level: &Level) -> f64 {
        self.tms
            .level(level.id())
            .map(|tm| tm.resolution)
            .unwrap_or(f64::INFINITY)
    }

    fn sorted_levels(&self) -> Vec<&Level> {
        let mut levels: Vec<&Level> = self.levels.values().collect();
        levels.sort_by(|a, b| self.resolution(a).total_cmp(&self.resolution(b)));
        levels
    }

    /// Finest level.
    pub fn bottom_level(&self) -> Option<&Level> {
        self.sorted_levels().first().copied()
    }

    /// Coarsest level.
    pub fn top_level(&self) -> Option<&Level> {
        self.sorted_levels().last().copied()
    }

    /// Levels from `bottom` up to `top` included, finest first.
    ///
    /// Missing bounds default to the pyramid's extreme levels.
    pub fn levels_between(
        &self,
        bottom: Option<&str>,
        top: Option<&str>,
    ) -> Result<Vec<&Level>, PyramidError> {
        for id in [bottom, top].into_iter().flatten() {
            if !self.levels.contains_key(id) {
                return Err(PyramidError::UnknownLevel(id.to_string()));
            }
        }

        let sorted = self.sorted_levels();
        let start = bottom
            .and_then(|id| sorted.iter().position(|l| l.id() == id))
            .unwrap_or(0);
        let end = top
            .and_then(|id| sorted.iter().position(|l| l.id() == id))
            .unwrap_or(sorted.len().saturating_sub(1));

        if start > end {
            return Err(PyramidError::Invalid(format!(
                "Provided levels ids are not consistent to extract levels from the pyramid {}",
                self.name
            )));
        }

        Ok(sorted[start..=end].to_vec())
    }

    /// Tile and pixel indices of a point, in the pyramid's coordinates system.
    ///
    /// Returns `(level, column, row, pixel column, pixel row)`, computed in
    /// `level` or in the bottom level when `None`.
    pub fn tile_indices(
        &self,
        x: f64,
        y: f64,
        level: Option<&str>,
    ) -> Result<(&str, u64, u64, u32, u32), PyramidError> {
        let level = match level {
            Some(id) => self
                .level(id)
                .ok_or_else(|| PyramidError::UnknownLevel(id.to_string()))?,
            None => self.bottom_level().ok_or_else(|| {
                PyramidError::Invalid(format!("Pyramid {} has no level", self.name))
            })?,
        };

        let (column, row, pixel_column, pixel_row) =
            self.tile_matrix(level.id())?.point_to_indices(x, y);
        Ok((level.id(), column, row, pixel_column, pixel_row))
    }

    /// Extent of a level's tile limits.
    pub fn level_bbox(&self, level: &str) -> Result<BoundingBox, PyramidError> {
        let tile_matrix = self.tile_matrix(level)?;
        let level = self
            .level(level)
            .ok_or_else(|| PyramidError::UnknownLevel(level.to_string()))?;
        Ok(level.bbox(tile_matrix))
    }

    /// Recompute a level's tile limits from an extent.
    pub fn set_level_limits_from_bbox(
        &mut self,
        level: &str,
        bbox: BoundingBox,
    ) -> Result<(), PyramidError> {
        let tile_matrix = self
            .tms
            .level(level)
            .ok_or_else(|| PyramidError::UnknownLevel(level.to_string()))?;
        let level = self
            .levels
            .get_mut(level)
            .ok_or_else(|| PyramidError::UnknownLevel(level.to_string()))?;

        level.set_limits_from_bbox(tile_matrix, bbox);
        Ok(())
    }

    // =========================================================================
    // Slabs
    // =========================================================================

    /// Storage path of a slab, relative to the pyramid unless `full`.
    ///
    /// `column` and `row` are slab indices, not tile indices.
    pub fn slab_path(&self, kind: SlabKind, level: &str, column: u64, row: u64, full: bool) -> String {
        let slab = match self.storage.kind {
            StorageKind::File => format!(
                "{}/{}/{}",
                kind,
                level,
                encode_file_path(column, row, self.depth())
            ),
            _ => encode_object_key(kind, level, column, row),
        };

        if full {
            build_path(self.storage.kind, &[&self.storage.root, &self.name, &slab])
        } else {
            slab
        }
    }

    /// Slab indices from a slab storage path.
    pub fn slab_infos_from_path(&self, path: &str) -> Result<SlabInfos, PyramidError> {
        match self.storage.kind {
            StorageKind::File => decode_file_slab_path(path, self.depth()),
            _ => decode_object_key(path),
        }
    }

    fn depth(&self) -> usize {
        self.storage.depth.unwrap_or(DEFAULT_PATH_DEPTH)
    }

    // =========================================================================
    // Content
    // =========================================================================

    /// Parse the list file.
    pub async fn list_entries(&self, storage: &Storage) -> Result<Vec<ListEntry>, PyramidError> {
        let content = storage.read_string(&self.list).await?;
        list::parse(&content, &self.list, self.storage_s3_cluster(), |path| {
            self.slab_infos_from_path(path)
        })
    }

    /// List file content, parsed once for the pyramid's lifetime.
    pub async fn load_list(&self, storage: &Storage) -> Result<Arc<Vec<ListEntry>>, PyramidError> {
        self.content
            .get_or_try_init(|| async { self.list_entries(storage).await.map(Arc::new) })
            .await
            .cloned()
    }

    /// Total size of the pyramid's own slabs, computed once.
    pub async fn size(&self, storage: &Storage) -> Result<u64, PyramidError> {
        let path = build_path(self.storage.kind, &[&self.storage.root, &self.name]);
        let size = self
            .size
            .get_or_try_init(|| async { storage.size_path(&path).await })
            .await?;
        Ok(*size)
    }
}
