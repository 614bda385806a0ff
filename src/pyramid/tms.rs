//! Tile matrix sets.
//!
//! A tile matrix set is the multi-level grid a pyramid is built on. Pyramids
//! only need a narrow view of it: per level, the resolution, origin, tile size
//! and matrix size, plus conversions between coordinates and tile indices.
//! Grids are fetched through a [`TileMatrixSetProvider`]; [`TmsDirectory`]
//! reads `<directory>/<name>.json` through the storage layer.
//!
//! Only X/Y and Lon/Lat ordered grids are handled, and coordinates are always
//! taken in the grid's own coordinate system.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::PyramidError;
use crate::storage::Storage;

/// Terrain extent `(xmin, ymin, xmax, ymax)`.
pub type BoundingBox = (f64, f64, f64, f64);

// =============================================================================
// JSON schema
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TileMatrixSetJson {
    id: Option<String>,
    crs: Option<String>,
    tile_matrices: Option<Vec<TileMatrixJson>>,
    ordered_axes: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TileMatrixJson {
    id: Option<String>,
    cell_size: Option<f64>,
    point_of_origin: Option<[f64; 2]>,
    tile_width: Option<u32>,
    tile_height: Option<u32>,
    matrix_width: Option<u64>,
    matrix_height: Option<u64>,
}

// =============================================================================
// Tile Matrix
// =============================================================================

/// One level of a tile matrix set.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMatrix {
    pub id: String,
    /// Ground size of a pixel
    pub resolution: f64,
    /// Upper left corner of the grid
    pub origin: (f64, f64),
    /// Tile width and height, in pixels
    pub tile_size: (u32, u32),
    /// Number of tiles, widthwise and heightwise
    pub matrix_size: (u64, u64),
}

impl TileMatrix {
    pub fn tile_width(&self) -> u32 {
        self.tile_size.0
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_size.1
    }

    /// Tile column containing west-east coordinate `x`.
    pub fn x_to_column(&self, x: f64) -> u64 {
        let column = (x - self.origin.0) / (self.resolution * self.tile_size.0 as f64);
        column.max(0.0) as u64
    }

    /// Tile row containing north-south coordinate `y`.
    pub fn y_to_row(&self, y: f64) -> u64 {
        let row = (self.origin.1 - y) / (self.resolution * self.tile_size.1 as f64);
        row.max(0.0) as u64
    }

    /// Tile and in-tile pixel indices `(column, row, pixel column, pixel row)` of a point.
    pub fn point_to_indices(&self, x: f64, y: f64) -> (u64, u64, u32, u32) {
        let pixel_column = ((x - self.origin.0) / self.resolution).max(0.0) as u64;
        let pixel_row = ((self.origin.1 - y) / self.resolution).max(0.0) as u64;
        let (width, height) = (self.tile_size.0 as u64, self.tile_size.1 as u64);

        (
            pixel_column / width,
            pixel_row / height,
            (pixel_column % width) as u32,
            (pixel_row % height) as u32,
        )
    }

    /// Extent of a tile.
    pub fn tile_to_bbox(&self, column: u64, row: u64) -> BoundingBox {
        let width = self.resolution * self.tile_size.0 as f64;
        let height = self.resolution * self.tile_size.1 as f64;

        (
            self.origin.0 + width * column as f64,
            self.origin.1 - height * (row + 1) as f64,
            self.origin.0 + width * (column + 1) as f64,
            self.origin.1 - height * row as f64,
        )
    }

    /// Extreme tiles `(min_col, min_row, max_col, max_row)` covering a bounding box.
    pub fn bbox_to_tiles(&self, bbox: BoundingBox) -> (u64, u64, u64, u64) {
        (
            self.x_to_column(bbox.0),
            self.y_to_row(bbox.3),
            self.x_to_column(bbox.2),
            self.y_to_row(bbox.1),
        )
    }
}

// =============================================================================
// Tile Matrix Set
// =============================================================================

/// A multi-level grid.
#[derive(Debug, Clone)]
pub struct TileMatrixSet {
    pub name: String,
    /// Where the definition was read from
    pub path: String,
    pub id: String,
    pub srs: String,
    levels: HashMap<String, TileMatrix>,
}

impl TileMatrixSet {
    /// Parse a tile matrix set definition.
    pub fn from_json(name: &str, path: &str, content: &str) -> Result<Self, PyramidError> {
        let data: TileMatrixSetJson =
            serde_json::from_str(content).map_err(|e| PyramidError::format("JSON", path, e))?;

        let id = data.id.ok_or_else(|| PyramidError::missing(path, "id"))?;
        let srs = data.crs.ok_or_else(|| PyramidError::missing(path, "crs"))?;
        let matrices = data
            .tile_matrices
            .ok_or_else(|| PyramidError::missing(path, "tileMatrices"))?;
        let axes = data
            .ordered_axes
            .ok_or_else(|| PyramidError::missing(path, "orderedAxes"))?;

        let mut levels = HashMap::with_capacity(matrices.len());
        for matrix in matrices {
            let level = Self::parse_level(path, matrix)?;
            levels.insert(level.id.clone(), level);
        }

        if levels.is_empty() {
            return Err(PyramidError::Invalid(format!("TMS '{}' has no level", path)));
        }

        if axes != ["X", "Y"] && axes != ["Lon", "Lat"] {
            return Err(PyramidError::Invalid(format!(
                "TMS '{}' own invalid axes order: only X/Y or Lon/Lat are handled",
                path
            )));
        }

        Ok(Self {
            name: name.to_string(),
            path: path.to_string(),
            id,
            srs,
            levels,
        })
    }

    fn parse_level(path: &str, matrix: TileMatrixJson) -> Result<TileMatrix, PyramidError> {
        let missing = |key: &str| PyramidError::missing(path, format!("tileMatrices[].{}", key));

        let id = matrix.id.ok_or_else(|| missing("id"))?;
        if id.contains('_') {
            return Err(PyramidError::Invalid(format!(
                "TMS {} owns a level whom id contains an underscore ({})",
                path, id
            )));
        }

        Ok(TileMatrix {
            id,
            resolution: matrix.cell_size.ok_or_else(|| missing("cellSize"))?,
            origin: matrix
                .point_of_origin
                .map(|[x, y]| (x, y))
                .ok_or_else(|| missing("pointOfOrigin"))?,
            tile_size: (
                matrix.tile_width.ok_or_else(|| missing("tileWidth"))?,
                matrix.tile_height.ok_or_else(|| missing("tileHeight"))?,
            ),
            matrix_size: (
                matrix.matrix_width.ok_or_else(|| missing("matrixWidth"))?,
                matrix.matrix_height.ok_or_else(|| missing("matrixHeight"))?,
            ),
        })
    }

    pub fn level(&self, id: &str) -> Option<&TileMatrix> {
        self.levels.get(id)
    }

    /// Levels from the finest to the coarsest resolution.
    pub fn sorted_levels(&self) -> Vec<&TileMatrix> {
        let mut levels: Vec<&TileMatrix> = self.levels.values().collect();
        levels.sort_by(|a, b| a.resolution.total_cmp(&b.resolution));
        levels
    }
}

// =============================================================================
// Providers
// =============================================================================

/// Source of tile matrix sets, by name.
#[async_trait]
pub trait TileMatrixSetProvider: Send + Sync {
    async fn tile_matrix_set(&self, name: &str) -> Result<Arc<TileMatrixSet>, PyramidError>;
}

/// Tile matrix sets stored as `<directory>/<name>.json`, on any backend.
///
/// Parsed sets are kept for the provider's lifetime.
pub struct TmsDirectory {
    storage: Arc<Storage>,
    directory: String,
    loaded: RwLock<HashMap<String, Arc<TileMatrixSet>>>,
}

impl TmsDirectory {
    pub fn new(storage: Arc<Storage>, directory: impl Into<String>) -> Self {
        Self {
            storage,
            directory: directory.into(),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// Provider on `ROK4_TMS_DIRECTORY`.
    pub fn from_config(storage: Arc<Storage>) -> Result<Self, PyramidError> {
        let directory = storage.config().tms_directory()?.to_string();
        Ok(Self::new(storage, directory))
    }

    fn path(&self, name: &str) -> String {
        format!("{}/{}.json", self.directory.trim_end_matches('/'), name)
    }
}

#[async_trait]
impl TileMatrixSetProvider for TmsDirectory {
    async fn tile_matrix_set(&self, name: &str) -> Result<Arc<TileMatrixSet>, PyramidError> {
        if let Some(tms) = self.loaded.read().await.get(name) {
            return Ok(tms.clone());
        }

        let path = self.path(name);
        debug!(name, path = %path, "loading tile matrix set");

        let content = self.storage.read_string(&path).await?;
        let tms = Arc::new(TileMatrixSet::from_json(name, &path, &content)?);

        self.loaded
            .write()
            .await
            .insert(name.to_string(), tms.clone());
        Ok(tms)
    }
}
