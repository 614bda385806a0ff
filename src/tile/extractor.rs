//! Tile extraction from slabs.
//!
//! A tile is read in two ranged reads on its slab: the index stored after the
//! slab header, then the tile bytes it points to. Both go through the storage
//! read cache, so the index of a slab is fetched once for all its tiles.
//!
//! A missing slab, a tile outside the level's limits or an empty index entry
//! are sparse pyramid holes: they yield `None`, never an error.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use super::mvt::{self, VectorTile};
use super::raster::{self, RasterTile};
use super::PyramidType;
use crate::error::PyramidError;
use crate::pyramid::{tile_index, Pyramid, SlabIndex, SlabKind, SLAB_HEADER_SIZE};
use crate::storage::Storage;

/// Reads tiles out of pyramid slabs.
#[derive(Clone)]
pub struct TileExtractor {
    storage: Arc<Storage>,
}

impl TileExtractor {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Undecoded tile bytes, `None` for a sparse hole.
    pub async fn tile_binary(
        &self,
        pyramid: &Pyramid,
        level: &str,
        column: u64,
        row: u64,
    ) -> Result<Option<Bytes>, PyramidError> {
        let level_object = pyramid
            .level(level)
            .ok_or_else(|| PyramidError::UnknownLevel(level.to_string()))?;

        let (slab_width, slab_height) = level_object.slab_size();
        if slab_width == 1 && slab_height == 1 {
            return Err(PyramidError::NotImplemented(
                "One-tile slab pyramid is not handled".to_string(),
            ));
        }

        if !level_object.is_in_limits(column, row) {
            debug!(level, column, row, "tile outside level limits");
            return Ok(None);
        }

        let slab_path = pyramid.slab_path(
            SlabKind::Data,
            level,
            column / slab_width as u64,
            row / slab_height as u64,
            true,
        );
        let tiles = slab_width as usize * slab_height as usize;

        let index_data = match self
            .storage
            .read_range(&slab_path, SLAB_HEADER_SIZE, SlabIndex::byte_len(tiles))
            .await
        {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                debug!(slab = %slab_path, "slab not found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let index = SlabIndex::parse(&index_data, tiles, &slab_path)?;
        let Some((offset, size)) = index.tile_range(tile_index(column, row, slab_width, slab_height))
        else {
            debug!(slab = %slab_path, column, row, "empty tile");
            return Ok(None);
        };

        let data = self.storage.read_range(&slab_path, offset, size).await?;
        Ok(Some(data))
    }

    /// Decoded raster tile, `None` for a sparse hole.
    pub async fn tile_raster(
        &self,
        pyramid: &Pyramid,
        level: &str,
        column: u64,
        row: u64,
    ) -> Result<Option<RasterTile>, PyramidError> {
        if pyramid.pyramid_type() != PyramidType::Raster {
            return Err(PyramidError::Invalid(format!(
                "Cannot get tile as raster data: it's a {} pyramid",
                pyramid.pyramid_type()
            )));
        }

        let Some(data) = self.tile_binary(pyramid, level, column, row).await? else {
            return Ok(None);
        };

        let tile_matrix = pyramid.tile_matrix(level)?;
        let channels = pyramid.channels().ok_or_else(|| {
            PyramidError::missing(pyramid.descriptor(), "raster_specifications")
        })?;

        raster::decode(
            pyramid.format(),
            &data,
            tile_matrix.tile_width(),
            tile_matrix.tile_height(),
            channels,
        )
        .map(Some)
    }

    /// Decoded vector tile, `None` for a sparse hole.
    pub async fn tile_vector(
        &self,
        pyramid: &Pyramid,
        level: &str,
        column: u64,
        row: u64,
    ) -> Result<Option<VectorTile>, PyramidError> {
        if pyramid.pyramid_type() != PyramidType::Vector {
            return Err(PyramidError::Invalid(format!(
                "Cannot get tile as vector data: it's a {} pyramid",
                pyramid.pyramid_type()
            )));
        }

        let Some(data) = self.tile_binary(pyramid, level, column, row).await? else {
            return Ok(None);
        };

        let subject = format!("{}/{}/{}/{}", pyramid.name(), level, column, row);
        mvt::decode(&data, &subject).map(Some)
    }
}
