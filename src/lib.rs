//! # ROK4 core
//!
//! Storage access and tile extraction for ROK4 tile pyramids.
//!
//! A pyramid is a multi-resolution set of tile grids. Tiles are packed by
//! blocks into binary slabs, each carrying an index that locates any tile
//! without scanning the slab. Slabs, descriptors and list files may live on a
//! local filesystem, in S3 buckets (several clusters at once), in CEPH pools or
//! behind HTTP(S).
//!
//! ## Architecture
//!
//! - [`storage`] - Backend-polymorphic read, write, copy and link API with a
//!   time-bucketed LRU read cache
//! - [`pyramid`] - Slab addressing, pyramid descriptors, levels and list files
//! - [`tile`] - Tile formats, raster and vector tile decoding, tile extraction
//! - [`config`] - `ROK4_*` environment and CLI configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rok4_core::{Pyramid, Storage, TileExtractor, TmsDirectory};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Arc::new(Storage::from_env()?);
//! let tms = TmsDirectory::from_config(storage.clone())?;
//!
//! let pyramid = Pyramid::from_descriptor(&storage, &tms, "s3://pyramids/SCAN.json").await?;
//! let extractor = TileExtractor::new(storage.clone());
//!
//! if let Some(tile) = extractor.tile_raster(&pyramid, "15", 16558, 11364).await? {
//!     println!("{:?}", tile.shape());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pyramid;
pub mod storage;
pub mod tile;

pub use config::{CephConfig, Cli, Command, S3ClusterConfig, StorageConfig};
pub use error::{PyramidError, StorageError};
pub use pyramid::{
    Level, ListEntry, Pyramid, PyramidStorage, SlabInfos, SlabKind, TileMatrix, TileMatrixSet,
    TileMatrixSetProvider, TmsDirectory,
};
pub use storage::{
    build_path, BackendClients, ReadCache, Storage, StorageKind, StorageLocation,
    SYMLINK_SIGNATURE,
};
pub use tile::{
    PyramidType, RasterData, RasterTile, TileExtractor, TileFormat, VectorTile,
};
