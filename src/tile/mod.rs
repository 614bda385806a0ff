//! Tile formats, decoding and extraction.
//!
//! [`TileExtractor`] locates a tile in its slab and reads its bytes;
//! [`raster`] and [`mvt`] decode them according to the pyramid's
//! [`TileFormat`].

mod extractor;
mod format;
pub mod mvt;
pub mod raster;

pub use extractor::TileExtractor;
pub use format::{PyramidType, SampleType, TileFormat};
pub use mvt::{Geometry, PropertyValue, VectorFeature, VectorLayer, VectorTile};
pub use raster::{RasterData, RasterTile};
