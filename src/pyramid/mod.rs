//! Pyramids and slab addressing.
//!
//! - [`addressing`]: slab indices to storage names and back
//! - [`slab`]: slab index parsing
//! - [`descriptor`]: descriptor JSON schema
//! - [`tms`]: tile matrix sets the pyramids are built on
//! - [`Level`] and [`Pyramid`]: in-memory pyramid model
//! - [`list`]: pyramid list files

pub mod addressing;
pub mod descriptor;
mod level;
pub mod list;
mod model;
pub mod slab;
pub mod tms;

pub use addressing::{SlabInfos, SlabKind};
pub use descriptor::{LevelDescriptor, LevelStorage, PyramidDescriptor, RasterSpecifications, TileLimits};
pub use level::Level;
pub use list::ListEntry;
pub use model::{Pyramid, PyramidStorage, DEFAULT_PATH_DEPTH, MASK_FORMAT};
pub use slab::{tile_index, SlabIndex, SLAB_HEADER_SIZE};
pub use tms::{BoundingBox, TileMatrix, TileMatrixSet, TileMatrixSetProvider, TmsDirectory};
