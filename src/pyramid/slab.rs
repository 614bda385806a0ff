//! Slab index parsing.
//!
//! A slab starts with a 2048-byte reserved header, followed by two arrays of
//! `N = slab_width * slab_height` little-endian `u32`: the tile offsets, then
//! the tile sizes. A zero size marks an absent tile.
//!
//! ```text
//! [0, 2048)            reserved header
//! [2048, 2048 + 4N)    offsets
//! [2048 + 4N, 2048 + 8N) sizes
//! ```

use crate::error::PyramidError;

/// Size of the reserved slab header.
pub const SLAB_HEADER_SIZE: u64 = 2048;

/// Offsets and sizes of every tile in a slab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlabIndex {
    offsets: Vec<u32>,
    sizes: Vec<u32>,
}

impl SlabIndex {
    /// Byte length of the index for a slab of `tiles` tiles.
    pub fn byte_len(tiles: usize) -> u64 {
        8 * tiles as u64
    }

    /// Parse the index read at [`SLAB_HEADER_SIZE`].
    ///
    /// `subject` names the slab in error messages.
    pub fn parse(data: &[u8], tiles: usize, subject: &str) -> Result<Self, PyramidError> {
        let expected = Self::byte_len(tiles) as usize;
        if data.len() < expected {
            return Err(PyramidError::format(
                "slab index",
                subject,
                format!("{} bytes read, {} expected", data.len(), expected),
            ));
        }

        let read_u32s = |bytes: &[u8]| -> Vec<u32> {
            bytes
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        };

        Ok(Self {
            offsets: read_u32s(&data[..4 * tiles]),
            sizes: read_u32s(&data[4 * tiles..8 * tiles]),
        })
    }

    /// Number of tiles described.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Byte range `(offset, size)` of a tile, `None` if the tile is absent.
    pub fn tile_range(&self, index: usize) -> Option<(u64, u64)> {
        match (self.offsets.get(index), self.sizes.get(index)) {
            (Some(_), Some(0)) | (None, _) | (_, None) => None,
            (Some(offset), Some(size)) => Some((*offset as u64, *size as u64)),
        }
    }
}

/// Linear index of a tile inside its slab.
pub fn tile_index(column: u64, row: u64, slab_width: u32, slab_height: u32) -> usize {
    let relative_column = column % slab_width as u64;
    let relative_row = row % slab_height as u64;
    (relative_row * slab_width as u64 + relative_column) as usize
}
