//! Test utilities for integration tests.
//!
//! This module provides an in-memory CEPH backend, a static tile matrix set
//! provider, and helpers building slabs, descriptors and tiles.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use prost::Message;
use rok4_core::error::{PyramidError, StorageError};
use rok4_core::pyramid::SLAB_HEADER_SIZE;
use rok4_core::storage::{BackendClients, CephConnector, CephPool};
use rok4_core::tile::mvt::proto;
use rok4_core::{Storage, StorageConfig, TileMatrixSet, TileMatrixSetProvider};

// =============================================================================
// In-memory CEPH
// =============================================================================

/// A CEPH pool kept in memory, counting reads.
#[derive(Default)]
pub struct MemoryPool {
    name: String,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryPool {
    pub fn object(&self, name: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    pub fn put(&self, name: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(name.to_string(), data);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn not_found(&self, object: &str) -> StorageError {
        StorageError::NotFound(format!("ceph://{}/{}", self.name, object))
    }
}

impl CephPool for MemoryPool {
    fn stat(&self, object: &str) -> Result<u64, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(object)
            .map(|data| data.len() as u64)
            .ok_or_else(|| self.not_found(object))
    }

    fn read(&self, object: &str, len: usize, offset: u64) -> Result<Vec<u8>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().unwrap();
        let data = objects.get(object).ok_or_else(|| self.not_found(object))?;

        let start = (offset as usize).min(data.len());
        let end = start.saturating_add(len).min(data.len());
        Ok(data[start..end].to_vec())
    }

    fn write(&self, object: &str, data: &[u8], offset: u64) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.objects.lock().unwrap();
        let content = objects.entry(object.to_string()).or_default();

        let end = offset as usize + data.len();
        if content.len() < end {
            content.resize(end, 0);
        }
        content[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn write_full(&self, object: &str, data: &[u8]) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.put(object, data.to_vec());
        Ok(())
    }

    fn remove(&self, object: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .unwrap()
            .remove(object)
            .map(|_| ())
            .ok_or_else(|| self.not_found(object))
    }
}

/// A CEPH cluster of in-memory pools, created on first open.
#[derive(Default)]
pub struct MemoryCeph {
    pools: Mutex<HashMap<String, Arc<MemoryPool>>>,
    opened: AtomicUsize,
}

impl MemoryCeph {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pool(&self, name: &str) -> Arc<MemoryPool> {
        self.pools
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryPool {
                    name: name.to_string(),
                    ..MemoryPool::default()
                })
            })
            .clone()
    }

    /// Number of pool contexts handed out.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl CephConnector for MemoryCeph {
    fn open_pool(&self, pool: &str) -> Result<Arc<dyn CephPool>, StorageError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.pool(pool))
    }
}

/// Storage whose CEPH backend is `ceph`.
pub fn ceph_storage(ceph: Arc<MemoryCeph>, config: StorageConfig) -> Storage {
    Storage::with_clients(BackendClients::new(config).with_ceph_connector(ceph))
}

/// `file://` URI of a file in a temporary directory.
pub fn file_uri(dir: &tempfile::TempDir, name: &str) -> String {
    format!("file://{}", dir.path().join(name).display())
}

// =============================================================================
// Tile Matrix Sets
// =============================================================================

/// Tile matrix set `TEST`: 4x4 pixel tiles, level "0" at 1m, "1" at 2m.
pub const TEST_TMS: &str = r#"{
    "id": "TEST",
    "crs": "EPSG:2154",
    "orderedAxes": ["X", "Y"],
    "tileMatrices": [
        {"id": "0", "cellSize": 1.0, "pointOfOrigin": [0.0, 64.0],
         "tileWidth": 4, "tileHeight": 4, "matrixWidth": 16, "matrixHeight": 16},
        {"id": "1", "cellSize": 2.0, "pointOfOrigin": [0.0, 64.0],
         "tileWidth": 4, "tileHeight": 4, "matrixWidth": 8, "matrixHeight": 8}
    ]
}"#;

/// Provider serving [`TEST_TMS`] under any name, counting requests.
#[derive(Default)]
pub struct StaticTms {
    requests: AtomicUsize,
}

impl StaticTms {
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TileMatrixSetProvider for StaticTms {
    async fn tile_matrix_set(&self, name: &str) -> Result<Arc<TileMatrixSet>, PyramidError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(TileMatrixSet::from_json(
            name,
            &format!("{}.json", name),
            TEST_TMS,
        )?))
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// Level "0" covering tiles 0..=7 in both directions.
pub fn level_json(slab_size: (u32, u32), storage: Value) -> Value {
    json!({
        "id": "0",
        "tiles_per_width": slab_size.0,
        "tiles_per_height": slab_size.1,
        "tile_limits": {"min_col": 0, "max_row": 7, "max_col": 7, "min_row": 0},
        "storage": storage
    })
}

pub fn file_level_storage(name: &str) -> Value {
    json!({"type": "FILE", "image_directory": format!("{}/DATA/0", name), "path_depth": 2})
}

pub fn ceph_level_storage(name: &str, pool: &str) -> Value {
    json!({"type": "CEPH", "image_prefix": format!("{}/DATA_0", name), "pool_name": pool})
}

/// Raster pyramid descriptor with one level.
pub fn raster_descriptor(format: &str, channels: u32, level: Value) -> String {
    json!({
        "tile_matrix_set": "TEST",
        "format": format,
        "raster_specifications": {
            "channels": channels,
            "nodata": "0",
            "photometric": "gray",
            "interpolation": "nn"
        },
        "levels": [level]
    })
    .to_string()
}

/// Vector pyramid descriptor with one level.
pub fn vector_descriptor(mut level: Value) -> String {
    level["tables"] = json!([{"name": "roads", "geometry": "LINESTRING", "attributes": []}]);
    json!({
        "tile_matrix_set": "TEST",
        "format": "TIFF_PBF_MVT",
        "levels": [level]
    })
    .to_string()
}

// =============================================================================
// Slabs and tiles
// =============================================================================

/// Build a slab of `width x height` tiles; absent tiles get a zero size.
pub fn build_slab(width: u32, height: u32, tiles: &[(usize, Vec<u8>)]) -> Vec<u8> {
    let count = (width * height) as usize;
    let mut offsets = vec![0u32; count];
    let mut sizes = vec![0u32; count];

    let mut data = Vec::new();
    let mut cursor = SLAB_HEADER_SIZE as usize + 8 * count;
    for (index, tile) in tiles {
        offsets[*index] = cursor as u32;
        sizes[*index] = tile.len() as u32;
        data.extend_from_slice(tile);
        cursor += tile.len();
    }

    let mut slab = vec![0u8; SLAB_HEADER_SIZE as usize];
    slab.extend(offsets.iter().flat_map(|v| v.to_le_bytes()));
    slab.extend(sizes.iter().flat_map(|v| v.to_le_bytes()));
    slab.extend(data);
    slab
}

/// A 4x4 single-channel raw tile filled with `value`.
pub fn raw_tile(value: u8) -> Vec<u8> {
    vec![value; 16]
}

/// A solid-color JPEG tile.
pub fn jpeg_tile(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |_, _| Rgb(color));
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 95)
        .encode_image(&img)
        .unwrap();
    buf
}

/// A vector tile with one `roads` layer holding a single point.
pub fn mvt_tile(x: u32, y: u32) -> Vec<u8> {
    let zigzag = |v: u32| v << 1;
    proto::Tile {
        layers: vec![proto::Layer {
            version: 2,
            name: "roads".to_string(),
            features: vec![proto::Feature {
                id: Some(42),
                tags: vec![0, 0],
                r#type: Some(proto::GeomType::Point as i32),
                geometry: vec![(1 << 3) | 1, zigzag(x), zigzag(y)],
            }],
            keys: vec!["name".to_string()],
            values: vec![proto::Value {
                string_value: Some("N7".to_string()),
                ..Default::default()
            }],
            extent: Some(4096),
        }],
    }
    .encode_to_vec()
}
