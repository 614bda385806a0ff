//! Integration tests for tile extraction from slabs.

use std::sync::Arc;

use super::test_utils::{
    build_slab, ceph_level_storage, ceph_storage, file_level_storage, file_uri, jpeg_tile,
    level_json, mvt_tile, raster_descriptor, raw_tile, vector_descriptor, MemoryCeph, StaticTms,
};
use rok4_core::error::PyramidError;
use rok4_core::tile::{Geometry, PropertyValue};
use rok4_core::{Pyramid, RasterData, SlabKind, Storage, StorageConfig, TileExtractor};
use tempfile::TempDir;

/// FILE raster pyramid with 2x2 slabs of 4x4 tiles.
async fn raster_pyramid(dir: &TempDir, storage: &Storage, format: &str, channels: u32) -> Pyramid {
    let descriptor = file_uri(dir, "SCAN.json");
    storage
        .write_string(
            &descriptor,
            &raster_descriptor(format, channels, level_json((2, 2), file_level_storage("SCAN"))),
        )
        .await
        .unwrap();

    Pyramid::from_descriptor(storage, &StaticTms::default(), &descriptor)
        .await
        .unwrap()
}

/// Slab (0, 0) holds tiles (0, 0) and (1, 1); tile (1, 0) is empty.
async fn write_raw_slab(storage: &Storage, pyramid: &Pyramid) {
    let slab = build_slab(2, 2, &[(0, raw_tile(10)), (3, raw_tile(40))]);
    storage
        .write_all(&pyramid.slab_path(SlabKind::Data, "0", 0, 0, true), slab)
        .await
        .unwrap();
}

// =============================================================================
// Raster tiles
// =============================================================================

#[tokio::test]
async fn test_raw_tiles() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(Storage::new(StorageConfig::default()));
    let pyramid = raster_pyramid(&dir, &storage, "TIFF_RAW_UINT8", 1).await;
    write_raw_slab(&storage, &pyramid).await;

    let extractor = TileExtractor::new(storage.clone());

    let tile = extractor.tile_raster(&pyramid, "0", 0, 0).await.unwrap().unwrap();
    assert_eq!(tile.shape(), (4, 4, 1));
    assert_eq!(tile.data, RasterData::UInt8(vec![10; 16]));

    let tile = extractor.tile_raster(&pyramid, "0", 1, 1).await.unwrap().unwrap();
    assert_eq!(tile.sample(3, 3, 0), Some(40.0));

    let binary = extractor.tile_binary(&pyramid, "0", 1, 1).await.unwrap().unwrap();
    assert_eq!(binary.as_ref(), raw_tile(40).as_slice());
}

#[tokio::test]
async fn test_sparse_tiles() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(Storage::new(StorageConfig::default()));
    let pyramid = raster_pyramid(&dir, &storage, "TIFF_RAW_UINT8", 1).await;
    write_raw_slab(&storage, &pyramid).await;

    let extractor = TileExtractor::new(storage.clone());

    // Zero size in the slab index
    assert!(extractor.tile_raster(&pyramid, "0", 1, 0).await.unwrap().is_none());
    // Slab (1, 0) does not exist
    assert!(extractor.tile_raster(&pyramid, "0", 2, 0).await.unwrap().is_none());
    // Outside the level's tile limits
    assert!(extractor.tile_raster(&pyramid, "0", 9, 0).await.unwrap().is_none());
    assert!(extractor.tile_binary(&pyramid, "0", 0, 12).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_level() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(Storage::new(StorageConfig::default()));
    let pyramid = raster_pyramid(&dir, &storage, "TIFF_RAW_UINT8", 1).await;

    let err = TileExtractor::new(storage.clone())
        .tile_raster(&pyramid, "1", 0, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, PyramidError::UnknownLevel(ref id) if id == "1"));
}

#[tokio::test]
async fn test_single_tile_slabs_not_handled() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(Storage::new(StorageConfig::default()));
    let descriptor = file_uri(&dir, "SINGLE.json");
    storage
        .write_string(
            &descriptor,
            &raster_descriptor("TIFF_RAW_UINT8", 1, level_json((1, 1), file_level_storage("SINGLE"))),
        )
        .await
        .unwrap();
    let pyramid = Pyramid::from_descriptor(&storage, &StaticTms::default(), &descriptor)
        .await
        .unwrap();

    let err = TileExtractor::new(storage.clone())
        .tile_binary(&pyramid, "0", 0, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, PyramidError::NotImplemented(_)));
}

#[tokio::test]
async fn test_truncated_index() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(Storage::new(StorageConfig::default()));
    let pyramid = raster_pyramid(&dir, &storage, "TIFF_RAW_UINT8", 1).await;

    storage
        .write_all(&pyramid.slab_path(SlabKind::Data, "0", 0, 0, true), vec![0u8; 2050])
        .await
        .unwrap();

    let err = TileExtractor::new(storage.clone())
        .tile_binary(&pyramid, "0", 0, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, PyramidError::Format { .. }));
}

#[tokio::test]
async fn test_jpeg_tile() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(Storage::new(StorageConfig::default()));
    let pyramid = raster_pyramid(&dir, &storage, "TIFF_JPG_UINT8", 3).await;

    let slab = build_slab(2, 2, &[(2, jpeg_tile(4, 4, [200, 100, 50]))]);
    storage
        .write_all(&pyramid.slab_path(SlabKind::Data, "0", 0, 0, true), slab)
        .await
        .unwrap();

    let tile = TileExtractor::new(storage.clone())
        .tile_raster(&pyramid, "0", 0, 1)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(tile.shape(), (4, 4, 3));
    let red = tile.sample(0, 0, 0).unwrap();
    let blue = tile.sample(0, 0, 2).unwrap();
    assert!((red - 200.0).abs() < 10.0, "red sample {}", red);
    assert!((blue - 50.0).abs() < 10.0, "blue sample {}", blue);
}

#[tokio::test]
async fn test_vector_read_on_raster_pyramid() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(Storage::new(StorageConfig::default()));
    let pyramid = raster_pyramid(&dir, &storage, "TIFF_RAW_UINT8", 1).await;

    let err = TileExtractor::new(storage.clone())
        .tile_vector(&pyramid, "0", 0, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, PyramidError::Invalid(_)));
}

// =============================================================================
// Vector tiles
// =============================================================================

async fn vector_pyramid(ceph: Arc<MemoryCeph>) -> (Arc<Storage>, Pyramid) {
    let storage = Arc::new(ceph_storage(ceph, StorageConfig::default()));
    storage
        .write_string(
            "ceph://pool/VECT.json",
            &vector_descriptor(level_json((2, 2), ceph_level_storage("VECT", "pool"))),
        )
        .await
        .unwrap();

    let pyramid = Pyramid::from_descriptor(&storage, &StaticTms::default(), "ceph://pool/VECT.json")
        .await
        .unwrap();
    (storage, pyramid)
}

#[tokio::test]
async fn test_vector_tile_from_ceph() {
    let ceph = MemoryCeph::new();
    let (storage, pyramid) = vector_pyramid(ceph.clone()).await;

    // Tile (2, 2) is the first tile of slab (1, 1)
    ceph.pool("pool")
        .put("VECT/DATA_0_1_1", build_slab(2, 2, &[(0, mvt_tile(25, 17))]));

    let tile = TileExtractor::new(storage.clone())
        .tile_vector(&pyramid, "0", 2, 2)
        .await
        .unwrap()
        .unwrap();

    let layer = tile.layer("roads").unwrap();
    assert_eq!(layer.extent, 4096);
    assert_eq!(layer.features.len(), 1);

    let feature = &layer.features[0];
    assert_eq!(feature.id, Some(42));
    assert_eq!(feature.geometry, Geometry::Point([25, 17]));
    assert_eq!(
        feature.properties.get("name"),
        Some(&PropertyValue::String("N7".to_string()))
    );
}

#[tokio::test]
async fn test_slab_index_read_once() {
    let ceph = MemoryCeph::new();
    let (storage, pyramid) = vector_pyramid(ceph.clone()).await;
    ceph.pool("pool").put(
        "VECT/DATA_0_0_0",
        build_slab(2, 2, &[(0, mvt_tile(1, 1)), (1, mvt_tile(2, 2))]),
    );
    let reads_before = ceph.pool("pool").read_count();

    let extractor = TileExtractor::new(storage.clone());
    extractor.tile_vector(&pyramid, "0", 0, 0).await.unwrap().unwrap();
    extractor.tile_vector(&pyramid, "0", 1, 0).await.unwrap().unwrap();

    // One index read, then one read per tile
    assert_eq!(ceph.pool("pool").read_count() - reads_before, 3);
}

#[tokio::test]
async fn test_missing_vector_slab() {
    let ceph = MemoryCeph::new();
    let (storage, pyramid) = vector_pyramid(ceph.clone()).await;

    let tile = TileExtractor::new(storage.clone())
        .tile_vector(&pyramid, "0", 5, 5)
        .await
        .unwrap();
    assert!(tile.is_none());
}

#[tokio::test]
async fn test_raster_read_on_vector_pyramid() {
    let ceph = MemoryCeph::new();
    let (storage, pyramid) = vector_pyramid(ceph.clone()).await;

    let err = TileExtractor::new(storage.clone())
        .tile_raster(&pyramid, "0", 0, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, PyramidError::Invalid(_)));
}
