//! Integration tests for pyramid loading, copying and list files.

use std::sync::Arc;

use super::test_utils::{
    ceph_level_storage, ceph_storage, file_level_storage, file_uri, level_json,
    raster_descriptor, vector_descriptor, MemoryCeph, StaticTms, TEST_TMS,
};
use rok4_core::error::PyramidError;
use rok4_core::pyramid::{PyramidDescriptor, TileMatrixSetProvider};
use rok4_core::{
    Pyramid, PyramidStorage, PyramidType, SlabKind, Storage, StorageConfig, StorageKind,
    TileFormat, TmsDirectory,
};
use tempfile::TempDir;

async fn file_pyramid(dir: &TempDir, storage: &Storage) -> Pyramid {
    let descriptor = file_uri(dir, "SCAN.json");
    storage
        .write_string(
            &descriptor,
            &raster_descriptor("TIFF_RAW_UINT8", 1, level_json((2, 2), file_level_storage("SCAN"))),
        )
        .await
        .unwrap();

    Pyramid::from_descriptor(storage, &StaticTms::default(), &descriptor)
        .await
        .unwrap()
}

// =============================================================================
// Loading
// =============================================================================

#[tokio::test]
async fn test_load_file_pyramid() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(StorageConfig::default());
    let pyramid = file_pyramid(&dir, &storage).await;

    assert_eq!(pyramid.name(), "SCAN");
    assert_eq!(pyramid.format(), TileFormat::RawUInt8);
    assert_eq!(pyramid.pyramid_type(), PyramidType::Raster);
    assert_eq!(pyramid.storage_kind(), StorageKind::File);
    assert_eq!(pyramid.storage_root(), dir.path().display().to_string());
    assert_eq!(pyramid.storage_depth(), Some(2));
    assert_eq!(pyramid.channels(), Some(1));
    assert_eq!(pyramid.list(), file_uri(&dir, "SCAN.list"));

    let level = pyramid.level("0").unwrap();
    assert_eq!(level.slab_size(), (2, 2));
    assert_eq!(level.pyramid(), "SCAN");

    assert_eq!(
        pyramid.slab_path(SlabKind::Data, "0", 0, 0, true),
        file_uri(&dir, "SCAN/DATA/0/00/00/00.tif")
    );
}

#[tokio::test]
async fn test_load_rejects_level_outside_tms() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(StorageConfig::default());
    let descriptor = file_uri(&dir, "BAD.json");

    let mut level = level_json((2, 2), file_level_storage("BAD"));
    level["id"] = "42".into();
    storage
        .write_string(&descriptor, &raster_descriptor("TIFF_RAW_UINT8", 1, level))
        .await
        .unwrap();

    let err = Pyramid::from_descriptor(&storage, &StaticTms::default(), &descriptor)
        .await
        .unwrap_err();
    assert!(matches!(err, PyramidError::Invalid(_)));
}

#[tokio::test]
async fn test_load_rejects_storage_mismatch() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(StorageConfig::default());
    let descriptor = file_uri(&dir, "MIXED.json");

    storage
        .write_string(
            &descriptor,
            &raster_descriptor("TIFF_RAW_UINT8", 1, level_json((2, 2), ceph_level_storage("MIXED", "pool"))),
        )
        .await
        .unwrap();

    let err = Pyramid::from_descriptor(&storage, &StaticTms::default(), &descriptor)
        .await
        .unwrap_err();
    assert!(matches!(err, PyramidError::Invalid(_)));
}

#[tokio::test]
async fn test_load_missing_descriptor() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(StorageConfig::default());

    let err = Pyramid::from_descriptor(&storage, &StaticTms::default(), &file_uri(&dir, "NONE.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, PyramidError::Storage(ref e) if e.is_not_found()));
}

#[tokio::test]
async fn test_load_vector_pyramid_from_ceph() {
    let ceph = MemoryCeph::new();
    let storage = ceph_storage(ceph.clone(), StorageConfig::default());
    storage
        .write_string(
            "ceph://pool/VECT.json",
            &vector_descriptor(level_json((4, 4), ceph_level_storage("VECT", "pool"))),
        )
        .await
        .unwrap();

    let pyramid = Pyramid::from_descriptor(&storage, &StaticTms::default(), "ceph://pool/VECT.json")
        .await
        .unwrap();

    assert_eq!(pyramid.pyramid_type(), PyramidType::Vector);
    assert_eq!(pyramid.tile_extension(), "pbf");
    assert!(pyramid.channels().is_none());
    assert_eq!(pyramid.level("0").unwrap().tables().unwrap().len(), 1);
    assert_eq!(
        pyramid.slab_path(SlabKind::Mask, "0", 3, 4, true),
        "ceph://pool/VECT/MASK_0_3_4"
    );
    assert_eq!(pyramid.slab_path(SlabKind::Data, "0", 3, 4, false), "DATA_0_3_4");
}

// =============================================================================
// Copy to another storage
// =============================================================================

#[tokio::test]
async fn test_from_other_writes_ceph_descriptor() {
    let dir = TempDir::new().unwrap();
    let ceph = MemoryCeph::new();
    let storage = ceph_storage(ceph.clone(), StorageConfig::default());
    let source = file_pyramid(&dir, &storage).await;

    let copy = Pyramid::from_other(
        &source,
        "SCAN_COPY",
        PyramidStorage {
            kind: StorageKind::Ceph,
            root: "pyramids".to_string(),
            depth: None,
        },
    )
    .unwrap();

    assert_eq!(copy.descriptor(), "ceph://pyramids/SCAN_COPY.json");
    assert_eq!(copy.list(), "ceph://pyramids/SCAN_COPY.list");
    assert_eq!(copy.level("0").unwrap().pyramid(), "SCAN_COPY");
    assert!(copy.storage_depth().is_none());

    copy.write_descriptor(&storage).await.unwrap();

    let written = ceph.pool("pyramids").object("SCAN_COPY.json").unwrap();
    let data: PyramidDescriptor = serde_json::from_slice(&written).unwrap();
    let level_storage = data.levels.unwrap()[0].storage.clone().unwrap();
    assert_eq!(level_storage.kind.as_deref(), Some("CEPH"));
    assert_eq!(level_storage.image_prefix.as_deref(), Some("SCAN_COPY/DATA_0"));
    assert_eq!(level_storage.pool_name.as_deref(), Some("pyramids"));

    let reloaded = Pyramid::from_descriptor(&storage, &StaticTms::default(), copy.descriptor())
        .await
        .unwrap();
    assert_eq!(reloaded.name(), "SCAN_COPY");
    assert_eq!(reloaded.level("0").unwrap().tile_limits(), source.level("0").unwrap().tile_limits());
}

#[tokio::test]
async fn test_from_other_rejects_slash_in_file_name() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(StorageConfig::default());
    let source = file_pyramid(&dir, &storage).await;

    let result = Pyramid::from_other(
        &source,
        "sub/SCAN",
        PyramidStorage {
            kind: StorageKind::File,
            root: "/data".to_string(),
            depth: None,
        },
    );
    assert!(matches!(result, Err(PyramidError::Invalid(_))));
}

#[tokio::test]
async fn test_file_descriptor_round_trip() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(StorageConfig::default());
    let source = file_pyramid(&dir, &storage).await;

    let copy = Pyramid::from_other(
        &source,
        "SCAN2",
        PyramidStorage {
            kind: StorageKind::File,
            root: dir.path().display().to_string(),
            depth: Some(3),
        },
    )
    .unwrap();
    copy.write_descriptor(&storage).await.unwrap();

    let reloaded = Pyramid::from_descriptor(&storage, &StaticTms::default(), copy.descriptor())
        .await
        .unwrap();
    assert_eq!(reloaded.storage_depth(), Some(3));
    assert_eq!(
        reloaded.slab_path(SlabKind::Data, "0", 0, 0, false),
        "DATA/0/00/00/00/00.tif"
    );
}

// =============================================================================
// List and size
// =============================================================================

#[tokio::test]
async fn test_load_list_through_storage() {
    let ceph = MemoryCeph::new();
    let storage = ceph_storage(ceph.clone(), StorageConfig::default());
    storage
        .write_string(
            "ceph://pool/VECT.json",
            &vector_descriptor(level_json((4, 4), ceph_level_storage("VECT", "pool"))),
        )
        .await
        .unwrap();
    ceph.pool("pool").put(
        "VECT.list",
        b"0=pool/VECT\n1=pool/OTHER\n#\n0/DATA_0_1_2 5d41402abc4b2a76b9719d911017c592\n1/DATA_0_3_4\n".to_vec(),
    );

    let pyramid = Pyramid::from_descriptor(&storage, &StaticTms::default(), "ceph://pool/VECT.json")
        .await
        .unwrap();

    let entries = pyramid.load_list(&storage).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].infos.kind, SlabKind::Data);
    assert_eq!((entries[0].infos.column, entries[0].infos.row), (1, 2));
    assert!(!entries[0].link);
    assert_eq!(entries[1].root, "pool/OTHER");
    assert!(entries[1].link);

    // Parsed once
    let again = pyramid.load_list(&storage).await.unwrap();
    assert!(Arc::ptr_eq(&entries, &again));
}

#[tokio::test]
async fn test_file_pyramid_size() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(StorageConfig::default());
    let pyramid = file_pyramid(&dir, &storage).await;

    storage
        .write_all(&pyramid.slab_path(SlabKind::Data, "0", 0, 0, true), vec![0u8; 3000])
        .await
        .unwrap();
    storage
        .write_all(&pyramid.slab_path(SlabKind::Data, "0", 1, 0, true), vec![0u8; 1000])
        .await
        .unwrap();

    assert_eq!(pyramid.size(&storage).await.unwrap(), 4000);
}

// =============================================================================
// Tile matrix sets
// =============================================================================

#[tokio::test]
async fn test_tms_directory_loads_once() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(Storage::new(StorageConfig::default()));
    storage
        .write_string(&file_uri(&dir, "TEST.json"), TEST_TMS)
        .await
        .unwrap();

    let directory = TmsDirectory::new(storage.clone(), file_uri(&dir, ""));
    let first = directory.tile_matrix_set("TEST").await.unwrap();
    let second = directory.tile_matrix_set("TEST").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.srs, "EPSG:2154");
    assert_eq!(first.level("0").unwrap().tile_width(), 4);

    let err = directory.tile_matrix_set("MISSING").await.unwrap_err();
    assert!(matches!(err, PyramidError::Storage(_)));
}

#[tokio::test]
async fn test_tms_directory_from_config() {
    let storage = Arc::new(Storage::new(StorageConfig::default()));
    assert!(TmsDirectory::from_config(storage).is_err());
}
