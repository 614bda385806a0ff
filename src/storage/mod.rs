//! Storage access layer.
//!
//! [`Storage`] reads, writes, copies and links files and objects addressed by
//! a prefixed path (`file://`, `s3://`, `ceph://`, `http://`, `https://`). Each
//! call dispatches on the backend kind of the path(s) involved. Reads go
//! through a shared [`ReadCache`].
//!
//! # Example
//!
//! ```rust,no_run
//! use rok4_core::{Storage, StorageConfig};
//!
//! # async fn example() -> Result<(), rok4_core::StorageError> {
//! let storage = Storage::new(StorageConfig::from_env()?);
//! let descriptor = storage.read_string("s3://pyramids/SCAN1000.json").await?;
//! storage.copy("s3://pyramids/SCAN1000.json", "file:///tmp/SCAN1000.json", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod ceph;
pub mod clients;
mod file;
mod http;
pub mod path;
mod s3;
mod transfer;

pub use cache::{ByteRange, ReadCache, ReadCacheKey};
pub use ceph::{CephConnector, CephPool};
pub use clients::{BackendClients, S3Cluster, S3Target};
pub use path::{build_path, StorageKind, StorageLocation};

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::StorageError;
use transfer::{CopySink, CopySource};

/// Body prefix of an object emulating a symbolic link.
pub const SYMLINK_SIGNATURE: &str = "SYMLINK#";

/// Backend-polymorphic storage API.
pub struct Storage {
    clients: BackendClients,
    cache: ReadCache,
}

impl Storage {
    pub fn new(config: StorageConfig) -> Self {
        Self::with_clients(BackendClients::new(config))
    }

    /// Storage configured from the `ROK4_*` environment variables.
    pub fn from_env() -> Result<Self, StorageError> {
        Ok(Self::new(StorageConfig::from_env()?))
    }

    /// Storage over prepared clients, with a cache sized from their configuration.
    pub fn with_clients(clients: BackendClients) -> Self {
        let cache = ReadCache::from_config(clients.config());
        Self { clients, cache }
    }

    pub fn clients(&self) -> &BackendClients {
        &self.clients
    }

    pub fn config(&self) -> &StorageConfig {
        self.clients.config()
    }

    pub fn cache(&self) -> &ReadCache {
        &self.cache
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Full content of a file or object.
    pub async fn read_all(&self, path: &str) -> Result<Bytes, StorageError> {
        self.read(path, None).await
    }

    /// `length` bytes of a file or object, starting at `offset`.
    ///
    /// HTTP(S) resources only support full reads.
    pub async fn read_range(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<Bytes, StorageError> {
        self.read(path, Some((offset, length))).await
    }

    /// Full content decoded as UTF-8.
    pub async fn read_string(&self, path: &str) -> Result<String, StorageError> {
        let data = self.read_all(path).await?;
        String::from_utf8(data.to_vec()).map_err(|e| {
            StorageError::backend(
                StorageLocation::parse(path)
                    .map(|l| l.kind.name())
                    .unwrap_or("FILE"),
                format!("{} is not UTF-8: {}", path, e),
            )
        })
    }

    async fn read(&self, path: &str, range: Option<ByteRange>) -> Result<Bytes, StorageError> {
        let location = StorageLocation::parse(path)?;

        if range.is_some() && location.kind.is_http() {
            return Err(StorageError::NotImplemented(format!(
                "Cannot get partial data for storage type {}",
                location.kind
            )));
        }

        self.cache
            .get_or_fetch(&location.uri(), range, || {
                self.read_uncached(&location, range)
            })
            .await
    }

    async fn read_uncached(
        &self,
        location: &StorageLocation,
        range: Option<ByteRange>,
    ) -> Result<Bytes, StorageError> {
        match location.kind {
            StorageKind::File => file::read(&location.path, range).await,
            StorageKind::S3 => {
                let target = self.clients.resolve_bucket(&location.container).await?;
                s3::read(&target, &location.object, range).await
            }
            StorageKind::Ceph => {
                let pool = self.clients.ceph_pool(&location.container).await?;
                ceph::read(pool, &location.object, range).await
            }
            StorageKind::Http | StorageKind::Https => {
                http::read(self.clients.http(), location).await
            }
        }
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Replace the content of a file or object.
    pub async fn write_all(&self, path: &str, data: impl Into<Bytes>) -> Result<(), StorageError> {
        let location = StorageLocation::parse(path)?;
        let data = data.into();

        match location.kind {
            StorageKind::File => file::write(&location.path, &data).await,
            StorageKind::S3 => {
                let target = self.clients.resolve_bucket(&location.container).await?;
                s3::write(&target, &location.object, data).await
            }
            StorageKind::Ceph => {
                let pool = self.clients.ceph_pool(&location.container).await?;
                ceph::write_full(pool, &location.object, data).await
            }
            StorageKind::Http | StorageKind::Https => Err(StorageError::NotImplemented(format!(
                "Cannot write data for storage type {}",
                location.kind
            ))),
        }
    }

    /// Replace the content of a file or object with UTF-8 text.
    pub async fn write_string(&self, path: &str, data: &str) -> Result<(), StorageError> {
        self.write_all(path, Bytes::copy_from_slice(data.as_bytes()))
            .await
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let location = StorageLocation::parse(path)?;

        match location.kind {
            StorageKind::File => file::exists(&location.path).await,
            StorageKind::S3 => {
                let target = self.clients.resolve_bucket(&location.container).await?;
                s3::exists(&target, &location.object).await
            }
            StorageKind::Ceph => {
                let pool = self.clients.ceph_pool(&location.container).await?;
                ceph::exists(pool, &location.object).await
            }
            StorageKind::Http | StorageKind::Https => {
                http::exists(self.clients.http(), &location).await
            }
        }
    }

    /// Size in bytes of a file or object.
    pub async fn size(&self, path: &str) -> Result<u64, StorageError> {
        let location = StorageLocation::parse(path)?;

        match location.kind {
            StorageKind::File => file::size(&location.path).await,
            StorageKind::S3 => {
                let target = self.clients.resolve_bucket(&location.container).await?;
                s3::size(&target, &location.object).await
            }
            StorageKind::Ceph => {
                let pool = self.clients.ceph_pool(&location.container).await?;
                ceph::size(pool, &location.object).await
            }
            StorageKind::Http | StorageKind::Https => {
                http::size(self.clients.http(), &location).await
            }
        }
    }

    /// Total size under a directory (FILE) or an object prefix (S3).
    pub async fn size_path(&self, path: &str) -> Result<u64, StorageError> {
        let location = StorageLocation::parse(path)?;

        match location.kind {
            StorageKind::File => file::size_dir(&location.path).await,
            StorageKind::S3 => {
                let target = self.clients.resolve_bucket(&location.container).await?;
                s3::size_prefix(&target, &location.object).await
            }
            kind => Err(StorageError::NotImplemented(format!(
                "Cannot get prefix path size for storage type {}",
                kind
            ))),
        }
    }

    /// Remove a file or object. Removing an absent one succeeds.
    pub async fn remove(&self, path: &str) -> Result<(), StorageError> {
        let location = StorageLocation::parse(path)?;

        match location.kind {
            StorageKind::File => file::remove(&location.path).await,
            StorageKind::S3 => {
                let target = self.clients.resolve_bucket(&location.container).await?;
                s3::remove(&target, &location.object).await
            }
            StorageKind::Ceph => {
                let pool = self.clients.ceph_pool(&location.container).await?;
                ceph::remove(pool, &location.object).await
            }
            StorageKind::Http | StorageKind::Https => Err(StorageError::NotImplemented(format!(
                "Cannot remove data for storage type {}",
                location.kind
            ))),
        }
    }

    // =========================================================================
    // Copy
    // =========================================================================

    /// Copy a file or object to another place, on any writable backend.
    ///
    /// When `md5` is given, the checksum of the destination is computed after
    /// the copy (file MD5, S3 ETag, or MD5 of the transferred bytes for CEPH)
    /// and compared to it. A failed copy leaves the destination undefined.
    pub async fn copy(&self, from: &str, to: &str, md5: Option<&str>) -> Result<(), StorageError> {
        let src = StorageLocation::parse(from)?;
        let dst = StorageLocation::parse(to)?;

        if dst.kind.is_http() {
            return Err(StorageError::NotImplemented(format!(
                "Cannot copy to storage type {}",
                dst.kind
            )));
        }

        debug!(from, to, "copy");

        let transferred_md5 = match (src.kind, dst.kind) {
            (StorageKind::File, StorageKind::File) => {
                file::copy(&src.path, &dst.path).await?;
                None
            }
            (StorageKind::File, StorageKind::S3) => {
                let target = self.clients.resolve_bucket(&dst.container).await?;
                s3::upload_file(&target, &dst.object, &src.path).await?;
                None
            }
            (StorageKind::S3, StorageKind::S3) => {
                let from_target = self.clients.resolve_bucket(&src.container).await?;
                let to_target = self.clients.resolve_bucket(&dst.container).await?;

                if from_target.host == to_target.host {
                    s3::copy_object(&from_target, &src.object, &to_target, &dst.object).await?;
                    None
                } else {
                    debug!(
                        from = %from_target.host,
                        to = %to_target.host,
                        "cross-cluster S3 copy, streaming through memory"
                    );
                    Some(self.stream_copy(&src, &dst).await?)
                }
            }
            _ => Some(self.stream_copy(&src, &dst).await?),
        };

        if let Some(expected) = md5 {
            self.check_md5(&dst, expected, transferred_md5).await?;
        }

        Ok(())
    }

    async fn stream_copy(
        &self,
        src: &StorageLocation,
        dst: &StorageLocation,
    ) -> Result<String, StorageError> {
        let source = self.open_source(src).await?;
        let sink = self.open_sink(dst).await?;
        transfer::pump(source, sink).await
    }

    async fn open_source(&self, location: &StorageLocation) -> Result<CopySource, StorageError> {
        Ok(match location.kind {
            StorageKind::File => CopySource::File {
                file: file::open(&location.path).await?,
                path: location.path.clone(),
            },
            StorageKind::S3 => {
                let target = self.clients.resolve_bucket(&location.container).await?;
                CopySource::S3(s3::stream(&target, &location.object).await?)
            }
            StorageKind::Ceph => {
                let pool = self.clients.ceph_pool(&location.container).await?;
                let size = ceph::size(pool.clone(), &location.object).await?;
                CopySource::Ceph {
                    pool,
                    object: location.object.clone(),
                    offset: 0,
                    size,
                }
            }
            StorageKind::Http | StorageKind::Https => CopySource::Http {
                response: http::stream(self.clients.http(), location).await?,
                kind: location.kind,
            },
        })
    }

    async fn open_sink(&self, location: &StorageLocation) -> Result<CopySink, StorageError> {
        match location.kind {
            StorageKind::File => Ok(CopySink::File {
                file: file::create(&location.path).await?,
                path: location.path.clone(),
            }),
            StorageKind::S3 => Ok(CopySink::S3 {
                target: self.clients.resolve_bucket(&location.container).await?,
                key: location.object.clone(),
                buffer: BytesMut::new(),
            }),
            StorageKind::Ceph => Ok(CopySink::Ceph {
                pool: self.clients.ceph_pool(&location.container).await?,
                object: location.object.clone(),
                offset: 0,
            }),
            kind => Err(StorageError::NotImplemented(format!(
                "Cannot copy to storage type {}",
                kind
            ))),
        }
    }

    async fn check_md5(
        &self,
        dst: &StorageLocation,
        expected: &str,
        transferred: Option<String>,
    ) -> Result<(), StorageError> {
        let actual = match dst.kind {
            StorageKind::File => file::md5_hex(&dst.path).await?,
            StorageKind::S3 => {
                let target = self.clients.resolve_bucket(&dst.container).await?;
                s3::etag(&target, &dst.object).await?
            }
            kind => transferred.ok_or_else(|| {
                StorageError::NotImplemented(format!("MD5 control for storage type {}", kind))
            })?,
        };

        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(StorageError::ChecksumMismatch {
                kind: dst.kind.name().to_string(),
                path: dst.uri(),
                expected: expected.to_string(),
                actual,
            });
        }

        Ok(())
    }

    // =========================================================================
    // Links
    // =========================================================================

    /// Link `link` to `target`.
    ///
    /// FILE gets real links. S3 and CEPH get an object whose body is
    /// [`SYMLINK_SIGNATURE`] followed by the target `container/object`. Both
    /// paths must use the same backend, and the same cluster for S3.
    pub async fn link(&self, target: &str, link: &str, hard: bool) -> Result<(), StorageError> {
        let target_location = StorageLocation::parse(target)?;
        let link_location = StorageLocation::parse(link)?;

        if target_location.kind != link_location.kind {
            return Err(StorageError::backend(
                format!("{} and {}", target_location.kind, link_location.kind),
                "Cannot make link between two different storage types",
            ));
        }

        if hard && target_location.kind != StorageKind::File {
            return Err(StorageError::backend(
                target_location.kind,
                "Hard link is available only for FILE storage",
            ));
        }

        match target_location.kind {
            StorageKind::File => file::link(&target_location.path, &link_location.path, hard).await,
            StorageKind::S3 => {
                let target_s3 = self.clients.resolve_bucket(&target_location.container).await?;
                let link_s3 = self.clients.resolve_bucket(&link_location.container).await?;

                if target_s3.host != link_s3.host {
                    return Err(StorageError::backend(
                        "S3",
                        format!(
                            "Cannot make link {} -> {}: link works only on the same S3 cluster",
                            link, target
                        ),
                    ));
                }

                let body = format!(
                    "{}{}/{}",
                    SYMLINK_SIGNATURE, target_s3.bucket, target_location.object
                );
                s3::write(&link_s3, &link_location.object, Bytes::from(body)).await
            }
            StorageKind::Ceph => {
                let pool = self.clients.ceph_pool(&link_location.container).await?;
                let body = format!("{}{}", SYMLINK_SIGNATURE, target_location.path);
                ceph::write_full(pool, &link_location.object, Bytes::from(body)).await
            }
            kind => Err(StorageError::NotImplemented(format!(
                "Cannot make link for storage type {}",
                kind
            ))),
        }
    }

    /// Drop every backend client. They are rebuilt on next use.
    pub async fn disconnect(&self) {
        self.clients.disconnect().await;
    }
}

// =============================================================================
// Tests
// =============================================================================
