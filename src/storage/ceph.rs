//! CEPH object storage adapter.
//!
//! librados is synchronous, so the backend is described by two blocking
//! traits, [`CephConnector`] and [`CephPool`], and every call is moved off the
//! async runtime with [`tokio::task::spawn_blocking`].
//!
//! The librados implementation is only compiled with the `ceph` cargo
//! feature. Without it, CEPH paths fail with [`StorageError::NotImplemented`]
//! unless a connector is injected with
//! [`BackendClients::with_ceph_connector`](super::BackendClients::with_ceph_connector).

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::error::StorageError;

/// Chunk size used when streaming objects.
pub const CHUNK_SIZE: usize = 65536;

/// I/O context on one CEPH pool.
///
/// Implementations must return [`StorageError::NotFound`] for absent objects.
pub trait CephPool: Send + Sync {
    /// Object size in bytes.
    fn stat(&self, object: &str) -> Result<u64, StorageError>;

    /// Read at most `len` bytes starting at `offset`.
    fn read(&self, object: &str, len: usize, offset: u64) -> Result<Vec<u8>, StorageError>;

    /// Write `data` at `offset`, keeping the rest of the object.
    fn write(&self, object: &str, data: &[u8], offset: u64) -> Result<(), StorageError>;

    /// Replace the whole object content.
    fn write_full(&self, object: &str, data: &[u8]) -> Result<(), StorageError>;

    fn remove(&self, object: &str) -> Result<(), StorageError>;
}

/// Connected CEPH cluster handing out pool contexts.
pub trait CephConnector: Send + Sync {
    fn open_pool(&self, pool: &str) -> Result<Arc<dyn CephPool>, StorageError>;
}

/// Run a blocking CEPH call on the blocking thread pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::backend("CEPH", e))?
}

// =============================================================================
// Operations
// =============================================================================

pub(crate) async fn read(
    pool: Arc<dyn CephPool>,
    object: &str,
    range: Option<(u64, u64)>,
) -> Result<Bytes, StorageError> {
    debug!(object, ?range, "CEPH read");
    let object = object.to_string();

    blocking(move || {
        let data = match range {
            Some((offset, len)) => {
                let size = pool.stat(&object)?;
                let len = len.min(size.saturating_sub(offset));
                pool.read(&object, len as usize, offset)?
            }
            None => {
                let size = pool.stat(&object)?;
                pool.read(&object, size as usize, 0)?
            }
        };
        Ok(Bytes::from(data))
    })
    .await
}

pub(crate) async fn write_full(
    pool: Arc<dyn CephPool>,
    object: &str,
    data: Bytes,
) -> Result<(), StorageError> {
    debug!(object, len = data.len(), "CEPH write");
    let object = object.to_string();
    blocking(move || pool.write_full(&object, &data)).await
}

pub(crate) async fn write_at(
    pool: Arc<dyn CephPool>,
    object: &str,
    data: Bytes,
    offset: u64,
) -> Result<(), StorageError> {
    let object = object.to_string();
    blocking(move || pool.write(&object, &data, offset)).await
}

pub(crate) async fn size(pool: Arc<dyn CephPool>, object: &str) -> Result<u64, StorageError> {
    let object = object.to_string();
    blocking(move || pool.stat(&object)).await
}

pub(crate) async fn exists(pool: Arc<dyn CephPool>, object: &str) -> Result<bool, StorageError> {
    match size(pool, object).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Remove an object. An absent object is not an error.
pub(crate) async fn remove(pool: Arc<dyn CephPool>, object: &str) -> Result<(), StorageError> {
    debug!(object, "CEPH remove");
    let object = object.to_string();
    blocking(move || match pool.remove(&object) {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    })
    .await
}

// =============================================================================
// librados
// =============================================================================

#[cfg(feature = "ceph")]
pub use self::rados::RadosConnector;

#[cfg(feature = "ceph")]
mod rados {
    use std::io::ErrorKind;
    use std::sync::Arc;

    use ceph::ceph::{connect_to_ceph, IoCtx, Rados};
    use ceph::error::RadosError;
    use tracing::info;

    use super::{CephConnector, CephPool};
    use crate::config::CephConfig;
    use crate::error::StorageError;

    const ENOENT: i32 = 2;

    fn rados_error(object: &str, e: RadosError) -> StorageError {
        match e {
            RadosError::ApiError(errno) if errno as i32 == ENOENT => {
                StorageError::NotFound(object.to_string())
            }
            RadosError::IoError(ref io) if io.kind() == ErrorKind::NotFound => {
                StorageError::NotFound(object.to_string())
            }
            other => StorageError::backend("CEPH", other),
        }
    }

    /// librados cluster handle.
    pub struct RadosConnector {
        cluster: Arc<Rados>,
    }

    impl RadosConnector {
        /// Connect to the cluster. Blocking.
        pub fn connect(config: &CephConfig) -> Result<Self, StorageError> {
            info!(
                cluster = %config.cluster_name,
                user = %config.user_name,
                "connecting to CEPH cluster"
            );
            let cluster = connect_to_ceph(&config.user_name, &config.conf_file)
                .map_err(|e| StorageError::backend("CEPH", e))?;

            Ok(Self {
                cluster: Arc::new(cluster),
            })
        }
    }

    impl CephConnector for RadosConnector {
        fn open_pool(&self, pool: &str) -> Result<Arc<dyn CephPool>, StorageError> {
            let ioctx = self
                .cluster
                .get_rados_ioctx(pool)
                .map_err(|e| StorageError::backend("CEPH", e))?;

            Ok(Arc::new(RadosPool {
                ioctx,
                pool: pool.to_string(),
                _cluster: self.cluster.clone(),
            }))
        }
    }

    struct RadosPool {
        ioctx: IoCtx,
        pool: String,
        // keeps the cluster connection open while the context lives
        _cluster: Arc<Rados>,
    }

    impl RadosPool {
        fn uri(&self, object: &str) -> String {
            format!("ceph://{}/{}", self.pool, object)
        }
    }

    impl CephPool for RadosPool {
        fn stat(&self, object: &str) -> Result<u64, StorageError> {
            self.ioctx
                .rados_object_stat(object)
                .map(|(size, _)| size)
                .map_err(|e| rados_error(&self.uri(object), e))
        }

        fn read(&self, object: &str, len: usize, offset: u64) -> Result<Vec<u8>, StorageError> {
            // librados reads up to the buffer capacity
            let mut buffer = Vec::with_capacity(len);
            self.ioctx
                .rados_object_read(object, &mut buffer, offset)
                .map_err(|e| rados_error(&self.uri(object), e))?;
            Ok(buffer)
        }

        fn write(&self, object: &str, data: &[u8], offset: u64) -> Result<(), StorageError> {
            self.ioctx
                .rados_object_write(object, data, offset)
                .map_err(|e| rados_error(&self.uri(object), e))
        }

        fn write_full(&self, object: &str, data: &[u8]) -> Result<(), StorageError> {
            self.ioctx
                .rados_object_write_full(object, data)
                .map_err(|e| rados_error(&self.uri(object), e))
        }

        fn remove(&self, object: &str) -> Result<(), StorageError> {
            self.ioctx
                .rados_object_remove(object)
                .map_err(|e| rados_error(&self.uri(object), e))
        }
    }

}
