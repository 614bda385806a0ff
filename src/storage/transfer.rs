//! Chunked transfer between any readable and any writable backend.
//!
//! Used by copies that have no bulk path. Sources are read in
//! [`CHUNK_SIZE`] pieces when the backend lets us pick the size; S3 objects
//! are written once the whole content is buffered.

use std::sync::Arc;

use aws_sdk_s3::primitives::ByteStream;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::ceph::{self, CephPool, CHUNK_SIZE};
use super::clients::S3Target;
use super::file;
use super::path::StorageKind;
use super::s3;
use crate::error::StorageError;

pub(crate) enum CopySource {
    File {
        file: tokio::fs::File,
        path: String,
    },
    S3(ByteStream),
    Ceph {
        pool: Arc<dyn CephPool>,
        object: String,
        offset: u64,
        size: u64,
    },
    Http {
        response: reqwest::Response,
        kind: StorageKind,
    },
}

impl CopySource {
    /// Next chunk, `None` once the source is exhausted.
    pub(crate) async fn next_chunk(&mut self) -> Result<Option<Bytes>, StorageError> {
        match self {
            CopySource::File { file, path } => {
                let mut buffer = vec![0u8; CHUNK_SIZE];
                let n = file
                    .read(&mut buffer)
                    .await
                    .map_err(|e| file::map_error(path, e))?;
                if n == 0 {
                    return Ok(None);
                }
                buffer.truncate(n);
                Ok(Some(Bytes::from(buffer)))
            }
            CopySource::S3(stream) => stream
                .next()
                .await
                .transpose()
                .map_err(|e| StorageError::backend("S3", e)),
            CopySource::Ceph {
                pool,
                object,
                offset,
                size,
            } => {
                if *offset >= *size {
                    return Ok(None);
                }
                let len = (CHUNK_SIZE as u64).min(*size - *offset);
                let chunk = ceph::read(pool.clone(), object, Some((*offset, len))).await?;
                if chunk.is_empty() {
                    return Ok(None);
                }
                *offset += chunk.len() as u64;
                Ok(Some(chunk))
            }
            CopySource::Http { response, kind } => response
                .chunk()
                .await
                .map_err(|e| StorageError::backend(*kind, e)),
        }
    }
}

pub(crate) enum CopySink {
    File {
        file: tokio::fs::File,
        path: String,
    },
    S3 {
        target: S3Target,
        key: String,
        buffer: BytesMut,
    },
    Ceph {
        pool: Arc<dyn CephPool>,
        object: String,
        offset: u64,
    },
}

impl CopySink {
    pub(crate) async fn write(&mut self, chunk: Bytes) -> Result<(), StorageError> {
        match self {
            CopySink::File { file, path } => file
                .write_all(&chunk)
                .await
                .map_err(|e| file::map_error(path, e)),
            CopySink::S3 { buffer, .. } => {
                buffer.extend_from_slice(&chunk);
                Ok(())
            }
            CopySink::Ceph {
                pool,
                object,
                offset,
            } => {
                let len = chunk.len() as u64;
                // the first chunk replaces the previous content
                if *offset == 0 {
                    ceph::write_full(pool.clone(), object, chunk).await?;
                } else {
                    ceph::write_at(pool.clone(), object, chunk, *offset).await?;
                }
                *offset += len;
                Ok(())
            }
        }
    }

    pub(crate) async fn finish(self) -> Result<(), StorageError> {
        match self {
            CopySink::File { mut file, path } => {
                file.flush().await.map_err(|e| file::map_error(&path, e))
            }
            CopySink::S3 {
                target,
                key,
                buffer,
            } => s3::write(&target, &key, buffer.freeze()).await,
            CopySink::Ceph {
                pool,
                object,
                offset,
            } => {
                if offset == 0 {
                    ceph::write_full(pool, &object, Bytes::new()).await?;
                }
                Ok(())
            }
        }
    }
}

/// Pump `source` into `sink`, returning the MD5 of the transferred bytes.
pub(crate) async fn pump(mut source: CopySource, mut sink: CopySink) -> Result<String, StorageError> {
    let mut digest = md5::Context::new();

    while let Some(chunk) = source.next_chunk().await? {
        digest.consume(&chunk);
        sink.write(chunk).await?;
    }

    sink.finish().await?;
    Ok(format!("{:x}", digest.compute()))
}
