//! Local filesystem adapter.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use crate::error::StorageError;

pub(crate) fn map_error(path: &str, e: std::io::Error) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        StorageError::NotFound(format!("file://{}", path))
    } else {
        StorageError::backend("FILE", format!("{}: {}", path, e))
    }
}

/// Create the parent directory of `path` when missing.
pub(crate) async fn ensure_parent(path: &str) -> Result<(), StorageError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| map_error(path, e))?;
        }
    }
    Ok(())
}

/// Read a whole file, or at most `length` bytes from `offset`.
pub(crate) async fn read(path: &str, range: Option<(u64, u64)>) -> Result<Bytes, StorageError> {
    debug!(path, ?range, "FILE read");

    match range {
        None => fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| map_error(path, e)),
        Some((offset, len)) => {
            let mut file = open(path).await?;
            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(|e| map_error(path, e))?;

            let mut data = Vec::new();
            file.take(len)
                .read_to_end(&mut data)
                .await
                .map_err(|e| map_error(path, e))?;
            Ok(Bytes::from(data))
        }
    }
}

pub(crate) async fn open(path: &str) -> Result<fs::File, StorageError> {
    fs::File::open(path).await.map_err(|e| map_error(path, e))
}

/// Create or truncate a file, creating its directory.
pub(crate) async fn create(path: &str) -> Result<fs::File, StorageError> {
    ensure_parent(path).await?;
    fs::File::create(path).await.map_err(|e| map_error(path, e))
}

/// Overwrite a file, creating its directory.
pub(crate) async fn write(path: &str, data: &[u8]) -> Result<(), StorageError> {
    debug!(path, len = data.len(), "FILE write");
    ensure_parent(path).await?;
    fs::write(path, data).await.map_err(|e| map_error(path, e))
}

pub(crate) async fn size(path: &str) -> Result<u64, StorageError> {
    fs::metadata(path)
        .await
        .map(|m| m.len())
        .map_err(|e| map_error(path, e))
}

pub(crate) async fn exists(path: &str) -> Result<bool, StorageError> {
    fs::try_exists(path).await.map_err(|e| map_error(path, e))
}

/// Remove a file. A missing file is not an error.
pub(crate) async fn remove(path: &str) -> Result<(), StorageError> {
    debug!(path, "FILE remove");
    match fs::remove_file(path).await {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other.map_err(|e| map_error(path, e)),
    }
}

/// Byte copy between two local files.
pub(crate) async fn copy(from: &str, to: &str) -> Result<(), StorageError> {
    debug!(from, to, "FILE copy");
    ensure_parent(to).await?;
    fs::copy(from, to).await.map_err(|e| map_error(from, e))?;
    Ok(())
}

/// MD5 of a file content, as lowercase hex.
pub(crate) async fn md5_hex(path: &str) -> Result<String, StorageError> {
    let mut file = open(path).await?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; super::ceph::CHUNK_SIZE];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .map_err(|e| map_error(path, e))?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// Create a hard or symbolic link, replacing what `link` points to.
pub(crate) async fn link(target: &str, link: &str, hard: bool) -> Result<(), StorageError> {
    debug!(target, link, hard, "FILE link");
    ensure_parent(link).await?;

    if fs::symlink_metadata(link).await.is_ok() {
        warn!(link, "replacing existing path with a link");
        remove(link).await?;
    }

    let result = if hard {
        fs::hard_link(target, link).await
    } else {
        symlink(target, link).await
    };

    result.map_err(|e| StorageError::backend("FILE", format!("{} -> {}: {}", link, target, e)))
}

#[cfg(unix)]
async fn symlink(target: &str, link: &str) -> std::io::Result<()> {
    fs::symlink(target, link).await
}

#[cfg(windows)]
async fn symlink(target: &str, link: &str) -> std::io::Result<()> {
    fs::symlink_file(target, link).await
}

/// Total size of the files under a directory, recursively.
pub(crate) async fn size_dir(path: &str) -> Result<u64, StorageError> {
    let mut total = 0u64;
    let mut pending: Vec<PathBuf> = vec![PathBuf::from(path)];

    while let Some(dir) = pending.pop() {
        let dir_str = dir.to_string_lossy().into_owned();
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| map_error(&dir_str, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| map_error(&dir_str, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| map_error(&dir_str, e))?;

            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                let metadata = entry.metadata().await.map_err(|e| map_error(&dir_str, e))?;
                total += metadata.len();
            }
        }
    }

    Ok(total)
}
