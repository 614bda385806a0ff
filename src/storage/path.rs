//! Storage path parsing and building.
//!
//! A storage path is `scheme://container/object...`. Recognized schemes are
//! `file://`, `s3://`, `ceph://`, `http://` and `https://`; a path without
//! scheme is a FILE path.
//!
//! - FILE: the container is the directory, the object the file name.
//! - S3, CEPH, HTTP(S): the container is the first segment (bucket, pool or
//!   host), the object is the remainder. An S3 bucket may carry an
//!   `@cluster_host` suffix.

use std::fmt;
use std::str::FromStr;

use crate::error::StorageError;

/// Storage backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    File,
    S3,
    Ceph,
    Http,
    Https,
}

impl StorageKind {
    /// URI prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            StorageKind::File => "file://",
            StorageKind::S3 => "s3://",
            StorageKind::Ceph => "ceph://",
            StorageKind::Http => "http://",
            StorageKind::Https => "https://",
        }
    }

    /// Upper-case name, as written in pyramid descriptors and errors.
    pub fn name(&self) -> &'static str {
        match self {
            StorageKind::File => "FILE",
            StorageKind::S3 => "S3",
            StorageKind::Ceph => "CEPH",
            StorageKind::Http => "HTTP",
            StorageKind::Https => "HTTPS",
        }
    }

    /// Whether the kind is HTTP or HTTPS.
    pub fn is_http(&self) -> bool {
        matches!(self, StorageKind::Http | StorageKind::Https)
    }

    // Longest prefixes first so that "https://" wins over "http://".
    const PREFIXED: [StorageKind; 5] = [
        StorageKind::Https,
        StorageKind::Http,
        StorageKind::Ceph,
        StorageKind::File,
        StorageKind::S3,
    ];
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StorageKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FILE" => Ok(StorageKind::File),
            "S3" => Ok(StorageKind::S3),
            "CEPH" => Ok(StorageKind::Ceph),
            "HTTP" => Ok(StorageKind::Http),
            "HTTPS" => Ok(StorageKind::Https),
            other => Err(StorageError::NotImplemented(format!(
                "Unknown storage type {}",
                other
            ))),
        }
    }
}

/// A parsed storage path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageLocation {
    pub kind: StorageKind,
    /// Path without its scheme prefix
    pub path: String,
    /// Directory, bucket, pool or host
    pub container: String,
    /// File name or object key
    pub object: String,
}

impl StorageLocation {
    /// Parse a storage path.
    ///
    /// Object and network paths must contain a `/` after the container.
    pub fn parse(uri: &str) -> Result<Self, StorageError> {
        let (kind, path) = StorageKind::PREFIXED
            .iter()
            .find_map(|kind| uri.strip_prefix(kind.prefix()).map(|rest| (*kind, rest)))
            .unwrap_or((StorageKind::File, uri));

        let (container, object) = match kind {
            StorageKind::File => split_file_path(path),
            _ => path
                .split_once('/')
                .ok_or_else(|| StorageError::InvalidPath(uri.to_string()))?,
        };

        Ok(Self {
            kind,
            path: path.to_string(),
            container: container.to_string(),
            object: object.to_string(),
        })
    }

    /// Full prefixed path.
    pub fn uri(&self) -> String {
        format!("{}{}", self.kind.prefix(), self.path)
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.path)
    }
}

/// Build a prefixed path from segments joined with `/`.
///
/// Empty segments are skipped and no separator is doubled.
pub fn build_path(kind: StorageKind, segments: &[&str]) -> String {
    let mut joined = String::new();
    for segment in segments.iter().filter(|s| !s.is_empty()) {
        if !joined.is_empty() && !joined.ends_with('/') {
            joined.push('/');
        }
        joined.push_str(segment);
    }
    format!("{}{}", kind.prefix(), joined)
}

fn split_file_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}
