//! Pyramid list files.
//!
//! A list file enumerates every slab of a pyramid. It starts with the roots
//! the slabs are stored under, one `<id>=<root>` per line, up to a `#` line.
//! Each following line is a slab `<root id>/<slab path>`, optionally followed
//! by a space and the slab's MD5 sum. Root `0` is the pyramid itself; slabs
//! under any other root are links to another pyramid.
//!
//! ```text
//! 0=pyramids/ORTHO
//! 1=pyramids/SCAN
//! #
//! 0/DATA_18_5424_7526 4f5ac4d3...
//! 1/DATA_18_5424_7527
//! ```

use std::collections::HashMap;

use super::addressing::SlabInfos;
use crate::error::PyramidError;

/// One slab of a list file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub infos: SlabInfos,
    /// Root the slab is stored under
    pub root: String,
    /// Whether the slab belongs to another pyramid
    pub link: bool,
    /// Slab path relative to its root
    pub slab: String,
    pub md5: Option<String>,
}

/// Parse a list file.
///
/// With an S3 `cluster`, every root bucket gets the `@cluster` suffix.
/// `decode` turns a relative slab path into its indices.
pub fn parse<F>(
    content: &str,
    subject: &str,
    cluster: Option<&str>,
    decode: F,
) -> Result<Vec<ListEntry>, PyramidError>
where
    F: Fn(&str) -> Result<SlabInfos, PyramidError>,
{
    let malformed = |line: &str, cause: &str| {
        PyramidError::format("pyramid list", subject, format!("{} ({})", cause, line))
    };

    let mut lines = content.lines().map(str::trim_end);
    let mut roots: HashMap<&str, String> = HashMap::new();

    for line in lines.by_ref() {
        if line == "#" {
            break;
        }

        let (id, root) = line
            .split_once('=')
            .ok_or_else(|| malformed(line, "root line without '='"))?;

        let root = match cluster {
            None => root.to_string(),
            Some(cluster) => {
                let (bucket, path) = root
                    .split_once('/')
                    .ok_or_else(|| malformed(line, "root without bucket"))?;
                format!("{}@{}/{}", bucket, cluster, path)
            }
        };
        roots.insert(id, root);
    }

    let mut entries = Vec::new();
    for line in lines.filter(|l| !l.is_empty()) {
        let (path, md5) = match line.split_once(' ') {
            Some((path, md5)) => (path, Some(md5.to_string())),
            None => (line, None),
        };

        let (root_id, slab) = path
            .split_once('/')
            .ok_or_else(|| malformed(line, "slab line without root"))?;
        let root = roots
            .get(root_id)
            .ok_or_else(|| malformed(line, "unknown root"))?;

        entries.push(ListEntry {
            infos: decode(slab)?,
            root: root.clone(),
            link: root_id != "0",
            slab: slab.to_string(),
            md5,
        });
    }

    Ok(entries)
}
