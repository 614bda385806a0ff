//! Slab addressing.
//!
//! Maps slab indices to storage names and back:
//!
//! - FILE pyramids interleave the base-36 digits of the slab column and row
//!   into a directory tree: `(4032, 18217)` at depth 2 is `3E/42/01.tif`.
//! - Object pyramids use a flat key: `DATA_<level>_<col>_<row>`.
//!
//! Decoding accepts the legacy kind names `IMAGE`/`IMG` (DATA) and `MSK` (MASK).

use std::fmt;
use std::str::FromStr;

use crate::error::PyramidError;

const B36_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

// =============================================================================
// Slab Kind
// =============================================================================

/// Content of a slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlabKind {
    Data,
    Mask,
}

impl SlabKind {
    pub fn name(&self) -> &'static str {
        match self {
            SlabKind::Data => "DATA",
            SlabKind::Mask => "MASK",
        }
    }
}

impl fmt::Display for SlabKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SlabKind {
    type Err = PyramidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DATA" | "IMAGE" | "IMG" => Ok(SlabKind::Data),
            "MASK" | "MSK" => Ok(SlabKind::Mask),
            other => Err(PyramidError::format(
                "slab kind",
                other,
                "expected DATA or MASK",
            )),
        }
    }
}

/// Slab identity decoded from a storage path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlabInfos {
    pub kind: SlabKind,
    pub level: String,
    pub column: u64,
    pub row: u64,
}

// =============================================================================
// Base-36
// =============================================================================

/// Base-36 representation of `number`, upper case, `"0"` for zero.
pub fn b36_encode(mut number: u64) -> String {
    if number == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while number > 0 {
        digits.push(B36_ALPHABET[(number % 36) as usize]);
        number /= 36;
    }
    digits.reverse();

    digits.into_iter().map(char::from).collect()
}

/// Parse a base-36 number, case-insensitive.
pub fn b36_decode(number: &str) -> Result<u64, PyramidError> {
    u64::from_str_radix(number, 36)
        .map_err(|e| PyramidError::format("base-36 number", number, e))
}

/// Slab path relative to the level directory, for a FILE pyramid.
///
/// Column and row are left-padded with `0` to `max(depth + 1, digits)`, and
/// their digits are paired from the most significant. The last `depth` pairs
/// are each preceded by a `/`.
pub fn encode_file_path(column: u64, row: u64, depth: usize) -> String {
    let column = b36_encode(column);
    let row = b36_encode(row);
    let width = (depth + 1).max(column.len()).max(row.len());

    let column = format!("{:0>width$}", column, width = width);
    let row = format!("{:0>width$}", row, width = width);

    let mut path = String::with_capacity(3 * width + 4);
    for (i, (c, r)) in column.chars().zip(row.chars()).enumerate() {
        if i > 0 && i >= width - depth {
            path.push('/');
        }
        path.push(c);
        path.push(r);
    }
    path.push_str(".tif");

    path
}

/// Slab column and row from a FILE pyramid slab path.
///
/// Separators are ignored and a `.tif`/`.tiff` suffix is stripped.
pub fn decode_file_path(path: &str) -> Result<(u64, u64), PyramidError> {
    let mut digits: String = path.chars().filter(|c| *c != '/').collect();
    digits.make_ascii_uppercase();

    let digits = digits
        .strip_suffix(".TIFF")
        .or_else(|| digits.strip_suffix(".TIF"))
        .unwrap_or(&digits);

    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(PyramidError::format(
            "base-36 slab path",
            path,
            "odd number of digits",
        ));
    }

    let (column, row): (String, String) = digits
        .as_bytes()
        .chunks(2)
        .map(|pair| (char::from(pair[0]), char::from(pair[1])))
        .unzip();

    Ok((b36_decode(&column)?, b36_decode(&row)?))
}

/// Slab identity from a FILE slab path `.../<KIND>/<level>/<b36 path>`.
pub fn decode_file_slab_path(path: &str, depth: usize) -> Result<SlabInfos, PyramidError> {
    let parts: Vec<&str> = path.split('/').collect();

    if parts.len() < depth + 3 {
        return Err(PyramidError::format(
            "FILE slab path",
            path,
            format!("expected at least {} segments", depth + 3),
        ));
    }

    let b36_start = parts.len() - (depth + 1);
    let (column, row) = decode_file_path(&parts[b36_start..].join("/"))?;

    Ok(SlabInfos {
        kind: parts[b36_start - 2].parse()?,
        level: parts[b36_start - 1].to_string(),
        column,
        row,
    })
}

// =============================================================================
// Object keys
// =============================================================================

/// Flat slab key of an object pyramid.
pub fn encode_object_key(kind: SlabKind, level: &str, column: u64, row: u64) -> String {
    format!("{}_{}_{}_{}", kind, level, column, row)
}

/// Slab identity from the last four `/`- or `_`-separated tokens of a key.
pub fn decode_object_key(key: &str) -> Result<SlabInfos, PyramidError> {
    let tokens: Vec<&str> = key.split(['/', '_']).collect();

    let [kind, level, column, row] = match tokens.as_slice() {
        [.., kind, level, column, row] => [*kind, *level, *column, *row],
        _ => {
            return Err(PyramidError::format(
                "slab key",
                key,
                "expected <KIND>_<level>_<col>_<row>",
            ))
        }
    };

    let index = |value: &str| {
        value
            .parse::<u64>()
            .map_err(|e| PyramidError::format("slab key", key, e))
    };

    Ok(SlabInfos {
        kind: kind.parse()?,
        level: level.to_string(),
        column: index(column)?,
        row: index(row)?,
    })
}
