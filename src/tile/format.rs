//! Pyramid tile formats.
//!
//! The format string of a descriptor names how slabs are compressed and which
//! pixel type they hold, e.g. `TIFF_JPG_UINT8` or `TIFF_ZIP_FLOAT32`. Vector
//! pyramids use `TIFF_PBF_MVT`.

use std::fmt;
use std::str::FromStr;

use crate::error::PyramidError;

/// Raster or vector content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PyramidType {
    Raster,
    Vector,
}

impl PyramidType {
    pub fn name(&self) -> &'static str {
        match self {
            PyramidType::Raster => "RASTER",
            PyramidType::Vector => "VECTOR",
        }
    }
}

impl fmt::Display for PyramidType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pixel sample type of raster formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    UInt8,
    Float32,
}

impl SampleType {
    /// Bytes per sample.
    pub fn size(&self) -> usize {
        match self {
            SampleType::UInt8 => 1,
            SampleType::Float32 => 4,
        }
    }
}

/// Every format a pyramid can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileFormat {
    RawUInt8,
    RawFloat32,
    LzwUInt8,
    LzwFloat32,
    ZipUInt8,
    ZipFloat32,
    PkbUInt8,
    PkbFloat32,
    JpgUInt8,
    Jpg90UInt8,
    PngUInt8,
    PbfMvt,
}

impl TileFormat {
    pub const ALL: [TileFormat; 12] = [
        TileFormat::RawUInt8,
        TileFormat::RawFloat32,
        TileFormat::LzwUInt8,
        TileFormat::LzwFloat32,
        TileFormat::ZipUInt8,
        TileFormat::ZipFloat32,
        TileFormat::PkbUInt8,
        TileFormat::PkbFloat32,
        TileFormat::JpgUInt8,
        TileFormat::Jpg90UInt8,
        TileFormat::PngUInt8,
        TileFormat::PbfMvt,
    ];

    /// Name as written in descriptors.
    pub fn name(&self) -> &'static str {
        match self {
            TileFormat::RawUInt8 => "TIFF_RAW_UINT8",
            TileFormat::RawFloat32 => "TIFF_RAW_FLOAT32",
            TileFormat::LzwUInt8 => "TIFF_LZW_UINT8",
            TileFormat::LzwFloat32 => "TIFF_LZW_FLOAT32",
            TileFormat::ZipUInt8 => "TIFF_ZIP_UINT8",
            TileFormat::ZipFloat32 => "TIFF_ZIP_FLOAT32",
            TileFormat::PkbUInt8 => "TIFF_PKB_UINT8",
            TileFormat::PkbFloat32 => "TIFF_PKB_FLOAT32",
            TileFormat::JpgUInt8 => "TIFF_JPG_UINT8",
            TileFormat::Jpg90UInt8 => "TIFF_JPG90_UINT8",
            TileFormat::PngUInt8 => "TIFF_PNG_UINT8",
            TileFormat::PbfMvt => "TIFF_PBF_MVT",
        }
    }

    /// Extension of a standalone tile in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::JpgUInt8 | TileFormat::Jpg90UInt8 => "jpg",
            TileFormat::PngUInt8 => "png",
            TileFormat::PbfMvt => "pbf",
            _ => "tif",
        }
    }

    pub fn pyramid_type(&self) -> PyramidType {
        match self {
            TileFormat::PbfMvt => PyramidType::Vector,
            _ => PyramidType::Raster,
        }
    }

    /// Sample type, `None` for vector tiles.
    pub fn sample_type(&self) -> Option<SampleType> {
        match self {
            TileFormat::RawFloat32
            | TileFormat::LzwFloat32
            | TileFormat::ZipFloat32
            | TileFormat::PkbFloat32 => Some(SampleType::Float32),
            TileFormat::PbfMvt => None,
            _ => Some(SampleType::UInt8),
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TileFormat {
    type Err = PyramidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TileFormat::ALL
            .iter()
            .find(|f| f.name() == s)
            .copied()
            .ok_or_else(|| PyramidError::format("pyramid format", s, "unknown format"))
    }
}
