//! Raster tile decoding.
//!
//! Tiles are decoded into a `height x width x channels` sample buffer, row
//! major, channels interleaved. JPEG and PNG tiles are decoded with `image`,
//! ZIP tiles are zlib streams of raw samples, and float samples are little
//! endian.

use std::io::Read;

use flate2::read::ZlibDecoder;
use image::ImageFormat;

use super::format::{SampleType, TileFormat};
use crate::error::PyramidError;

/// Decoded samples.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterData {
    UInt8(Vec<u8>),
    Float32(Vec<f32>),
}

impl RasterData {
    pub fn len(&self) -> usize {
        match self {
            RasterData::UInt8(data) => data.len(),
            RasterData::Float32(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A decoded raster tile.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterTile {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub data: RasterData,
}

impl RasterTile {
    /// `(height, width, channels)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, self.channels as usize)
    }

    /// Sample of a pixel channel, `None` outside the tile.
    pub fn sample(&self, row: u32, column: u32, channel: u32) -> Option<f32> {
        if row >= self.height || column >= self.width || channel >= self.channels {
            return None;
        }

        let index = ((row * self.width + column) * self.channels + channel) as usize;
        match &self.data {
            RasterData::UInt8(data) => data.get(index).map(|v| *v as f32),
            RasterData::Float32(data) => data.get(index).copied(),
        }
    }
}

/// Decode a tile of a raster pyramid.
pub fn decode(
    format: TileFormat,
    data: &[u8],
    width: u32,
    height: u32,
    channels: u32,
) -> Result<RasterTile, PyramidError> {
    let samples = match format {
        TileFormat::JpgUInt8 | TileFormat::Jpg90UInt8 => {
            decode_image(data, ImageFormat::Jpeg, width, height, channels)?
        }
        TileFormat::PngUInt8 => decode_image(data, ImageFormat::Png, width, height, channels)?,
        TileFormat::RawUInt8 | TileFormat::RawFloat32 => {
            reshape(format, data.to_vec(), width, height, channels)?
        }
        TileFormat::ZipUInt8 | TileFormat::ZipFloat32 => {
            let mut inflated = Vec::new();
            ZlibDecoder::new(data)
                .read_to_end(&mut inflated)
                .map_err(|e| PyramidError::format(format.name(), "tile", e))?;
            reshape(format, inflated, width, height, channels)?
        }
        TileFormat::LzwUInt8
        | TileFormat::LzwFloat32
        | TileFormat::PkbUInt8
        | TileFormat::PkbFloat32 => {
            return Err(PyramidError::NotImplemented(format!(
                "Cannot decode tile with format {}",
                format
            )))
        }
        TileFormat::PbfMvt => {
            return Err(PyramidError::Invalid(format!(
                "Cannot get raster data for a vector pyramid ({})",
                format
            )))
        }
    };

    Ok(RasterTile {
        width,
        height,
        channels,
        data: samples,
    })
}

fn decode_image(
    data: &[u8],
    image_format: ImageFormat,
    width: u32,
    height: u32,
    channels: u32,
) -> Result<RasterData, PyramidError> {
    let name = format!("{:?}", image_format);
    let image = image::load_from_memory_with_format(data, image_format)
        .map_err(|e| PyramidError::format(name.as_str(), "tile", e))?;

    if image.width() != width || image.height() != height {
        return Err(PyramidError::format(
            name.as_str(),
            "tile",
            format!(
                "{}x{} image, {}x{} expected",
                image.width(),
                image.height(),
                width,
                height
            ),
        ));
    }

    let samples = match channels {
        1 => image.to_luma8().into_raw(),
        2 => image.to_luma_alpha8().into_raw(),
        3 => image.to_rgb8().into_raw(),
        4 => image.to_rgba8().into_raw(),
        other => {
            return Err(PyramidError::format(
                name.as_str(),
                "tile",
                format!("{} channels cannot be read from an image", other),
            ))
        }
    };

    Ok(RasterData::UInt8(samples))
}

fn reshape(
    format: TileFormat,
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u32,
) -> Result<RasterData, PyramidError> {
    let sample = format.sample_type().unwrap_or(SampleType::UInt8);
    let expected = width as usize * height as usize * channels as usize * sample.size();

    if data.len() != expected {
        return Err(PyramidError::format(
            format.name(),
            "tile",
            format!("{} bytes, {} expected", data.len(), expected),
        ));
    }

    Ok(match sample {
        SampleType::UInt8 => RasterData::UInt8(data),
        SampleType::Float32 => RasterData::Float32(
            data.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        ),
    })
}
