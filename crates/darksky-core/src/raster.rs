use std::path::Path;

use image::{ColorType, DynamicImage};
use log::info;
#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::classify::{class_for_rgb, classify_sample, luminance_for_class, NO_DATA};
use crate::coords::{to_geo, to_pixel, GeoCoordinate, PixelCoordinate};
use crate::error::{DarkSkyError, Result};

/// How the source image stored its brightness values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterEncoding {
    /// One luminance byte per pixel (or RGB with identical channels).
    Luminance,
    /// Colour ramp, re-encoded to luminance through nearest-colour matching.
    LegacyPalette,
}

/// The decoded light-pollution raster: one brightness byte per pixel,
/// row-major, covering latitudes -65..75 and longitudes -180..180.
/// Read-only once constructed.
#[derive(Debug, Clone)]
pub struct RasterSource {
    data: Vec<u8>,
    width: u32,
    height: u32,
    encoding: RasterEncoding,
}

impl RasterSource {
    /// Build a raster from raw luminance samples.
    pub fn from_samples(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 || data.len() != width as usize * height as usize {
            return Err(DarkSkyError::RasterDimensions { width, height, len: data.len() });
        }
        Ok(Self { data, width, height, encoding: RasterEncoding::Luminance })
    }

    /// Load and decode an image file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| DarkSkyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raster = Self::from_image_bytes(&bytes)?;
        info!(
            "Loaded raster {} ({}x{}, {:?})",
            path.display(),
            raster.width,
            raster.height,
            raster.encoding
        );
        Ok(raster)
    }

    /// Decode an in-memory encoded image (PNG, JPEG, TIFF).
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes)?;
        Self::from_image(img)
    }

    pub fn from_image(img: DynamicImage) -> Result<Self> {
        let (width, height) = (img.width(), img.height());
        match img.color() {
            ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16 => {
                Self::from_samples(width, height, img.to_luma8().into_raw())
            }
            _ => {
                let rgb = img.to_rgb8().into_raw();
                let (data, encoding) = reduce_rgb(&rgb);
                let mut raster = Self::from_samples(width, height, data)?;
                raster.encoding = encoding;
                Ok(raster)
            }
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn encoding(&self) -> RasterEncoding {
        self.encoding
    }

    /// Sample a pixel. Pixels come from [`to_pixel`], which never produces
    /// out-of-range indices for this raster's dimensions.
    #[inline]
    pub fn sample(&self, pixel: PixelCoordinate) -> u8 {
        self.data[pixel.index(self.width)]
    }

    pub fn pixel_at(&self, coord: GeoCoordinate) -> PixelCoordinate {
        to_pixel(coord, self.width, self.height)
    }

    pub fn coordinate_of(&self, pixel: PixelCoordinate) -> GeoCoordinate {
        to_geo(pixel, self.width, self.height)
    }

    /// Brightness class at a coordinate, or `None` if the pixel holds no data.
    pub fn classify_at(&self, coord: GeoCoordinate) -> Option<f64> {
        classify_sample(self.sample(self.pixel_at(coord)))
    }
}

/// Collapse interleaved RGB to one byte per pixel. Grey images keep their red
/// channel as-is; anything else goes through the palette classifier.
fn reduce_rgb(rgb: &[u8]) -> (Vec<u8>, RasterEncoding) {
    let grey = rgb.chunks_exact(3).all(|p| p[0] == p[1] && p[1] == p[2]);
    if grey {
        (map_pixels(rgb, |p| p[0]), RasterEncoding::Luminance)
    } else {
        (map_pixels(rgb, palette_to_luminance), RasterEncoding::LegacyPalette)
    }
}

fn palette_to_luminance(p: &[u8]) -> u8 {
    let rgb = [p[0], p[1], p[2]];
    if rgb == [0, 0, 0] {
        NO_DATA
    } else {
        luminance_for_class(class_for_rgb(rgb))
    }
}

#[cfg(feature = "threading")]
fn map_pixels(rgb: &[u8], f: fn(&[u8]) -> u8) -> Vec<u8> {
    rgb.par_chunks_exact(3).map(f).collect()
}

#[cfg(not(feature = "threading"))]
fn map_pixels(rgb: &[u8], f: fn(&[u8]) -> u8) -> Vec<u8> {
    rgb.chunks_exact(3).map(f).collect()
}
