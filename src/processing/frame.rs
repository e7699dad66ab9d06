use anyhow::Context;
use fast_image_resize as fir;
use image::{ImageReader, RgbaImage, imageops};
use std::io::Cursor;
use tracing::debug;

use crate::error::{Error, Result};
use crate::events::DisplayFrame;
use crate::processing::layout::{center_crop_top, scale_to_width};

/// Counter-clockwise rotation applied to every decoded photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Ccw90,
    Ccw180,
    Ccw270,
}

impl Rotation {
    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Self::None),
            90 => Some(Self::Ccw90),
            180 => Some(Self::Ccw180),
            270 => Some(Self::Ccw270),
            _ => None,
        }
    }

    fn apply(self, img: RgbaImage) -> RgbaImage {
        // imageops rotates clockwise
        match self {
            Self::None => img,
            Self::Ccw90 => imageops::rotate270(&img),
            Self::Ccw180 => imageops::rotate180(&img),
            Self::Ccw270 => imageops::rotate90(&img),
        }
    }
}

/// Turns downloaded bytes into a frame that exactly covers the display.
#[derive(Debug, Clone, Copy)]
pub struct ImageProcessor {
    rotation: Rotation,
}

impl ImageProcessor {
    pub fn new(rotation: Rotation) -> Self {
        Self { rotation }
    }

    /// Decode, rotate, scale to `target_w` and center-crop to `target_h`.
    ///
    /// An image whose scaled height falls short of `target_h` is rejected with
    /// [`Error::FrameSize`]; nothing is ever padded or stretched.
    pub fn process(&self, raw: &[u8], target_w: u32, target_h: u32) -> Result<DisplayFrame> {
        if target_w == 0 || target_h == 0 {
            return Err(Error::Other(anyhow::anyhow!(
                "display dimensions must be positive (got {target_w}x{target_h})"
            )));
        }

        let decoded = ImageReader::new(Cursor::new(raw))
            .with_guessed_format()
            .context("failed to read image header")?
            .decode()?;
        let rotated = self.rotation.apply(decoded.to_rgba8());
        debug!(
            width = rotated.width(),
            height = rotated.height(),
            "image decoded"
        );

        let (scaled_w, scaled_h) = scale_to_width(rotated.width(), rotated.height(), target_w);
        let Some(crop_top) = center_crop_top(scaled_h, target_h) else {
            return Err(Error::FrameSize {
                width: scaled_w,
                height: scaled_h,
                target_height: target_h,
            });
        };

        let scaled = resize_rgba(&rotated, scaled_w, scaled_h)?;
        let cropped = imageops::crop_imm(&scaled, 0, crop_top, target_w, target_h).to_image();
        Ok(DisplayFrame {
            width: cropped.width(),
            height: cropped.height(),
            pixels: cropped.into_raw(),
        })
    }
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new(Rotation::Ccw270)
    }
}

/// Resample `source` to exactly `target_w × target_h`.
pub fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    if target_w == 0 || target_h == 0 {
        return Err(Error::Other(anyhow::anyhow!(
            "resize dimensions must be positive"
        )));
    }
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("photo resize failed")?;
    let buffer = dst_image.into_vec();
    RgbaImage::from_raw(target_w, target_h, buffer)
        .ok_or_else(|| Error::Other(anyhow::anyhow!("failed to construct resized RGBA image")))
}
