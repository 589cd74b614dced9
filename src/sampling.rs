//! Pixel access and interpolation shared by the canonicalizer and the cascade backend.

use image::RgbImage;
use ndarray::ArrayView3;

use crate::error::{Error, Result};

/// Read access to a three-channel pixel grid.
pub trait PixelSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Channel `c` (0..3) of the pixel at `(x, y)`. Coordinates are always in bounds.
    fn texel(&self, x: u32, y: u32, c: usize) -> f32;
}

impl PixelSource for RgbImage {
    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }

    fn texel(&self, x: u32, y: u32, c: usize) -> f32 {
        f32::from(self.get_pixel(x, y)[c])
    }
}

/// A `height x width x channels` tensor viewed as pixels.
///
/// One channel is broadcast to RGB; a fourth (alpha) channel is ignored.
#[derive(Debug, Clone, Copy)]
pub struct TensorPixels<'a> {
    view: ArrayView3<'a, f32>,
    gray: bool,
}

impl<'a> TensorPixels<'a> {
    pub fn new(view: ArrayView3<'a, f32>) -> Result<Self> {
        let (height, width, channels) = view.dim();
        if width == 0 || height == 0 {
            return Err(Error::invalid_input(format!(
                "tensor has zero size: {height}x{width}x{channels}"
            )));
        }
        let gray = match channels {
            1 => true,
            3 | 4 => false,
            n => {
                return Err(Error::invalid_input(format!(
                    "unsupported channel count {n}, expected 1, 3 or 4"
                )))
            }
        };
        Ok(Self { view, gray })
    }
}

impl PixelSource for TensorPixels<'_> {
    fn width(&self) -> u32 {
        self.view.dim().1 as u32
    }

    fn height(&self) -> u32 {
        self.view.dim().0 as u32
    }

    fn texel(&self, x: u32, y: u32, c: usize) -> f32 {
        let c = if self.gray { 0 } else { c };
        self.view[[y as usize, x as usize, c]]
    }
}

/// Sample channel `c` with bilinear interpolation, clamping to the nearest edge pixel.
#[inline]
pub fn sample_bilinear<P: PixelSource + ?Sized>(src: &P, x: f32, y: f32, c: usize) -> f32 {
    let max_x = src.width().saturating_sub(1) as f32;
    let max_y = src.height().saturating_sub(1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let x0 = x0 as u32;
    let y0 = y0 as u32;
    let x1 = (x0 + 1).min(max_x as u32);
    let y1 = (y0 + 1).min(max_y as u32);

    let p00 = src.texel(x0, y0, c);
    let p10 = src.texel(x1, y0, c);
    let p01 = src.texel(x0, y1, c);
    let p11 = src.texel(x1, y1, c);

    let top = p00 * (1.0 - fx) + p10 * fx;
    let bottom = p01 * (1.0 - fx) + p11 * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Rec. 601 luma at a sub-pixel position; 0 outside the image.
pub fn sample_luminance<P: PixelSource + ?Sized>(src: &P, x: f32, y: f32) -> f32 {
    if x < 0.0 || y < 0.0 || x > src.width() as f32 - 1.0 || y > src.height() as f32 - 1.0 {
        return 0.0;
    }
    0.299 * sample_bilinear(src, x, y, 0)
        + 0.587 * sample_bilinear(src, x, y, 1)
        + 0.114 * sample_bilinear(src, x, y, 2)
}
