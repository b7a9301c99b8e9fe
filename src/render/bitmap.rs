//! Owned pixel bitmaps.
//!
//! Bitmaps back the default CPU [`Surface`](crate::render::surface::Surface), carry image
//! data for texture uploads, and double as render-to-texture requests when empty.

use crate::render::errors::BitmapError;
use crate::render::Color;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Pixel formats understood by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BitmapFormat {
    /// Single 8-bit alpha channel.
    A8Unorm,
    /// Premultiplied BGRA, 8 bits per channel. The native surface format.
    Bgra8UnormPremultiplied,
}

impl BitmapFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            BitmapFormat::A8Unorm => 1,
            BitmapFormat::Bgra8UnormPremultiplied => 4,
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    format: BitmapFormat,
    row_bytes: u32,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// Allocates a zeroed (fully transparent) bitmap.
    pub fn new(width: u32, height: u32, format: BitmapFormat) -> Self {
        let row_bytes = width * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            row_bytes,
            pixels: vec![0u8; row_bytes as usize * height as usize],
        }
    }

    /// A 0×0 bitmap. Passed to `create_texture` it requests a render-to-texture target.
    pub fn empty() -> Self {
        Self::new(0, 0, BitmapFormat::Bgra8UnormPremultiplied)
    }

    /// Wraps existing pixel data. `row_bytes` may include row padding.
    pub fn from_pixels(
        width: u32,
        height: u32,
        format: BitmapFormat,
        row_bytes: u32,
        pixels: Vec<u8>,
    ) -> Result<Self, BitmapError> {
        if row_bytes < width * format.bytes_per_pixel() {
            return Err(BitmapError::RowBytesTooSmall { row_bytes, width });
        }
        let expected = row_bytes as usize * height as usize;
        if pixels.len() < expected {
            return Err(BitmapError::BufferTooSmall { expected, actual: pixels.len() });
        }
        Ok(Self { width, height, format, row_bytes, pixels })
    }

    /// A BGRA bitmap filled with a single color.
    pub fn solid(width: u32, height: u32, color: Color) -> Self {
        let mut bmp = Self::new(width, height, BitmapFormat::Bgra8UnormPremultiplied);
        let px = color.to_bgra_premultiplied();
        for chunk in bmp.pixels.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
        bmp
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> BitmapFormat {
        self.format
    }

    #[inline]
    pub fn bpp(&self) -> u32 {
        self.format.bytes_per_pixel()
    }

    #[inline]
    pub fn row_bytes(&self) -> u32 {
        self.row_bytes
    }

    /// Size of the pixel buffer in bytes.
    pub fn size(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Resets every pixel to zero.
    pub fn erase(&mut self) {
        self.pixels.fill(0);
    }

    /// Reallocates the bitmap for a new size, discarding the content.
    pub fn reallocate(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height, self.format);
    }

    /// Raw bytes of the pixel at `(x, y)`, `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.bpp() as usize;
        let at = y as usize * self.row_bytes as usize + x as usize * bpp;
        self.pixels.get(at..at + bpp)
    }

    /// Swaps the red and blue channels in place (BGRA <-> RGBA).
    pub fn swap_red_blue(&mut self) {
        if self.format != BitmapFormat::Bgra8UnormPremultiplied || self.is_empty() || self.row_bytes == 0 {
            return;
        }
        let row_len = self.width as usize * 4;
        for row in self.pixels.chunks_mut(self.row_bytes as usize) {
            let n = row_len.min(row.len());
            for px in row[..n].chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }
    }

    /// Tightly packed, straight-alpha RGBA copy of the pixels.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            for x in 0..self.width {
                let Some(px) = self.pixel(x, y) else { continue };
                match self.format {
                    BitmapFormat::A8Unorm => out.extend_from_slice(&[0, 0, 0, px[0]]),
                    BitmapFormat::Bgra8UnormPremultiplied => {
                        let a = px[3];
                        let unmul = |c: u8| -> u8 {
                            if a == 0 {
                                0
                            } else {
                                ((c as u32 * 255 + a as u32 / 2) / a as u32).min(255) as u8
                            }
                        };
                        out.extend_from_slice(&[unmul(px[2]), unmul(px[1]), unmul(px[0]), a]);
                    }
                }
            }
        }
        out
    }

    /// Writes the bitmap to `path` as an 8-bit RGBA PNG.
    pub fn write_png(&self, path: impl AsRef<Path>) -> Result<(), BitmapError> {
        if self.is_empty() {
            return Err(BitmapError::Empty);
        }
        let file = File::create(path.as_ref())?;
        let mut encoder = png::Encoder::new(BufWriter::new(file), self.width, self.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.to_rgba8())?;
        writer.finish()?;

        log::debug!("wrote {}x{} bitmap to {}", self.width, self.height, path.as_ref().display());
        Ok(())
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("len", &self.pixels.len())
            .finish()
    }
}
