//! Viewport definition for rendering.
//!
//! A [`Viewport`] is the pixel size of the target a [`View`](crate::engine::view::View)
//! paints into. It is copied into every [`GpuState`](crate::render::gpu::state::GpuState)
//! so drivers can build their screen-space projection.
//!
//! # Examples
//!
//! ```
//! use lumen_engine::render::Viewport;
//!
//! let mut vp = Viewport::new(800, 600);
//! vp.resize(1024, 768);
//! assert_eq!(vp.width, 1024);
//! assert_eq!(vp.aspect_ratio(), 1024.0 / 768.0);
//! ```

use crate::render::geometry::IntRect;
use crate::render::matrix::Matrix;

/// Represents the viewport for rendering.
#[derive(Clone, Eq, PartialEq, Copy, Default)]
pub struct Viewport {
    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,
}

impl std::fmt::Debug for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Viewport {{ width: {}, height: {} }}", self.width, self.height)
    }
}

impl Viewport {
    /// Creates a new [`Viewport`] with the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Resizes the viewport to the given width and height.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Returns the aspect ratio (`width / height`) as `f32`.
    ///
    /// Returns `0.0` if `height` is `0` to avoid division by zero.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Full pixel bounds of the viewport.
    pub fn bounds(&self) -> IntRect {
        IntRect::from_size(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Screen-space orthographic projection for this viewport.
    pub fn projection(&self, flip_y: bool) -> Matrix {
        Matrix::orthographic_projection(self.width as f64, self.height as f64, flip_y)
    }

    /// `(width, height, 1/width, 1/height)`, the layout of the first uniform vector.
    pub fn uniform_vector(&self) -> [f32; 4] {
        let w = self.width.max(1) as f32;
        let h = self.height.max(1) as f32;
        [self.width as f32, self.height as f32, 1.0 / w, 1.0 / h]
    }
}
