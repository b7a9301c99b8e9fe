pub mod backend;

/// Reference GPU drivers for the Lumen engine.
pub mod backends {
    /// Driver that accepts everything and draws nothing
    pub mod null;
    /// Driver that records every call, used to verify the synchronization protocol
    pub mod recording;
    /// Driver that executes command lists on the CPU
    pub mod software;
}

pub mod bitmap;
pub mod errors;
pub mod geometry;
pub mod gpu;
pub mod matrix;
pub mod raster;
pub mod surface;
pub mod tessellate;

mod display_list;
pub use display_list::*;

mod viewport;

pub use bitmap::{Bitmap, BitmapFormat};
pub use errors::{BitmapError, DriverError, RenderError, ResourceKind, SurfaceError};
pub use geometry::{IntRect, Point, Rect};
pub use matrix::{Matrix, Matrix4x4};
pub use viewport::Viewport;
