//! CPU pixel surfaces.
//!
//! Views on the CPU path paint into a [`Surface`]: a lockable block of
//! premultiplied BGRA pixels with a dirty rectangle. The host reads the pixels
//! back (or uploads them) whenever the dirty rectangle is not empty and clears
//! it afterwards. Hosts that want the pixels somewhere special, for example
//! directly in a mapped GPU buffer, provide their own [`SurfaceFactory`].

use crate::render::bitmap::{Bitmap, BitmapFormat};
use crate::render::errors::SurfaceError;
use crate::render::geometry::IntRect;
use std::any::Any;

/// Offscreen pixel buffer owned by a view.
///
/// Lock state machine: unlocked → [`lock_pixels`](Surface::lock_pixels) →
/// locked → [`unlock_pixels`](Surface::unlock_pixels) → unlocked. Resizing is
/// only legal while unlocked.
pub trait Surface: Any {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Bytes between the starts of two rows.
    fn row_bytes(&self) -> u32;

    /// Size of the pixel buffer in bytes.
    fn size(&self) -> usize;

    /// Locks the pixel buffer for access. Locking twice is an error.
    fn lock_pixels(&mut self) -> Result<&mut [u8], SurfaceError>;

    fn unlock_pixels(&mut self) -> Result<(), SurfaceError>;

    fn is_locked(&self) -> bool;

    /// Reallocates the buffer for the new size. Content is lost and the dirty
    /// bounds are reset. Fails with [`SurfaceError::Locked`] while locked.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError>;

    fn dirty_region(&self) -> IntRect;
    fn dirty_region_mut(&mut self) -> &mut IntRect;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Grows the dirty bounds to also cover `bounds`.
    fn set_dirty_bounds(&mut self, bounds: IntRect) {
        let region = self.dirty_region_mut();
        *region = region.union(&bounds);
    }

    fn dirty_bounds(&self) -> IntRect {
        self.dirty_region()
    }

    fn clear_dirty_bounds(&mut self) {
        *self.dirty_region_mut() = IntRect::EMPTY;
    }
}

/// Runs `f` with the surface's pixels locked and unlocks afterwards.
pub fn with_locked_pixels<R>(
    surface: &mut dyn Surface,
    f: impl FnOnce(&mut [u8], u32) -> R,
) -> Result<R, SurfaceError> {
    let row_bytes = surface.row_bytes();
    let pixels = surface.lock_pixels()?;
    let result = f(pixels, row_bytes);
    surface.unlock_pixels()?;
    Ok(result)
}

fn checked_size(width: u32, height: u32) -> Result<(), SurfaceError> {
    let bytes = (width as u64) * (height as u64) * 4;
    if width.checked_mul(4).is_none() || bytes > isize::MAX as u64 {
        return Err(SurfaceError::TooLarge { width, height });
    }
    Ok(())
}

/// Default surface, backed by an owned [`Bitmap`].
#[derive(Debug)]
pub struct BitmapSurface {
    bitmap: Bitmap,
    locked: bool,
    dirty: IntRect,
}

impl BitmapSurface {
    pub fn new(width: u32, height: u32) -> Result<Self, SurfaceError> {
        checked_size(width, height)?;
        Ok(Self {
            bitmap: Bitmap::new(width, height, BitmapFormat::Bgra8UnormPremultiplied),
            locked: false,
            dirty: IntRect::EMPTY,
        })
    }

    /// The backing bitmap, for reading pixels or writing PNGs.
    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }
}

impl Surface for BitmapSurface {
    fn width(&self) -> u32 {
        self.bitmap.width()
    }

    fn height(&self) -> u32 {
        self.bitmap.height()
    }

    fn row_bytes(&self) -> u32 {
        self.bitmap.row_bytes()
    }

    fn size(&self) -> usize {
        self.bitmap.size()
    }

    fn lock_pixels(&mut self) -> Result<&mut [u8], SurfaceError> {
        if self.locked {
            return Err(SurfaceError::Locked);
        }
        self.locked = true;
        Ok(self.bitmap.pixels_mut())
    }

    fn unlock_pixels(&mut self) -> Result<(), SurfaceError> {
        if !self.locked {
            return Err(SurfaceError::NotLocked);
        }
        self.locked = false;
        Ok(())
    }

    fn is_locked(&self) -> bool {
        self.locked
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        if self.locked {
            return Err(SurfaceError::Locked);
        }
        checked_size(width, height)?;
        if width != self.bitmap.width() || height != self.bitmap.height() {
            self.bitmap.reallocate(width, height);
        }
        self.dirty = IntRect::EMPTY;
        Ok(())
    }

    fn dirty_region(&self) -> IntRect {
        self.dirty
    }

    fn dirty_region_mut(&mut self) -> &mut IntRect {
        &mut self.dirty
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Creates and destroys the surfaces of CPU-path views.
pub trait SurfaceFactory {
    fn create_surface(&mut self, width: u32, height: u32) -> Result<Box<dyn Surface>, SurfaceError>;

    /// Takes back a surface created by this factory.
    fn destroy_surface(&mut self, surface: Box<dyn Surface>);
}

/// Factory for [`BitmapSurface`]s.
#[derive(Debug, Default)]
pub struct BitmapSurfaceFactory;

impl SurfaceFactory for BitmapSurfaceFactory {
    fn create_surface(&mut self, width: u32, height: u32) -> Result<Box<dyn Surface>, SurfaceError> {
        Ok(Box::new(BitmapSurface::new(width, height)?))
    }

    fn destroy_surface(&mut self, surface: Box<dyn Surface>) {
        log::trace!("destroying {}x{} bitmap surface", surface.width(), surface.height());
        drop(surface);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_bounds_union_and_clear() {
        let mut s = BitmapSurface::new(100, 100).unwrap();
        assert!(s.dirty_bounds().is_empty());
        s.set_dirty_bounds(IntRect::new(10, 10, 20, 20));
        s.set_dirty_bounds(IntRect::new(50, 0, 60, 15));
        assert_eq!(s.dirty_bounds(), IntRect::new(10, 0, 60, 20));
        s.clear_dirty_bounds();
        assert!(s.dirty_bounds().is_empty());
    }

    #[test]
    fn lock_state_machine() {
        let mut s = BitmapSurface::new(4, 4).unwrap();
        assert_eq!(s.unlock_pixels(), Err(SurfaceError::NotLocked));
        assert_eq!(s.lock_pixels().unwrap().len(), 64);
        assert!(s.is_locked());
        assert_eq!(s.lock_pixels().err(), Some(SurfaceError::Locked));
        s.unlock_pixels().unwrap();
        assert!(!s.is_locked());
    }

    #[test]
    fn resize_while_locked_is_rejected() {
        let mut s = BitmapSurface::new(10, 10).unwrap();
        s.set_dirty_bounds(IntRect::new(0, 0, 5, 5));
        s.lock_pixels().unwrap();
        assert_eq!(s.resize(20, 20), Err(SurfaceError::Locked));
        assert_eq!(s.width(), 10);
        assert_eq!(s.dirty_bounds(), IntRect::new(0, 0, 5, 5));

        s.unlock_pixels().unwrap();
        s.resize(20, 30).unwrap();
        assert_eq!((s.width(), s.height(), s.row_bytes()), (20, 30, 80));
        assert_eq!(s.size(), 20 * 30 * 4);
        assert!(s.dirty_bounds().is_empty());
    }

    #[test]
    fn with_locked_pixels_unlocks_afterwards() {
        let mut s: Box<dyn Surface> = BitmapSurfaceFactory.create_surface(2, 2).unwrap();
        let stride = with_locked_pixels(s.as_mut(), |px, stride| {
            px[0] = 0xff;
            stride
        })
        .unwrap();
        assert_eq!(stride, 8);
        assert!(!s.is_locked());
        let bmp = s.as_any().downcast_ref::<BitmapSurface>().unwrap().bitmap();
        assert_eq!(bmp.pixels()[0], 0xff);
    }

    #[test]
    fn oversized_surfaces_are_rejected() {
        assert!(matches!(BitmapSurface::new(u32::MAX, 2), Err(SurfaceError::TooLarge { .. })));
    }
}
