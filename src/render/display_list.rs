//! Display lists and compositor layers.
//!
//! A [`DisplayList`] is what the page engine hands to the rendering core each
//! time a view's content changes: an ordered list of [`Layer`]s, each holding
//! [`DisplayItem`]s in paint order. The core never reorders items or layers;
//! overlapping translucent content depends on that order.
//!
//! Damage between frames is found by comparing layers by value, so a layer that
//! did not change should be handed over unchanged (same id, same items).
//!
//! # Example
//!
//! ```rust
//! use lumen_engine::render::{Color, DisplayItem, DisplayList, IntRect, Layer, LayerId};
//!
//! let mut layer = Layer::new(LayerId(1), IntRect::from_size(100, 100));
//! layer.push(DisplayItem::Clear { color: Color::WHITE });
//! layer.push(DisplayItem::Rect {
//!     x: 10.0,
//!     y: 10.0,
//!     w: 50.0,
//!     h: 50.0,
//!     color: Color::from_u8(255, 0, 0, 255),
//! });
//!
//! let mut list = DisplayList::new();
//! list.push_layer(layer);
//! assert_eq!(list.layers.len(), 1);
//! ```

use crate::render::bitmap::Bitmap;
use crate::render::errors::RenderError;
use crate::render::geometry::{IntRect, Point, Rect};
use crate::render::gpu::state::MAX_CLIPS;
use crate::render::matrix::Matrix;
use std::sync::Arc;

/// RGBA color used for drawing commands.
///
/// Channels are straight (not premultiplied) `f32` values in the range `0.0 ..= 1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    /// Red channel
    pub r: f32,
    /// Green channel
    pub g: f32,
    /// Blue channel
    pub b: f32,
    /// Alpha channel (opacity)
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color { r: 0.0, g: 0.0, b: 0.0, a: 0.0 };
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };

    /// Creates a new color from `f32` channel values in the range `0.0 ..= 1.0`.
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Color {
        Color { r, g, b, a }
    }

    /// Creates a new color from `u8` channel values in the range `0 ..= 255`.
    pub fn from_u8(r: u8, g: u8, b: u8, a: u8) -> Color {
        Color {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }

    /// Straight RGBA bytes, the vertex color layout.
    pub fn to_rgba8(&self) -> [u8; 4] {
        [to_u8(self.r), to_u8(self.g), to_u8(self.b), to_u8(self.a)]
    }

    /// Premultiplied BGRA bytes, the surface pixel layout.
    pub fn to_bgra_premultiplied(&self) -> [u8; 4] {
        let a = self.a.clamp(0.0, 1.0);
        [to_u8(self.b * a), to_u8(self.g * a), to_u8(self.r * a), to_u8(a)]
    }
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// A single display item representing a drawing command.
///
/// Coordinates are in the owning layer's local space.
#[derive(Clone, Debug, PartialEq)]
pub enum DisplayItem {
    /// Replace the whole layer bounds with the given color (no blending).
    Clear {
        /// The color to clear the layer with.
        color: Color,
    },

    /// Draw a filled rectangle at `(x, y)` with width `w` and height `h`.
    Rect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Color,
    },

    /// Fill a convex polygon. Fewer than three points draws nothing.
    Path {
        points: Vec<Point>,
        color: Color,
    },

    /// Draw an image stretched over the destination rectangle.
    Image {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        image: Arc<Bitmap>,
    },
}

/// How a layer's items combine with what is already in the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Premultiplied source-over.
    #[default]
    SourceOver,
    /// Overwrite the destination.
    Source,
}

/// A clip rectangle in layer-local space, positioned on screen by `transform`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Clip {
    pub rect: Rect,
    pub transform: Matrix,
}

impl Clip {
    pub fn new(rect: Rect, transform: Matrix) -> Self {
        Self { rect, transform }
    }

    /// Pixel-space bounds of the clip.
    pub fn device_bounds(&self) -> IntRect {
        self.transform.apply_rect(&self.rect).round_out()
    }
}

/// Identifies a compositor layer across frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

/// A compositor layer: items painted in order under one transform and clip stack.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    /// Local-space area the layer covers. `Clear` items fill exactly this.
    pub bounds: IntRect,
    /// Local to device transform.
    pub transform: Matrix,
    /// Nested clips, outermost first. At most [`MAX_CLIPS`] are supported.
    pub clips: Vec<Clip>,
    pub blend: BlendMode,
    pub items: Vec<DisplayItem>,
}

impl Layer {
    pub fn new(id: LayerId, bounds: IntRect) -> Self {
        Self {
            id,
            bounds,
            transform: Matrix::IDENTITY,
            clips: Vec::new(),
            blend: BlendMode::SourceOver,
            items: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Matrix) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_clip(mut self, clip: Clip) -> Self {
        self.clips.push(clip);
        self
    }

    pub fn push(&mut self, item: DisplayItem) {
        self.items.push(item);
    }

    /// Pixel-space area this layer can touch, clips included.
    pub fn device_bounds(&self) -> IntRect {
        let mut bounds = self.transform.apply_rect(&self.bounds.to_rect()).round_out();
        for clip in &self.clips {
            bounds = bounds.intersect(&clip.device_bounds());
        }
        bounds
    }

    /// Checks limits the GPU state can express.
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.clips.len() > MAX_CLIPS {
            return Err(RenderError::ClipStackOverflow { depth: self.clips.len(), max: MAX_CLIPS });
        }
        Ok(())
    }
}

/// A list of compositor layers to be rendered.
///
/// Collects layers during painting that will be consumed by the CPU painter or
/// turned into GPU command lists.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayList {
    /// Layers in paint order, bottom first.
    pub layers: Vec<Layer>,
}

impl DisplayList {
    /// Creates a new, empty display list.
    pub fn new() -> Self {
        DisplayList { layers: Vec::new() }
    }

    /// A single full-size layer cleared to `color`.
    pub fn solid(width: u32, height: u32, color: Color) -> Self {
        let mut layer = Layer::new(LayerId(0), IntRect::from_size(width, height));
        layer.push(DisplayItem::Clear { color });
        DisplayList { layers: vec![layer] }
    }

    /// Appends a layer on top of the existing ones.
    pub fn push_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Clears all layers from the list.
    pub fn clear(&mut self) {
        self.layers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Pixel area that differs between `previous` and `self`.
    ///
    /// Layers are matched by position. A layer that changed, moved, appeared or
    /// vanished contributes both its old and its new device bounds.
    pub fn damage_since(&self, previous: &DisplayList) -> IntRect {
        let mut damage = IntRect::EMPTY;
        let len = self.layers.len().max(previous.layers.len());
        for i in 0..len {
            match (previous.layers.get(i), self.layers.get(i)) {
                (Some(old), Some(new)) if old == new => {}
                (old, new) => {
                    if let Some(old) = old {
                        damage = damage.union(&old.device_bounds());
                    }
                    if let Some(new) = new {
                        damage = damage.union(&new.device_bounds());
                    }
                }
            }
        }
        damage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(id: u64, x: f32, color: Color) -> Layer {
        let mut layer = Layer::new(LayerId(id), IntRect::from_size(200, 200));
        layer.push(DisplayItem::Rect { x, y: 0.0, w: 10.0, h: 10.0, color });
        layer
    }

    #[test]
    fn premultiplied_conversion() {
        let c = Color::from_u8(255, 0, 0, 255);
        assert_eq!(c.to_bgra_premultiplied(), [0, 0, 255, 255]);
        assert_eq!(Color::new(1.0, 1.0, 1.0, 0.5).to_bgra_premultiplied(), [128, 128, 128, 128]);
        assert_eq!(c.to_rgba8(), [255, 0, 0, 255]);
    }

    #[test]
    fn device_bounds_follow_transform_and_clips() {
        let layer = Layer::new(LayerId(1), IntRect::new(0, 0, 50, 50))
            .with_transform(Matrix::translation(10.0, 20.0))
            .with_clip(Clip::new(Rect::new(0.0, 0.0, 40.0, 100.0), Matrix::IDENTITY));
        assert_eq!(layer.device_bounds(), IntRect::new(10, 20, 40, 70));
    }

    #[test]
    fn validate_rejects_deep_clip_stacks() {
        let mut layer = Layer::new(LayerId(1), IntRect::from_size(10, 10));
        for _ in 0..=MAX_CLIPS {
            layer.clips.push(Clip::new(Rect::new(0.0, 0.0, 5.0, 5.0), Matrix::IDENTITY));
        }
        assert_eq!(
            layer.validate(),
            Err(RenderError::ClipStackOverflow { depth: MAX_CLIPS + 1, max: MAX_CLIPS })
        );
    }

    #[test]
    fn unchanged_list_has_no_damage() {
        let mut list = DisplayList::new();
        list.push_layer(square(1, 0.0, Color::BLACK));
        assert!(list.damage_since(&list.clone()).is_empty());
    }

    #[test]
    fn changed_layer_damages_its_bounds_only() {
        let mut before = DisplayList::new();
        before.push_layer(square(1, 0.0, Color::BLACK));
        let mut after = before.clone();
        after.push_layer(Layer::new(LayerId(2), IntRect::new(50, 50, 60, 60)));
        assert_eq!(after.damage_since(&before), IntRect::new(50, 50, 60, 60));

        // removing the new layer again damages the area it used to cover
        assert_eq!(before.damage_since(&after), IntRect::new(50, 50, 60, 60));
    }
}
