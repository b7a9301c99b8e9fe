//! Points and rectangles.
//!
//! [`IntRect`] is the pixel-space rectangle used for dirty bounds and scissoring.
//! It is half-open: `left..right` × `top..bottom`. [`Rect`] is the float variant
//! used for layer-local geometry.

/// Pixel-space rectangle, edges in device pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IntRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IntRect {
    /// The canonical empty rectangle.
    pub const EMPTY: IntRect = IntRect { left: 0, top: 0, right: 0, bottom: 0 };

    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Rectangle anchored at the origin covering `width` × `height` pixels.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, clamp_i32(width), clamp_i32(height))
    }

    pub fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    #[inline]
    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    #[inline]
    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Smallest rectangle containing both. Empty inputs are ignored.
    pub fn union(&self, other: &IntRect) -> IntRect {
        if self.is_empty() {
            return if other.is_empty() { IntRect::EMPTY } else { *other };
        }
        if other.is_empty() {
            return *self;
        }
        IntRect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// Overlap of both rectangles, [`IntRect::EMPTY`] when they do not overlap.
    pub fn intersect(&self, other: &IntRect) -> IntRect {
        let r = IntRect {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        };
        if r.is_empty() {
            IntRect::EMPTY
        } else {
            r
        }
    }

    pub fn intersects(&self, other: &IntRect) -> bool {
        !self.intersect(other).is_empty()
    }

    pub fn contains(&self, other: &IntRect) -> bool {
        other.is_empty()
            || (!self.is_empty()
                && self.left <= other.left
                && self.top <= other.top
                && self.right >= other.right
                && self.bottom >= other.bottom)
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(self.left as f32, self.top as f32, self.right as f32, self.bottom as f32)
    }
}

fn clamp_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Float rectangle in layer-local or device coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        !(self.right > self.left && self.bottom > self.top)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Smallest pixel rectangle fully covering this one.
    pub fn round_out(&self) -> IntRect {
        if self.is_empty() {
            return IntRect::EMPTY;
        }
        IntRect::new(
            self.left.floor() as i32,
            self.top.floor() as i32,
            self.right.ceil() as i32,
            self.bottom.ceil() as i32,
        )
    }

    /// The four corners, clockwise from the top-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.left, self.top),
            Point::new(self.right, self.top),
            Point::new(self.right, self.bottom),
            Point::new(self.left, self.bottom),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_ignores_empty_rects() {
        let a = IntRect::new(10, 10, 20, 20);
        assert_eq!(a.union(&IntRect::EMPTY), a);
        assert_eq!(IntRect::EMPTY.union(&a), a);
        assert!(IntRect::EMPTY.union(&IntRect::new(5, 5, 5, 9)).is_empty());
    }

    #[test]
    fn union_grows_to_cover_both() {
        let a = IntRect::new(10, 10, 20, 20);
        let b = IntRect::new(15, 0, 40, 12);
        assert_eq!(a.union(&b), IntRect::new(10, 0, 40, 20));
    }

    #[test]
    fn intersect_of_disjoint_rects_is_empty() {
        let a = IntRect::new(0, 0, 10, 10);
        let b = IntRect::new(10, 0, 20, 10);
        assert_eq!(a.intersect(&b), IntRect::EMPTY);
        assert!(!a.intersects(&b));
        assert_eq!(a.intersect(&IntRect::new(5, 5, 50, 50)), IntRect::new(5, 5, 10, 10));
    }

    #[test]
    fn round_out_covers_fractional_edges() {
        let r = Rect::new(0.5, 1.2, 9.1, 9.0);
        assert_eq!(r.round_out(), IntRect::new(0, 1, 10, 9));
        assert_eq!(Rect::default().round_out(), IntRect::EMPTY);
    }

    #[test]
    fn contains_handles_empty_and_edges() {
        let outer = IntRect::from_size(100, 100);
        assert!(outer.contains(&IntRect::new(10, 10, 60, 60)));
        assert!(outer.contains(&IntRect::EMPTY));
        assert!(!outer.contains(&IntRect::new(90, 90, 101, 95)));
        assert!(outer.contains_point(99, 0));
        assert!(!outer.contains_point(100, 0));
    }
}
