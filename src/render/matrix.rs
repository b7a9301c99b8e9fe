//! Transform matrices.
//!
//! [`Matrix`] is the double precision working matrix. Points are row vectors, so a
//! point is transformed as `p * M` and translation lives in the fourth row
//! (`m41`, `m42`). [`Matrix4x4`] is the single precision, row-major copy that is
//! handed to GPU drivers inside a [`GpuState`](crate::render::gpu::state::GpuState).

use crate::render::geometry::{Point, Rect};

/// Row-major 4×4 float matrix as it appears on the driver boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix4x4 {
    pub data: [f32; 16],
}

impl Matrix4x4 {
    pub const IDENTITY: Matrix4x4 = Matrix4x4 {
        data: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    pub const ZERO: Matrix4x4 = Matrix4x4 { data: [0.0; 16] };

    pub fn set_identity(&mut self) {
        *self = Self::IDENTITY;
    }
}

impl Default for Matrix4x4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Double precision 4×4 transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix {
    pub data: [[f64; 4]; 4],
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        data: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Builds a 2-D affine transform `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
    pub fn from_affine(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        let mut m = Self::IDENTITY;
        m.data[0][0] = a;
        m.data[0][1] = b;
        m.data[1][0] = c;
        m.data[1][1] = d;
        m.data[3][0] = e;
        m.data[3][1] = f;
        m
    }

    pub fn translation(x: f64, y: f64) -> Self {
        Self::from_affine(1.0, 0.0, 0.0, 1.0, x, y)
    }

    pub fn scaling(x: f64, y: f64) -> Self {
        Self::from_affine(x, 0.0, 0.0, y, 0.0, 0.0)
    }

    pub fn rotation(theta: f64) -> Self {
        let (s, c) = theta.sin_cos();
        Self::from_affine(c, s, -s, c, 0.0, 0.0)
    }

    /// Screen-space orthographic projection mapping `0..width` × `0..height` to
    /// normalized device coordinates.
    ///
    /// Without `flip_y` the top of the screen maps to `+1` (OpenGL convention).
    /// With `flip_y` the top maps to `-1`, for backends whose clip space Y axis
    /// points down.
    pub fn orthographic_projection(width: f64, height: f64, flip_y: bool) -> Self {
        let w = if width > 0.0 { width } else { 1.0 };
        let h = if height > 0.0 { height } else { 1.0 };
        let (sy, ty) = if flip_y { (2.0 / h, -1.0) } else { (-2.0 / h, 1.0) };
        Self::from_affine(2.0 / w, 0.0, 0.0, sy, -1.0, ty)
    }

    /// Returns the transform that applies `self` first and `next` second.
    pub fn then(&self, next: &Matrix) -> Matrix {
        let mut out = [[0.0; 4]; 4];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.data[r][k] * next.data[k][c]).sum();
            }
        }
        Matrix { data: out }
    }

    /// Appends a translation after the current transform.
    pub fn translate(&mut self, x: f64, y: f64) {
        *self = self.then(&Matrix::translation(x, y));
    }

    /// Appends a scale after the current transform.
    pub fn scale(&mut self, x: f64, y: f64) {
        *self = self.then(&Matrix::scaling(x, y));
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// True when the matrix only moves points.
    pub fn is_identity_or_translation(&self) -> bool {
        let mut m = *self;
        m.data[3][0] = 0.0;
        m.data[3][1] = 0.0;
        m.data[3][2] = 0.0;
        m.is_identity()
    }

    /// True when the matrix is a 2-D affine transform.
    pub fn is_affine(&self) -> bool {
        let d = &self.data;
        d[0][2] == 0.0
            && d[0][3] == 0.0
            && d[1][2] == 0.0
            && d[1][3] == 0.0
            && d[2] == [0.0, 0.0, 1.0, 0.0]
            && d[3][2] == 0.0
            && d[3][3] == 1.0
    }

    /// Affine with no rotation or skew: rectangles stay axis aligned.
    pub fn is_simple(&self) -> bool {
        self.is_affine() && self.data[0][1] == 0.0 && self.data[1][0] == 0.0
    }

    /// Affine components `[a, b, c, d, e, f]`.
    pub fn affine(&self) -> [f64; 6] {
        let d = &self.data;
        [d[0][0], d[0][1], d[1][0], d[1][1], d[3][0], d[3][1]]
    }

    /// Inverse of the 2-D affine part, `None` when it is singular.
    pub fn inverse_affine(&self) -> Option<Matrix> {
        let [a, b, c, d, e, f] = self.affine();
        let det = a * d - b * c;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let ia = d / det;
        let ib = -b / det;
        let ic = -c / det;
        let id = a / det;
        Some(Matrix::from_affine(ia, ib, ic, id, -(e * ia + f * ic), -(e * ib + f * id)))
    }

    pub fn apply(&self, p: Point) -> Point {
        let d = &self.data;
        let x = p.x as f64;
        let y = p.y as f64;
        let tx = x * d[0][0] + y * d[1][0] + d[3][0];
        let ty = x * d[0][1] + y * d[1][1] + d[3][1];
        let tw = x * d[0][3] + y * d[1][3] + d[3][3];
        if tw != 0.0 && tw != 1.0 {
            Point::new((tx / tw) as f32, (ty / tw) as f32)
        } else {
            Point::new(tx as f32, ty as f32)
        }
    }

    /// Bounding box of the transformed rectangle.
    pub fn apply_rect(&self, r: &Rect) -> Rect {
        if r.is_empty() {
            return Rect::default();
        }
        let pts = r.corners().map(|p| self.apply(p));
        pts.iter().skip(1).fold(Rect::new(pts[0].x, pts[0].y, pts[0].x, pts[0].y), |acc, p| {
            Rect::new(acc.left.min(p.x), acc.top.min(p.y), acc.right.max(p.x), acc.bottom.max(p.y))
        })
    }

    pub fn to_matrix4x4(&self) -> Matrix4x4 {
        let mut out = Matrix4x4::ZERO;
        for r in 0..4 {
            for c in 0..4 {
                out.data[r * 4 + c] = self.data[r][c] as f32;
            }
        }
        out
    }

    pub fn from_matrix4x4(m: &Matrix4x4) -> Self {
        let mut data = [[0.0; 4]; 4];
        for (r, row) in data.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = m.data[r * 4 + c] as f64;
            }
        }
        Matrix { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-5 && (a.y - b.y).abs() < 1e-5
    }

    #[test]
    fn then_applies_left_operand_first() {
        let m = Matrix::scaling(2.0, 2.0).then(&Matrix::translation(10.0, 0.0));
        assert!(close(m.apply(Point::new(1.0, 1.0)), Point::new(12.0, 2.0)));

        let m = Matrix::translation(10.0, 0.0).then(&Matrix::scaling(2.0, 2.0));
        assert!(close(m.apply(Point::new(1.0, 1.0)), Point::new(22.0, 2.0)));
    }

    #[test]
    fn orthographic_projection_maps_corners() {
        let ortho = Matrix::orthographic_projection(200.0, 100.0, false);
        assert!(close(ortho.apply(Point::new(0.0, 0.0)), Point::new(-1.0, 1.0)));
        assert!(close(ortho.apply(Point::new(200.0, 100.0)), Point::new(1.0, -1.0)));

        let flipped = Matrix::orthographic_projection(200.0, 100.0, true);
        assert!(close(flipped.apply(Point::new(0.0, 0.0)), Point::new(-1.0, -1.0)));
        assert!(close(flipped.apply(Point::new(200.0, 100.0)), Point::new(1.0, 1.0)));
    }

    #[test]
    fn classification() {
        assert!(Matrix::IDENTITY.is_identity());
        assert!(Matrix::translation(3.0, 4.0).is_identity_or_translation());
        assert!(!Matrix::scaling(2.0, 1.0).is_identity_or_translation());
        assert!(Matrix::scaling(2.0, 1.0).is_simple());
        assert!(!Matrix::rotation(0.3).is_simple());
        assert!(Matrix::rotation(0.3).is_affine());
    }

    #[test]
    fn apply_rect_returns_bounding_box() {
        let m = Matrix::rotation(std::f64::consts::FRAC_PI_2);
        let r = m.apply_rect(&Rect::new(0.0, 0.0, 10.0, 5.0));
        assert!((r.left - -5.0).abs() < 1e-4);
        assert!((r.right - 0.0).abs() < 1e-4);
        assert!((r.bottom - 10.0).abs() < 1e-4);
    }

    #[test]
    fn inverse_affine_undoes_transform() {
        let m = Matrix::rotation(0.7).then(&Matrix::translation(3.0, -2.0));
        let inv = m.inverse_affine().unwrap();
        let p = Point::new(4.0, 5.0);
        assert!(close(inv.apply(m.apply(p)), p));
        assert!(Matrix::scaling(0.0, 1.0).inverse_affine().is_none());
    }

    #[test]
    fn matrix4x4_conversion_is_row_major() {
        let m = Matrix::translation(7.0, 9.0).to_matrix4x4();
        assert_eq!(m.data[12], 7.0);
        assert_eq!(m.data[13], 9.0);
        assert_eq!(Matrix::from_matrix4x4(&m), Matrix::translation(7.0, 9.0));
    }
}
