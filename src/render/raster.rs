//! CPU rasterizer.
//!
//! Fills triangles into a premultiplied BGRA buffer. Coverage is sampled at
//! pixel centers with a top-left fill rule, so triangles sharing an edge never
//! touch a pixel twice. Used by the CPU paint path and by
//! [`SoftwareDriver`](crate::render::backends::software::SoftwareDriver).

use crate::render::bitmap::{Bitmap, BitmapFormat};
use crate::render::display_list::{Clip, DisplayList};
use crate::render::errors::{DriverError, RenderError};
use crate::render::geometry::{IntRect, Point, Rect};
use crate::render::gpu::state::{GpuState, ShaderType};
use crate::render::gpu::vertex::{PathVertex, QuadVertex, FILL_IMAGE};
use crate::render::matrix::Matrix;
use crate::render::tessellate::LayerMesh;

/// Device-space vertex ready for rasterization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterVertex {
    pub pos: Point,
    /// Straight RGBA.
    pub color: [u8; 4],
    pub uv: Point,
    pub textured: bool,
}

impl RasterVertex {
    pub fn from_quad(v: &QuadVertex, transform: &Matrix) -> Self {
        let pos = v.pos;
        let tex = v.tex;
        let data = v.data;
        RasterVertex {
            pos: transform.apply(Point::new(pos[0], pos[1])),
            color: v.color,
            uv: Point::new(tex[0], tex[1]),
            textured: data[0][0] == FILL_IMAGE,
        }
    }

    pub fn from_path(v: &PathVertex, transform: &Matrix) -> Self {
        let pos = v.pos;
        RasterVertex {
            pos: transform.apply(Point::new(pos[0], pos[1])),
            color: v.color,
            uv: Point::default(),
            textured: false,
        }
    }
}

/// Where pixels may be written: a device rectangle plus clip shapes tested per pixel.
#[derive(Clone, Debug)]
pub struct ClipRegion {
    bounds: IntRect,
    shapes: Vec<(Rect, Matrix)>,
}

impl ClipRegion {
    pub fn new(bounds: IntRect) -> Self {
        Self { bounds, shapes: Vec::new() }
    }

    /// Region for drawing under `clips` (outermost first), limited to `bounds`.
    pub fn with_clips(bounds: IntRect, clips: impl IntoIterator<Item = Clip>) -> Self {
        let mut region = Self::new(bounds);
        for clip in clips {
            region.bounds = region.bounds.intersect(&clip.device_bounds());
            match clip.transform.inverse_affine() {
                Some(inverse) => region.shapes.push((clip.rect, inverse)),
                // singular clips cover nothing
                None => region.bounds = IntRect::EMPTY,
            }
        }
        region
    }

    /// Region a GPU state allows drawing into on a `target` sized canvas.
    pub fn from_state(state: &GpuState, target: IntRect) -> Self {
        let mut bounds = target;
        if let Some(scissor) = state.scissor {
            bounds = bounds.intersect(&scissor);
        }
        Self::with_clips(bounds, state.clips())
    }

    pub fn bounds(&self) -> IntRect {
        self.bounds
    }

    fn contains(&self, x: f32, y: f32) -> bool {
        self.shapes.iter().all(|(rect, inverse)| {
            let p = inverse.apply(Point::new(x, y));
            p.x >= rect.left && p.x < rect.right && p.y >= rect.top && p.y < rect.bottom
        })
    }
}

/// Mutable view of a premultiplied BGRA pixel buffer.
pub struct Canvas<'a> {
    pixels: &'a mut [u8],
    width: u32,
    height: u32,
    row_bytes: u32,
}

fn edge(a: Point, b: Point, p: Point) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn is_top_left(a: Point, b: Point) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dy == 0.0 && dx > 0.0) || dy < 0.0
}

fn premultiply(rgba: [u8; 4]) -> [u8; 4] {
    let a = rgba[3] as u32;
    let mul = |c: u8| ((c as u32 * a + 127) / 255) as u8;
    [mul(rgba[2]), mul(rgba[1]), mul(rgba[0]), rgba[3]]
}

fn modulate(src: [u8; 4], alpha: u8) -> [u8; 4] {
    if alpha == 255 {
        return src;
    }
    src.map(|c| ((c as u32 * alpha as u32 + 127) / 255) as u8)
}

impl<'a> Canvas<'a> {
    pub fn new(pixels: &'a mut [u8], width: u32, height: u32, row_bytes: u32) -> Result<Self, DriverError> {
        let needed = row_bytes as usize * height as usize;
        if (row_bytes as u64) < width as u64 * 4 || pixels.len() < needed {
            return Err(DriverError::MalformedBuffer(format!(
                "{} byte buffer cannot hold {}x{} pixels at stride {}",
                pixels.len(),
                width,
                height,
                row_bytes
            )));
        }
        Ok(Self { pixels, width, height, row_bytes })
    }

    pub fn for_bitmap(bitmap: &'a mut Bitmap) -> Result<Self, DriverError> {
        if bitmap.format() != BitmapFormat::Bgra8UnormPremultiplied {
            return Err(DriverError::MalformedBuffer("canvas needs a BGRA bitmap".into()));
        }
        let (w, h, stride) = (bitmap.width(), bitmap.height(), bitmap.row_bytes());
        Self::new(bitmap.pixels_mut(), w, h, stride)
    }

    pub fn bounds(&self) -> IntRect {
        IntRect::from_size(self.width, self.height)
    }

    fn put(&mut self, x: i32, y: i32, src: [u8; 4], blend: bool) {
        let at = y as usize * self.row_bytes as usize + x as usize * 4;
        let dst = &mut self.pixels[at..at + 4];
        if !blend || src[3] == 255 {
            dst.copy_from_slice(&src);
            return;
        }
        let inv = 255 - src[3] as u32;
        for (d, s) in dst.iter_mut().zip(src) {
            *d = (s as u32 + (*d as u32 * inv + 127) / 255).min(255) as u8;
        }
    }

    /// Overwrites every pixel of `rect` (within `region`) with `bgra`.
    pub fn clear(&mut self, region: &ClipRegion, bgra: [u8; 4]) {
        let r = region.bounds().intersect(&self.bounds());
        for y in r.top..r.bottom {
            for x in r.left..r.right {
                if region.contains(x as f32 + 0.5, y as f32 + 0.5) {
                    self.put(x, y, bgra, false);
                }
            }
        }
    }

    /// Fills one triangle. `texture` is sampled for textured vertices.
    pub fn fill_triangle(
        &mut self,
        tri: [RasterVertex; 3],
        texture: Option<&Bitmap>,
        region: &ClipRegion,
        blend: bool,
    ) {
        let [v0, mut v1, mut v2] = tri;
        let mut area = edge(v0.pos, v1.pos, v2.pos);
        if area == 0.0 || !area.is_finite() {
            return;
        }
        if area < 0.0 {
            std::mem::swap(&mut v1, &mut v2);
            area = -area;
        }
        let (p0, p1, p2) = (v0.pos, v1.pos, v2.pos);

        let bbox = Rect::new(
            p0.x.min(p1.x).min(p2.x),
            p0.y.min(p1.y).min(p2.y),
            p0.x.max(p1.x).max(p2.x),
            p0.y.max(p1.y).max(p2.y),
        )
        .round_out()
        .intersect(&region.bounds())
        .intersect(&self.bounds());

        let solid = premultiply(v0.color);
        let textured = v0.textured && texture.is_some();
        let top_left = [is_top_left(p1, p2), is_top_left(p2, p0), is_top_left(p0, p1)];

        for y in bbox.top..bbox.bottom {
            for x in bbox.left..bbox.right {
                let p = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                let w = [edge(p1, p2, p), edge(p2, p0, p), edge(p0, p1, p)];
                let inside = w.iter().zip(top_left).all(|(w, tl)| *w > 0.0 || (*w == 0.0 && tl));
                if !inside || !region.contains(p.x, p.y) {
                    continue;
                }
                let src = match texture {
                    Some(tex) if textured => {
                        let u = (w[0] * v0.uv.x + w[1] * v1.uv.x + w[2] * v2.uv.x) / area;
                        let v = (w[0] * v0.uv.y + w[1] * v1.uv.y + w[2] * v2.uv.y) / area;
                        modulate(sample_nearest(tex, u, v), v0.color[3])
                    }
                    _ => solid,
                };
                self.put(x, y, src, blend);
            }
        }
    }

    /// Fills an indexed triangle list.
    pub fn fill_indexed(
        &mut self,
        vertices: &[RasterVertex],
        indices: &[u32],
        texture: Option<&Bitmap>,
        region: &ClipRegion,
        blend: bool,
    ) -> Result<(), DriverError> {
        if indices.len() % 3 != 0 {
            return Err(DriverError::MalformedBuffer(format!("{} indices do not form triangles", indices.len())));
        }
        for tri in indices.chunks_exact(3) {
            let fetch = |i: u32| {
                vertices.get(i as usize).copied().ok_or_else(|| {
                    DriverError::MalformedBuffer(format!("index {} outside {} vertices", i, vertices.len()))
                })
            };
            self.fill_triangle([fetch(tri[0])?, fetch(tri[1])?, fetch(tri[2])?], texture, region, blend);
        }
        Ok(())
    }
}

fn sample_nearest(tex: &Bitmap, u: f32, v: f32) -> [u8; 4] {
    if tex.is_empty() {
        return [0; 4];
    }
    let x = ((u * tex.width() as f32) as i64).clamp(0, tex.width() as i64 - 1) as u32;
    let y = ((v * tex.height() as f32) as i64).clamp(0, tex.height() as i64 - 1) as u32;
    match (tex.format(), tex.pixel(x, y)) {
        (BitmapFormat::Bgra8UnormPremultiplied, Some(px)) => [px[0], px[1], px[2], px[3]],
        (BitmapFormat::A8Unorm, Some(px)) => [px[0], px[0], px[0], px[0]],
        _ => [0; 4],
    }
}

/// Paints the layers of `list` that touch `damage` into `canvas`, in order.
pub fn paint_display_list(canvas: &mut Canvas<'_>, list: &DisplayList, damage: IntRect) -> Result<(), RenderError> {
    for layer in &list.layers {
        layer.validate()?;
        if !layer.device_bounds().intersects(&damage) {
            continue;
        }
        let region = ClipRegion::with_clips(damage, layer.clips.iter().copied());
        let mesh = LayerMesh::build(layer);
        let quads: Vec<RasterVertex> =
            mesh.quad_vertices.iter().map(|v| RasterVertex::from_quad(v, &layer.transform)).collect();
        let paths: Vec<RasterVertex> =
            mesh.path_vertices.iter().map(|v| RasterVertex::from_path(v, &layer.transform)).collect();

        for span in &mesh.spans {
            let (vertices, indices) = match span.shader {
                ShaderType::Fill => (&quads, &mesh.quad_indices),
                ShaderType::FillPath => (&paths, &mesh.path_indices),
            };
            let start = span.first_index as usize;
            let range = &indices[start..start + span.index_count as usize];
            canvas.fill_indexed(vertices, range, span.image.as_deref(), &region, span.blend)?;
        }
    }
    Ok(())
}
