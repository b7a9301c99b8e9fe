//! Turns a layer's display items into triangle meshes.
//!
//! Rectangles, clears and images become [`QuadVertex`] quads (two triangles),
//! convex paths become [`PathVertex`] triangle fans. Vertices stay in the
//! layer's local space; the layer transform travels in the GPU state.

use crate::render::bitmap::Bitmap;
use crate::render::display_list::{BlendMode, Color, DisplayItem, Layer};
use crate::render::geometry::{Point, Rect};
use crate::render::gpu::state::ShaderType;
use crate::render::gpu::vertex::{
    IndexBuffer, PathVertex, QuadVertex, VertexBuffer, VertexFormat, FILL_IMAGE, FILL_SOLID,
};
use std::sync::Arc;

/// A run of indices drawn with one pipeline state.
#[derive(Clone, Debug)]
pub struct DrawSpan {
    pub shader: ShaderType,
    pub first_index: u32,
    pub index_count: u32,
    pub blend: bool,
    pub image: Option<Arc<Bitmap>>,
}

impl DrawSpan {
    pub fn format(&self) -> VertexFormat {
        match self.shader {
            ShaderType::Fill => VertexFormat::Quad2f4ub2f2f28f,
            ShaderType::FillPath => VertexFormat::Path2f4ub2f,
        }
    }

    /// Whether `next` can be folded into this span.
    fn can_merge(&self, next: &DrawSpan) -> bool {
        self.shader == next.shader
            && self.blend == next.blend
            && self.first_index + self.index_count == next.first_index
            && match (&self.image, &next.image) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}

/// Geometry of one layer, split by vertex format, plus its draws in paint order.
#[derive(Clone, Debug, Default)]
pub struct LayerMesh {
    pub quad_vertices: Vec<QuadVertex>,
    pub quad_indices: Vec<u32>,
    pub path_vertices: Vec<PathVertex>,
    pub path_indices: Vec<u32>,
    pub spans: Vec<DrawSpan>,
}

impl LayerMesh {
    pub fn build(layer: &Layer) -> Self {
        let mut mesh = LayerMesh::default();
        let blend = layer.blend == BlendMode::SourceOver;
        for item in &layer.items {
            match item {
                DisplayItem::Clear { color } => {
                    mesh.push_quad(layer.bounds.to_rect(), *color, None, false);
                }
                DisplayItem::Rect { x, y, w, h, color } => {
                    mesh.push_quad(Rect::from_xywh(*x, *y, *w, *h), *color, None, blend);
                }
                DisplayItem::Image { x, y, w, h, image } => {
                    mesh.push_quad(Rect::from_xywh(*x, *y, *w, *h), Color::WHITE, Some(image.clone()), blend);
                }
                DisplayItem::Path { points, color } => {
                    mesh.push_path(points, *color, blend);
                }
            }
        }
        mesh
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    fn push_span(&mut self, span: DrawSpan) {
        if let Some(last) = self.spans.last_mut() {
            if last.can_merge(&span) {
                last.index_count += span.index_count;
                return;
            }
        }
        self.spans.push(span);
    }

    fn push_quad(&mut self, rect: Rect, color: Color, image: Option<Arc<Bitmap>>, blend: bool) {
        if rect.is_empty() {
            return;
        }
        let fill = if image.is_some() { FILL_IMAGE } else { FILL_SOLID };
        let base = self.quad_vertices.len() as u32;
        let first_index = self.quad_indices.len() as u32;
        let rgba = color.to_rgba8();
        let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        for (corner, uv) in rect.corners().iter().zip(uvs) {
            let mut data = [[0.0; 4]; 7];
            data[0][0] = fill;
            self.quad_vertices.push(QuadVertex {
                pos: [corner.x, corner.y],
                color: rgba,
                tex: uv,
                obj: uv,
                data,
            });
        }
        self.quad_indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        self.push_span(DrawSpan { shader: ShaderType::Fill, first_index, index_count: 6, blend, image });
    }

    fn push_path(&mut self, points: &[Point], color: Color, blend: bool) {
        if points.len() < 3 {
            return;
        }
        let base = self.path_vertices.len() as u32;
        let first_index = self.path_indices.len() as u32;
        let rgba = color.to_rgba8();
        for p in points {
            self.path_vertices.push(PathVertex { pos: [p.x, p.y], color: rgba, obj: [p.x, p.y] });
        }
        for i in 1..points.len() as u32 - 1 {
            self.path_indices.extend_from_slice(&[base, base + i, base + i + 1]);
        }
        let index_count = self.path_indices.len() as u32 - first_index;
        self.push_span(DrawSpan { shader: ShaderType::FillPath, first_index, index_count, blend, image: None });
    }

    /// Vertex and index buffers for one format, `None` when the layer has none.
    pub fn buffers(&self, format: VertexFormat) -> Option<(VertexBuffer, IndexBuffer)> {
        match format {
            VertexFormat::Quad2f4ub2f2f28f if !self.quad_vertices.is_empty() => Some((
                VertexBuffer::from_quads(&self.quad_vertices),
                IndexBuffer::new(self.quad_indices.clone()),
            )),
            VertexFormat::Path2f4ub2f if !self.path_vertices.is_empty() => Some((
                VertexBuffer::from_path(&self.path_vertices),
                IndexBuffer::new(self.path_indices.clone()),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::display_list::LayerId;
    use crate::render::geometry::IntRect;

    fn layer_with(items: Vec<DisplayItem>) -> Layer {
        let mut layer = Layer::new(LayerId(1), IntRect::from_size(100, 100));
        layer.items = items;
        layer
    }

    fn rect(x: f32) -> DisplayItem {
        DisplayItem::Rect { x, y: 0.0, w: 10.0, h: 10.0, color: Color::BLACK }
    }

    #[test]
    fn adjacent_rects_share_one_span() {
        let mesh = LayerMesh::build(&layer_with(vec![rect(0.0), rect(20.0), rect(40.0)]));
        assert_eq!(mesh.quad_vertices.len(), 12);
        assert_eq!(mesh.spans.len(), 1);
        assert_eq!(mesh.spans[0].index_count, 18);
    }

    #[test]
    fn paint_order_breaks_spans_across_formats() {
        let tri = DisplayItem::Path {
            points: vec![Point::new(0.0, 0.0), Point::new(5.0, 0.0), Point::new(0.0, 5.0)],
            color: Color::WHITE,
        };
        let mesh = LayerMesh::build(&layer_with(vec![rect(0.0), tri, rect(20.0)]));
        let shaders: Vec<ShaderType> = mesh.spans.iter().map(|s| s.shader).collect();
        assert_eq!(shaders, vec![ShaderType::Fill, ShaderType::FillPath, ShaderType::Fill]);
        assert_eq!(mesh.spans[2].first_index, 6);
        assert_eq!(mesh.path_indices, vec![0, 1, 2]);
    }

    #[test]
    fn clear_disables_blending_and_covers_bounds() {
        let mesh = LayerMesh::build(&layer_with(vec![DisplayItem::Clear { color: Color::WHITE }, rect(0.0)]));
        assert_eq!(mesh.spans.len(), 2);
        assert!(!mesh.spans[0].blend);
        assert!(mesh.spans[1].blend);
        let far = mesh.quad_vertices[2].pos;
        assert_eq!(far, [100.0, 100.0]);
    }

    #[test]
    fn degenerate_items_draw_nothing() {
        let line = DisplayItem::Path { points: vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)], color: Color::BLACK };
        let empty = DisplayItem::Rect { x: 0.0, y: 0.0, w: 0.0, h: 5.0, color: Color::BLACK };
        let mesh = LayerMesh::build(&layer_with(vec![line, empty]));
        assert!(mesh.is_empty());
        assert!(mesh.buffers(VertexFormat::Quad2f4ub2f2f28f).is_none());
    }

    #[test]
    fn images_only_merge_with_the_same_bitmap() {
        let a = Arc::new(Bitmap::solid(2, 2, Color::WHITE));
        let b = Arc::new(Bitmap::solid(2, 2, Color::BLACK));
        let img = |image: &Arc<Bitmap>| DisplayItem::Image { x: 0.0, y: 0.0, w: 4.0, h: 4.0, image: image.clone() };
        let mesh = LayerMesh::build(&layer_with(vec![img(&a), img(&a), img(&b)]));
        assert_eq!(mesh.spans.len(), 2);
        assert_eq!(mesh.spans[0].index_count, 12);
    }
}
