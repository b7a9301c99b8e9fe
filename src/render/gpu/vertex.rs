//! Vertex and index buffers handed to `create_geometry` / `update_geometry`.
//!
//! Both vertex records are packed (alignment 1, no padding) and their field
//! order is part of the driver ABI. Drivers typically feed `data` straight into
//! a GPU buffer and describe the attributes with the offsets below.

use crate::render::errors::DriverError;
use bytemuck::{Pod, Zeroable};

/// Vertex used with [`ShaderType::FillPath`](super::state::ShaderType::FillPath):
/// position, color, object coordinates. Layout `2f_4ub_2f`, 20 bytes.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PathVertex {
    pub pos: [f32; 2],
    /// Straight RGBA.
    pub color: [u8; 4],
    pub obj: [f32; 2],
}

/// Vertex used with [`ShaderType::Fill`](super::state::ShaderType::Fill).
/// Layout `2f_4ub_2f_2f_28f`, 140 bytes.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub pos: [f32; 2],
    /// Straight RGBA.
    pub color: [u8; 4],
    pub tex: [f32; 2],
    pub obj: [f32; 2],
    /// Per-vertex shader data. `data[0][0]` selects the fill: 0 solid, 1 image.
    pub data: [[f32; 4]; 7],
}

/// Fill kinds encoded in `QuadVertex::data[0][0]`.
pub const FILL_SOLID: f32 = 0.0;
pub const FILL_IMAGE: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexFormat {
    /// [`PathVertex`] records.
    Path2f4ub2f,
    /// [`QuadVertex`] records.
    Quad2f4ub2f2f28f,
}

impl VertexFormat {
    /// Size of one vertex record in bytes.
    pub const fn record_size(self) -> usize {
        match self {
            VertexFormat::Path2f4ub2f => std::mem::size_of::<PathVertex>(),
            VertexFormat::Quad2f4ub2f2f28f => std::mem::size_of::<QuadVertex>(),
        }
    }
}

/// Tagged vertex bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexBuffer {
    pub format: VertexFormat,
    pub data: Vec<u8>,
}

impl VertexBuffer {
    pub fn from_path(vertices: &[PathVertex]) -> Self {
        Self { format: VertexFormat::Path2f4ub2f, data: bytemuck::cast_slice(vertices).to_vec() }
    }

    pub fn from_quads(vertices: &[QuadVertex]) -> Self {
        Self { format: VertexFormat::Quad2f4ub2f2f28f, data: bytemuck::cast_slice(vertices).to_vec() }
    }

    /// Number of vertices, rounded down when the buffer is malformed.
    pub fn len(&self) -> usize {
        self.data.len() / self.format.record_size()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check(&self, expected: VertexFormat) -> Result<(), DriverError> {
        if self.format != expected {
            return Err(DriverError::MalformedBuffer(format!(
                "expected {:?} vertices, buffer holds {:?}",
                expected, self.format
            )));
        }
        if self.data.len() % expected.record_size() != 0 {
            return Err(DriverError::MalformedBuffer(format!(
                "{} bytes is not a multiple of the {} byte vertex size",
                self.data.len(),
                expected.record_size()
            )));
        }
        Ok(())
    }

    pub fn as_path(&self) -> Result<&[PathVertex], DriverError> {
        self.check(VertexFormat::Path2f4ub2f)?;
        bytemuck::try_cast_slice(&self.data).map_err(|e| DriverError::MalformedBuffer(e.to_string()))
    }

    pub fn as_quads(&self) -> Result<&[QuadVertex], DriverError> {
        self.check(VertexFormat::Quad2f4ub2f2f28f)?;
        bytemuck::try_cast_slice(&self.data).map_err(|e| DriverError::MalformedBuffer(e.to_string()))
    }
}

/// Triangle list indices, native-endian `u32`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexBuffer {
    pub data: Vec<u32>,
}

impl IndexBuffer {
    pub fn new(data: Vec<u32>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DriverError> {
        if bytes.len() % 4 != 0 {
            return Err(DriverError::MalformedBuffer(format!(
                "{} bytes is not a whole number of indices",
                bytes.len()
            )));
        }
        let data = bytes
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { data })
    }

    /// Indices `offset .. offset + count`, checked against the buffer length.
    pub fn range(&self, offset: u32, count: u32) -> Result<&[u32], DriverError> {
        let start = offset as usize;
        let end = start.checked_add(count as usize).unwrap_or(usize::MAX);
        self.data.get(start..end).ok_or_else(|| {
            DriverError::MalformedBuffer(format!(
                "index range {}..{} outside buffer of {}",
                start,
                end,
                self.data.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn path_vertex_layout() {
        assert_eq!(size_of::<PathVertex>(), 20);
        assert_eq!(offset_of!(PathVertex, pos), 0);
        assert_eq!(offset_of!(PathVertex, color), 8);
        assert_eq!(offset_of!(PathVertex, obj), 12);
    }

    #[test]
    fn quad_vertex_layout() {
        assert_eq!(size_of::<QuadVertex>(), 140);
        assert_eq!(offset_of!(QuadVertex, pos), 0);
        assert_eq!(offset_of!(QuadVertex, color), 8);
        assert_eq!(offset_of!(QuadVertex, tex), 12);
        assert_eq!(offset_of!(QuadVertex, obj), 20);
        assert_eq!(offset_of!(QuadVertex, data), 28);
    }

    #[test]
    fn buffers_keep_exact_sizes() {
        let quad = QuadVertex { pos: [1.0, 2.0], color: [1, 2, 3, 4], ..Default::default() };
        let vb = VertexBuffer::from_quads(&[quad; 4]);
        assert_eq!(vb.data.len(), 4 * 140);
        assert_eq!(vb.len(), 4);
        let decoded = vb.as_quads().unwrap();
        let color = decoded[3].color;
        assert_eq!(color, [1, 2, 3, 4]);

        let path = VertexBuffer::from_path(&[PathVertex::default(); 3]);
        assert_eq!(path.data.len(), 60);
        assert!(path.as_quads().is_err());
    }

    #[test]
    fn truncated_vertex_data_is_rejected() {
        let mut vb = VertexBuffer::from_path(&[PathVertex::default(); 2]);
        vb.data.pop();
        assert!(matches!(vb.as_path(), Err(DriverError::MalformedBuffer(_))));
    }

    #[test]
    fn index_bytes_are_native_endian() {
        let ib = IndexBuffer::new(vec![0, 1, 2, 0x0102_0304]);
        assert_eq!(ib.as_bytes().len(), 16);
        assert_eq!(&ib.as_bytes()[12..], &0x0102_0304u32.to_ne_bytes());
        assert_eq!(IndexBuffer::from_bytes(ib.as_bytes()).unwrap(), ib);
        assert!(IndexBuffer::from_bytes(&[0, 1, 2]).is_err());
        assert!(ib.range(2, 3).is_err());
        assert_eq!(ib.range(1, 2).unwrap(), &[1, 2]);
    }
}
