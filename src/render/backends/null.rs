use crate::render::backend::{GpuDriver, RenderBuffer};
use crate::render::bitmap::Bitmap;
use crate::render::errors::DriverError;
use crate::render::gpu::command::CommandList;
use crate::render::gpu::ids::{GeometryId, IdAllocator, RenderBufferId, TextureId};
use crate::render::gpu::vertex::{IndexBuffer, VertexBuffer};
use std::any::Any;

/// Null driver that accepts every call and does not draw anything.
///
/// Hands out ids and counts frames, which is all a headless host needs.
#[derive(Debug, Default)]
pub struct NullDriver {
    textures: IdAllocator<TextureId>,
    render_buffers: IdAllocator<RenderBufferId>,
    geometry: IdAllocator<GeometryId>,
    /// Number of completed synchronize brackets.
    frame_id: u64,
    /// Number of command lists received.
    command_lists: u64,
}

impl NullDriver {
    /// Creates a new instance of the null driver.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn command_lists(&self) -> u64 {
        self.command_lists
    }
}

impl GpuDriver for NullDriver {
    fn name(&self) -> &str {
        "NullDriver"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn begin_synchronize(&mut self) {}

    fn end_synchronize(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }

    fn next_texture_id(&mut self) -> Option<TextureId> {
        self.textures.next()
    }

    fn create_texture(&mut self, _id: TextureId, _bitmap: &Bitmap) -> Result<(), DriverError> {
        Ok(())
    }

    fn update_texture(&mut self, _id: TextureId, _bitmap: &Bitmap) -> Result<(), DriverError> {
        Ok(())
    }

    fn destroy_texture(&mut self, _id: TextureId) -> Result<(), DriverError> {
        Ok(())
    }

    fn next_render_buffer_id(&mut self) -> Option<RenderBufferId> {
        self.render_buffers.next()
    }

    fn create_render_buffer(&mut self, _id: RenderBufferId, _buffer: &RenderBuffer) -> Result<(), DriverError> {
        Ok(())
    }

    fn destroy_render_buffer(&mut self, _id: RenderBufferId) -> Result<(), DriverError> {
        Ok(())
    }

    fn next_geometry_id(&mut self) -> Option<GeometryId> {
        self.geometry.next()
    }

    fn create_geometry(&mut self, _id: GeometryId, _v: &VertexBuffer, _i: &IndexBuffer) -> Result<(), DriverError> {
        Ok(())
    }

    fn update_geometry(&mut self, _id: GeometryId, _v: &VertexBuffer, _i: &IndexBuffer) -> Result<(), DriverError> {
        Ok(())
    }

    fn destroy_geometry(&mut self, _id: GeometryId) -> Result<(), DriverError> {
        Ok(())
    }

    fn update_command_list(&mut self, _list: &CommandList) -> Result<(), DriverError> {
        self.command_lists += 1;
        Ok(())
    }
}
