use crate::render::bitmap::Bitmap;
use crate::render::errors::DriverError;
use crate::render::gpu::command::CommandList;
use crate::render::gpu::ids::{GeometryId, RenderBufferId, TextureId};
use crate::render::gpu::vertex::{IndexBuffer, VertexBuffer};
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Winding order of front-facing triangles, for backends that cull.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceWinding {
    Clockwise,
    #[default]
    CounterClockwise,
}

/// Offscreen drawing target backed by a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderBuffer {
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
    pub has_stencil: bool,
    pub has_depth: bool,
}

/// GPU driver interface. All calls occur on the renderer's thread.
///
/// Every frame with GPU work is bracketed by exactly one
/// [`begin_synchronize`](GpuDriver::begin_synchronize) and one
/// [`end_synchronize`](GpuDriver::end_synchronize). All resource calls and
/// command lists of that frame arrive in between, in the order the core issued
/// them; a driver may batch them but must not move a destroy after a later
/// create of the same id.
///
/// Failures are returned, never raised: the renderer drops the affected view's
/// frame and retries it on the next one.
pub trait GpuDriver: Any {
    /// Human readable name, used in logs.
    fn name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Called once by the renderer before the first frame. Drivers that cull
    /// use it as the front face.
    fn set_face_winding(&mut self, _winding: FaceWinding) {}

    /// Called before any resource or command call of a frame.
    fn begin_synchronize(&mut self);

    /// Called after the last command list of a frame.
    fn end_synchronize(&mut self);

    /// Returns an unused texture id, `None` when the id space is exhausted.
    fn next_texture_id(&mut self) -> Option<TextureId>;

    /// Creates a texture from `bitmap`. An empty bitmap requests a
    /// render-to-texture target whose size comes from the render buffer.
    fn create_texture(&mut self, id: TextureId, bitmap: &Bitmap) -> Result<(), DriverError>;

    fn update_texture(&mut self, id: TextureId, bitmap: &Bitmap) -> Result<(), DriverError>;

    fn destroy_texture(&mut self, id: TextureId) -> Result<(), DriverError>;

    fn next_render_buffer_id(&mut self) -> Option<RenderBufferId>;

    fn create_render_buffer(&mut self, id: RenderBufferId, buffer: &RenderBuffer) -> Result<(), DriverError>;

    fn destroy_render_buffer(&mut self, id: RenderBufferId) -> Result<(), DriverError>;

    fn next_geometry_id(&mut self) -> Option<GeometryId>;

    fn create_geometry(
        &mut self,
        id: GeometryId,
        vertices: &VertexBuffer,
        indices: &IndexBuffer,
    ) -> Result<(), DriverError>;

    fn update_geometry(
        &mut self,
        id: GeometryId,
        vertices: &VertexBuffer,
        indices: &IndexBuffer,
    ) -> Result<(), DriverError>;

    fn destroy_geometry(&mut self, id: GeometryId) -> Result<(), DriverError>;

    /// Receives the commands of one view for this frame. The list is only
    /// borrowed for the duration of the call.
    fn update_command_list(&mut self, list: &CommandList) -> Result<(), DriverError>;
}
