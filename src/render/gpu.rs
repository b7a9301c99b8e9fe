//! The GPU command pipeline.
//!
//! Views on the GPU path do not touch pixels themselves. Each frame they turn
//! their display list into vertex/index geometry plus a [`CommandList`] and hand
//! both to the installed [`GpuDriver`](crate::render::backend::GpuDriver), which
//! owns the actual graphics API.

pub mod command;
pub mod ids;
pub mod state;
pub mod stream;
pub mod target;
pub mod vertex;

pub use command::{Command, CommandList};
pub use ids::{GeometryId, IdAllocator, RenderBufferId, ResourceId, ResourceLedger, ResourceTable, TextureId};
pub use state::{GpuState, ShaderType};
pub use stream::CommandStream;
pub use target::{GpuTarget, RenderTarget};
pub use vertex::{IndexBuffer, PathVertex, QuadVertex, VertexBuffer, VertexFormat};
