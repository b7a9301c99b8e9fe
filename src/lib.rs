//! Offscreen view rendering for an embeddable HTML engine.
//!
//! The [`engine`] module is the host-facing API. The [`render`] module holds
//! the rendering core: display lists, CPU surfaces, and the GPU command
//! stream handed to a host-provided [`GpuDriver`](render::backend::GpuDriver).

pub mod engine;
pub mod render;

pub use engine::*;
pub use render::{Color, DisplayList};
