//! Per-command GPU pipeline state.

use crate::render::display_list::Clip;
use crate::render::errors::RenderError;
use crate::render::geometry::{IntRect, Rect};
use crate::render::gpu::ids::{RenderBufferId, TextureId};
use crate::render::matrix::{Matrix, Matrix4x4};
use crate::render::viewport::Viewport;

/// Maximum depth of the clip stack a single state can carry.
pub const MAX_CLIPS: usize = 8;

/// Number of texture slots.
pub const MAX_TEXTURES: usize = 3;

/// Selects the shader program a driver binds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShaderType {
    /// Quads built from [`QuadVertex`](super::vertex::QuadVertex).
    #[default]
    Fill = 0,
    /// Triangulated paths built from [`PathVertex`](super::vertex::PathVertex).
    FillPath = 1,
}

impl ShaderType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ShaderType::Fill),
            1 => Some(ShaderType::FillPath),
            _ => None,
        }
    }
}

/// Everything a driver needs to set up the pipeline for one command.
///
/// Copied by value into every command, so it has no identity. Two states that
/// compare equal can be bound once for consecutive commands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GpuState {
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Local to device transform of the geometry.
    pub transform: Matrix4x4,
    pub enable_texturing: bool,
    pub enable_blend: bool,
    pub shader_type: ShaderType,
    /// Target of the command, `None` for the driver's default target.
    pub render_buffer: Option<RenderBufferId>,
    pub textures: [Option<TextureId>; MAX_TEXTURES],
    /// `uniform_scalar[0]` holds the device scale.
    pub uniform_scalar: [f32; 8],
    /// `uniform_vector[0]` holds `(width, height, 1/width, 1/height)` of the viewport.
    pub uniform_vector: [[f32; 4]; 8],
    pub clip_size: u8,
    /// Packed clips, see [`GpuState::pack_clip`]. Only the first `clip_size` are meaningful.
    pub clip: [Matrix4x4; MAX_CLIPS],
    /// Device-space scissor, `None` when scissoring is disabled.
    pub scissor: Option<IntRect>,
}

impl Default for GpuState {
    fn default() -> Self {
        Self {
            viewport_width: 0,
            viewport_height: 0,
            transform: Matrix4x4::IDENTITY,
            enable_texturing: false,
            enable_blend: true,
            shader_type: ShaderType::Fill,
            render_buffer: None,
            textures: [None; MAX_TEXTURES],
            uniform_scalar: [0.0; 8],
            uniform_vector: [[0.0; 4]; 8],
            clip_size: 0,
            clip: [Matrix4x4::ZERO; MAX_CLIPS],
            scissor: None,
        }
    }
}

impl GpuState {
    /// Base state for drawing into a target of `viewport` size.
    pub fn new(viewport: Viewport, device_scale: f64) -> Self {
        let mut state = Self {
            viewport_width: viewport.width,
            viewport_height: viewport.height,
            ..Self::default()
        };
        state.uniform_scalar[0] = device_scale as f32;
        state.uniform_vector[0] = viewport.uniform_vector();
        state
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.viewport_width, self.viewport_height)
    }

    /// The geometry transform followed by the screen-space projection.
    pub fn model_view_projection(&self, flip_y: bool) -> Matrix {
        Matrix::from_matrix4x4(&self.transform).then(&self.viewport().projection(flip_y))
    }

    /// Packs a clip: row 0 is the local rect `(left, top, right, bottom)`, rows
    /// 1 and 2 the affine transform `(a, b, c, d)` and `(e, f, 0, 0)`.
    pub fn pack_clip(clip: &Clip) -> Matrix4x4 {
        let [a, b, c, d, e, f] = clip.transform.affine();
        let r = &clip.rect;
        let mut m = Matrix4x4::ZERO;
        m.data[..4].copy_from_slice(&[r.left, r.top, r.right, r.bottom]);
        m.data[4..8].copy_from_slice(&[a as f32, b as f32, c as f32, d as f32]);
        m.data[8..10].copy_from_slice(&[e as f32, f as f32]);
        m
    }

    /// Inverse of [`GpuState::pack_clip`].
    pub fn unpack_clip(m: &Matrix4x4) -> Clip {
        let d = &m.data;
        Clip {
            rect: Rect::new(d[0], d[1], d[2], d[3]),
            transform: Matrix::from_affine(
                d[4] as f64,
                d[5] as f64,
                d[6] as f64,
                d[7] as f64,
                d[8] as f64,
                d[9] as f64,
            ),
        }
    }

    /// Replaces the clip stack. More than [`MAX_CLIPS`] clips is an error, the
    /// stack is never truncated.
    pub fn set_clips(&mut self, clips: &[Clip]) -> Result<(), RenderError> {
        if clips.len() > MAX_CLIPS {
            return Err(RenderError::ClipStackOverflow { depth: clips.len(), max: MAX_CLIPS });
        }
        self.clip = [Matrix4x4::ZERO; MAX_CLIPS];
        for (slot, clip) in self.clip.iter_mut().zip(clips) {
            *slot = Self::pack_clip(clip);
        }
        self.clip_size = clips.len() as u8;
        Ok(())
    }

    /// The active clips, unpacked.
    pub fn clips(&self) -> impl Iterator<Item = Clip> + '_ {
        self.clip[..(self.clip_size as usize).min(MAX_CLIPS)].iter().map(Self::unpack_clip)
    }

    /// Device-space area draws under this state can touch: viewport, scissor
    /// and clip bounds intersected.
    pub fn device_clip_bounds(&self) -> IntRect {
        let mut bounds = self.viewport().bounds();
        if let Some(scissor) = self.scissor {
            bounds = bounds.intersect(&scissor);
        }
        for clip in self.clips() {
            bounds = bounds.intersect(&clip.device_bounds());
        }
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::geometry::Point;

    #[test]
    fn new_state_fills_uniform_conventions() {
        let state = GpuState::new(Viewport::new(200, 100), 2.0);
        assert_eq!(state.uniform_scalar[0], 2.0);
        assert_eq!(state.uniform_vector[0], [200.0, 100.0, 1.0 / 200.0, 1.0 / 100.0]);
        assert_eq!(state.clip_size, 0);
    }

    #[test]
    fn clip_packing_round_trips() {
        let clip = Clip::new(Rect::new(1.0, 2.0, 30.0, 40.0), Matrix::translation(5.0, 6.0));
        let packed = GpuState::pack_clip(&clip);
        assert_eq!(&packed.data[..4], &[1.0, 2.0, 30.0, 40.0]);
        assert_eq!(&packed.data[8..12], &[5.0, 6.0, 0.0, 0.0]);
        assert_eq!(GpuState::unpack_clip(&packed), clip);
    }

    #[test]
    fn too_many_clips_is_an_error() {
        let mut state = GpuState::default();
        let clips = vec![Clip::new(Rect::new(0.0, 0.0, 1.0, 1.0), Matrix::IDENTITY); MAX_CLIPS + 1];
        assert!(matches!(state.set_clips(&clips), Err(RenderError::ClipStackOverflow { depth: 9, max: 8 })));
        assert!(state.set_clips(&clips[..MAX_CLIPS]).is_ok());
        assert_eq!(state.clips().count(), MAX_CLIPS);
    }

    #[test]
    fn model_view_projection_applies_transform_first() {
        let mut state = GpuState::new(Viewport::new(100, 100), 1.0);
        state.transform = Matrix::translation(50.0, 50.0).to_matrix4x4();
        let p = state.model_view_projection(false).apply(Point::new(0.0, 0.0));
        assert!(p.x.abs() < 1e-6 && p.y.abs() < 1e-6);
    }

    #[test]
    fn device_clip_bounds_intersects_scissor_and_clips() {
        let mut state = GpuState::new(Viewport::new(100, 100), 1.0);
        state.scissor = Some(IntRect::new(10, 10, 90, 90));
        state
            .set_clips(&[Clip::new(Rect::new(0.0, 0.0, 50.0, 50.0), Matrix::IDENTITY)])
            .unwrap();
        assert_eq!(state.device_clip_bounds(), IntRect::new(10, 10, 50, 50));
    }
}
