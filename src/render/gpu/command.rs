//! GPU commands and their packed wire encoding.

use crate::render::errors::DriverError;
use crate::render::geometry::IntRect;
use crate::render::gpu::ids::{GeometryId, RenderBufferId, TextureId};
use crate::render::gpu::state::{GpuState, ShaderType, MAX_CLIPS, MAX_TEXTURES};
use crate::render::matrix::Matrix4x4;
use bytemuck::{Pod, Zeroable};

/// One unit of GPU work.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Clear the state's render buffer (restricted to the scissor when set).
    ClearRenderBuffer { state: GpuState },
    /// Draw `indices_count` indices starting at `indices_offset` from `geometry`.
    DrawGeometry {
        state: GpuState,
        geometry: GeometryId,
        indices_offset: u32,
        indices_count: u32,
    },
}

impl Command {
    pub fn state(&self) -> &GpuState {
        match self {
            Command::ClearRenderBuffer { state } => state,
            Command::DrawGeometry { state, .. } => state,
        }
    }

    fn command_type(&self) -> u8 {
        match self {
            Command::ClearRenderBuffer { .. } => 0,
            Command::DrawGeometry { .. } => 1,
        }
    }
}

/// Ordered commands for one view and one frame.
///
/// Drivers receive it by shared reference for the duration of
/// `update_command_list` only. Anything they want to keep must be copied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandList {
    commands: Vec<Command>,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }

    pub fn as_slice(&self) -> &[Command] {
        &self.commands
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut Command> {
        self.commands.last_mut()
    }

    /// Yields each command with `true` when its state differs from the
    /// previous command's. A backend may skip rebinding when the flag is `false`.
    pub fn state_changes(&self) -> impl Iterator<Item = (&Command, bool)> + '_ {
        let mut previous: Option<&GpuState> = None;
        self.commands.iter().map(move |cmd| {
            let changed = previous != Some(cmd.state());
            previous = Some(cmd.state());
            (cmd, changed)
        })
    }

    /// Packed wire encoding, one 794 byte record per command.
    pub fn to_bytes(&self) -> Vec<u8> {
        let raw: Vec<RawCommand> = self.commands.iter().map(RawCommand::from).collect();
        bytemuck::cast_slice(&raw).to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DriverError> {
        if bytes.len() % RAW_COMMAND_SIZE != 0 {
            return Err(DriverError::MalformedBuffer(format!(
                "{} bytes is not a whole number of {} byte commands",
                bytes.len(),
                RAW_COMMAND_SIZE
            )));
        }
        let mut commands = Vec::with_capacity(bytes.len() / RAW_COMMAND_SIZE);
        for chunk in bytes.chunks_exact(RAW_COMMAND_SIZE) {
            let raw: RawCommand = bytemuck::pod_read_unaligned(chunk);
            commands.push(raw.decode()?);
        }
        Ok(Self { commands })
    }
}

impl<'a> IntoIterator for &'a CommandList {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

pub const RAW_GPU_STATE_SIZE: usize = 781;
pub const RAW_COMMAND_SIZE: usize = 794;

#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct RawGpuState {
    viewport_width: u32,
    viewport_height: u32,
    transform: [f32; 16],
    enable_texturing: u8,
    enable_blend: u8,
    shader_type: u8,
    render_buffer_id: u32,
    texture_ids: [u32; MAX_TEXTURES],
    uniform_scalar: [f32; 8],
    uniform_vector: [[f32; 4]; 8],
    clip_size: u8,
    clip: [[f32; 16]; MAX_CLIPS],
    enable_scissor: u8,
    scissor_rect: [i32; 4],
}

#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct RawCommand {
    command_type: u8,
    gpu_state: RawGpuState,
    geometry_id: u32,
    indices_count: u32,
    indices_offset: u32,
}

const _: () = assert!(std::mem::size_of::<RawGpuState>() == RAW_GPU_STATE_SIZE);
const _: () = assert!(std::mem::size_of::<RawCommand>() == RAW_COMMAND_SIZE);

impl From<&GpuState> for RawGpuState {
    fn from(s: &GpuState) -> Self {
        let scissor = s.scissor.unwrap_or(IntRect::EMPTY);
        RawGpuState {
            viewport_width: s.viewport_width,
            viewport_height: s.viewport_height,
            transform: s.transform.data,
            enable_texturing: s.enable_texturing as u8,
            enable_blend: s.enable_blend as u8,
            shader_type: s.shader_type as u8,
            render_buffer_id: RenderBufferId::to_wire(s.render_buffer),
            texture_ids: s.textures.map(TextureId::to_wire),
            uniform_scalar: s.uniform_scalar,
            uniform_vector: s.uniform_vector,
            clip_size: s.clip_size,
            clip: s.clip.map(|m| m.data),
            enable_scissor: s.scissor.is_some() as u8,
            scissor_rect: [scissor.left, scissor.top, scissor.right, scissor.bottom],
        }
    }
}

fn decode_bool(v: u8, field: &str) -> Result<bool, DriverError> {
    match v {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(DriverError::MalformedBuffer(format!("{field} holds {v}, expected 0 or 1"))),
    }
}

impl RawGpuState {
    fn decode(&self) -> Result<GpuState, DriverError> {
        let shader = self.shader_type;
        let shader_type = ShaderType::from_u8(shader)
            .ok_or_else(|| DriverError::MalformedBuffer(format!("unknown shader type {shader}")))?;
        let clip_size = self.clip_size;
        if clip_size as usize > MAX_CLIPS {
            return Err(DriverError::MalformedBuffer(format!("clip size {clip_size} exceeds {MAX_CLIPS}")));
        }
        let [left, top, right, bottom] = self.scissor_rect;
        let texture_ids = self.texture_ids;
        let clip = self.clip;
        Ok(GpuState {
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
            transform: Matrix4x4 { data: self.transform },
            enable_texturing: decode_bool(self.enable_texturing, "enable_texturing")?,
            enable_blend: decode_bool(self.enable_blend, "enable_blend")?,
            shader_type,
            render_buffer: RenderBufferId::new(self.render_buffer_id),
            textures: texture_ids.map(TextureId::new),
            uniform_scalar: self.uniform_scalar,
            uniform_vector: self.uniform_vector,
            clip_size,
            clip: clip.map(|data| Matrix4x4 { data }),
            scissor: decode_bool(self.enable_scissor, "enable_scissor")?
                .then(|| IntRect::new(left, top, right, bottom)),
        })
    }
}

impl From<&Command> for RawCommand {
    fn from(cmd: &Command) -> Self {
        let (geometry_id, indices_count, indices_offset) = match cmd {
            Command::ClearRenderBuffer { .. } => (0, 0, 0),
            Command::DrawGeometry { geometry, indices_offset, indices_count, .. } => {
                (geometry.get(), *indices_count, *indices_offset)
            }
        };
        RawCommand {
            command_type: cmd.command_type(),
            gpu_state: RawGpuState::from(cmd.state()),
            geometry_id,
            indices_count,
            indices_offset,
        }
    }
}

impl RawCommand {
    fn decode(&self) -> Result<Command, DriverError> {
        let gpu_state = self.gpu_state;
        let state = gpu_state.decode()?;
        let command_type = self.command_type;
        match command_type {
            0 => Ok(Command::ClearRenderBuffer { state }),
            1 => {
                let raw_geometry = self.geometry_id;
                let geometry = GeometryId::new(raw_geometry)
                    .ok_or_else(|| DriverError::MalformedBuffer("draw without geometry".into()))?;
                Ok(Command::DrawGeometry {
                    state,
                    geometry,
                    indices_offset: self.indices_offset,
                    indices_count: self.indices_count,
                })
            }
            other => Err(DriverError::MalformedBuffer(format!("unknown command type {other}"))),
        }
    }
}
