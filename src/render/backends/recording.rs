//! A driver that records every call it receives.
//!
//! The log is shared through `Rc<RefCell<_>>` so a test can keep a handle after
//! handing the driver to a renderer. Besides recording, the driver checks the
//! synchronization protocol and resource lifetimes on its own, independent of
//! the core's bookkeeping, and notes every violation in the log.

use crate::render::backend::{FaceWinding, GpuDriver, RenderBuffer};
use crate::render::bitmap::Bitmap;
use crate::render::errors::{DriverError, ResourceKind};
use crate::render::gpu::command::{Command, CommandList};
use crate::render::gpu::ids::{GeometryId, IdAllocator, RenderBufferId, ResourceId, ResourceLedger, TextureId};
use crate::render::gpu::vertex::{IndexBuffer, VertexBuffer};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq)]
pub enum DriverCall {
    BeginSynchronize,
    EndSynchronize,
    CreateTexture(TextureId, u32, u32),
    UpdateTexture(TextureId),
    DestroyTexture(TextureId),
    CreateRenderBuffer(RenderBufferId, RenderBuffer),
    DestroyRenderBuffer(RenderBufferId),
    CreateGeometry(GeometryId),
    UpdateGeometry(GeometryId),
    DestroyGeometry(GeometryId),
    /// A copy of the submitted list.
    UpdateCommandList(CommandList),
}

#[derive(Debug, Default)]
pub struct DriverLog {
    pub calls: Vec<DriverCall>,
    /// Protocol and lifetime violations seen by the driver.
    pub violations: Vec<String>,
    pub face_winding: Option<FaceWinding>,
    live: ResourceLedger,
}

impl DriverLog {
    pub fn count(&self, pred: impl Fn(&DriverCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn command_lists(&self) -> impl Iterator<Item = &CommandList> + '_ {
        self.calls.iter().filter_map(|c| match c {
            DriverCall::UpdateCommandList(list) => Some(list),
            _ => None,
        })
    }

    /// Number of complete synchronize brackets.
    pub fn frames(&self) -> usize {
        self.count(|c| matches!(c, DriverCall::EndSynchronize))
    }

    pub fn created(&self, kind: ResourceKind) -> u64 {
        self.live.created(kind)
    }

    pub fn destroyed(&self, kind: ResourceKind) -> u64 {
        self.live.destroyed(kind)
    }

    /// Resources created and not yet destroyed.
    pub fn live(&self) -> usize {
        self.live.total_live()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

/// Driver that records calls and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    log: Rc<RefCell<DriverLog>>,
    textures: IdAllocator<TextureId>,
    render_buffers: IdAllocator<RenderBufferId>,
    geometry: IdAllocator<GeometryId>,
    in_frame: bool,
    /// The next this many `create_geometry` calls fail.
    pub fail_geometry_creates: usize,
    /// The next this many `update_command_list` calls fail.
    pub fail_command_lists: usize,
    /// The next this many `destroy_*` calls fail, leaving the resource alive.
    pub fail_destroys: usize,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the call log.
    pub fn log(&self) -> Rc<RefCell<DriverLog>> {
        Rc::clone(&self.log)
    }

    fn violation(&self, message: String) -> DriverError {
        log::error!("RecordingDriver: {}", message);
        self.log.borrow_mut().violations.push(message.clone());
        DriverError::ProtocolViolation(message)
    }

    fn record(&mut self, call: DriverCall) -> Result<(), DriverError> {
        if !self.in_frame {
            let err = self.violation(format!("{:?} outside begin/end_synchronize", call));
            self.log.borrow_mut().calls.push(call);
            return Err(err);
        }
        self.log.borrow_mut().calls.push(call);
        Ok(())
    }

    fn created<I: ResourceId>(&mut self, id: I) -> Result<(), DriverError> {
        let result = self.log.borrow_mut().live.record_create(id);
        result.map_err(|e| self.violation(e.to_string()))
    }

    fn destroyed<I: ResourceId>(&mut self, id: I) -> Result<(), DriverError> {
        let result = self.log.borrow_mut().live.record_destroy(id);
        result.map_err(|e| self.violation(e.to_string()))
    }

    fn injected_destroy_failure<I: ResourceId>(&mut self, id: I) -> Result<(), DriverError> {
        if self.fail_destroys > 0 {
            self.fail_destroys -= 1;
            return Err(DriverError::Backend(format!("injected failure destroying {} {}", I::KIND, id)));
        }
        Ok(())
    }

    fn alive<I: ResourceId>(&self, id: I) -> Result<(), DriverError> {
        if self.log.borrow().live.is_live(id) {
            Ok(())
        } else {
            Err(self.violation(format!("{} {} is not alive", I::KIND, id)))
        }
    }
}

impl GpuDriver for RecordingDriver {
    fn name(&self) -> &str {
        "RecordingDriver"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn set_face_winding(&mut self, winding: FaceWinding) {
        self.log.borrow_mut().face_winding = Some(winding);
    }

    fn begin_synchronize(&mut self) {
        if self.in_frame {
            self.violation("begin_synchronize inside an open frame".into());
        }
        self.in_frame = true;
        self.log.borrow_mut().calls.push(DriverCall::BeginSynchronize);
    }

    fn end_synchronize(&mut self) {
        if !self.in_frame {
            self.violation("end_synchronize without begin_synchronize".into());
        }
        self.in_frame = false;
        self.log.borrow_mut().calls.push(DriverCall::EndSynchronize);
    }

    fn next_texture_id(&mut self) -> Option<TextureId> {
        self.textures.next()
    }

    fn create_texture(&mut self, id: TextureId, bitmap: &Bitmap) -> Result<(), DriverError> {
        self.record(DriverCall::CreateTexture(id, bitmap.width(), bitmap.height()))?;
        self.created(id)
    }

    fn update_texture(&mut self, id: TextureId, _bitmap: &Bitmap) -> Result<(), DriverError> {
        self.record(DriverCall::UpdateTexture(id))?;
        self.alive(id)
    }

    fn destroy_texture(&mut self, id: TextureId) -> Result<(), DriverError> {
        self.injected_destroy_failure(id)?;
        self.record(DriverCall::DestroyTexture(id))?;
        self.destroyed(id)
    }

    fn next_render_buffer_id(&mut self) -> Option<RenderBufferId> {
        self.render_buffers.next()
    }

    fn create_render_buffer(&mut self, id: RenderBufferId, buffer: &RenderBuffer) -> Result<(), DriverError> {
        self.record(DriverCall::CreateRenderBuffer(id, *buffer))?;
        self.alive(buffer.texture)?;
        self.created(id)
    }

    fn destroy_render_buffer(&mut self, id: RenderBufferId) -> Result<(), DriverError> {
        self.injected_destroy_failure(id)?;
        self.record(DriverCall::DestroyRenderBuffer(id))?;
        self.destroyed(id)
    }

    fn next_geometry_id(&mut self) -> Option<GeometryId> {
        self.geometry.next()
    }

    fn create_geometry(&mut self, id: GeometryId, v: &VertexBuffer, i: &IndexBuffer) -> Result<(), DriverError> {
        if self.fail_geometry_creates > 0 {
            self.fail_geometry_creates -= 1;
            return Err(DriverError::AllocationFailed { kind: ResourceKind::Geometry, id: id.get() });
        }
        self.record(DriverCall::CreateGeometry(id))?;
        if v.is_empty() || i.is_empty() {
            return Err(DriverError::MalformedBuffer("empty geometry".into()));
        }
        self.created(id)
    }

    fn update_geometry(&mut self, id: GeometryId, _v: &VertexBuffer, _i: &IndexBuffer) -> Result<(), DriverError> {
        self.record(DriverCall::UpdateGeometry(id))?;
        self.alive(id)
    }

    fn destroy_geometry(&mut self, id: GeometryId) -> Result<(), DriverError> {
        self.injected_destroy_failure(id)?;
        self.record(DriverCall::DestroyGeometry(id))?;
        self.destroyed(id)
    }

    fn update_command_list(&mut self, list: &CommandList) -> Result<(), DriverError> {
        if self.fail_command_lists > 0 {
            self.fail_command_lists -= 1;
            return Err(DriverError::Backend("injected command list failure".into()));
        }
        self.record(DriverCall::UpdateCommandList(list.clone()))?;
        for command in list {
            let state = command.state();
            if let Some(rb) = state.render_buffer {
                self.alive(rb)?;
            }
            for texture in state.textures.iter().flatten() {
                self.alive(*texture)?;
            }
            if let Command::DrawGeometry { geometry, .. } = command {
                self.alive(*geometry)?;
            }
        }
        Ok(())
    }
}
