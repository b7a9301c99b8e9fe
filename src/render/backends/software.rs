//! A driver that executes command lists on the CPU.
//!
//! Textures are plain [`Bitmap`]s and render buffers draw into their texture
//! with the crate's rasterizer. Slow, but it makes the GPU path observable
//! pixel by pixel without a graphics API.

use crate::render::backend::{GpuDriver, RenderBuffer};
use crate::render::bitmap::{Bitmap, BitmapFormat};
use crate::render::errors::DriverError;
use crate::render::gpu::command::{Command, CommandList};
use crate::render::gpu::ids::{GeometryId, IdAllocator, RenderBufferId, ResourceTable, TextureId};
use crate::render::gpu::state::{GpuState, ShaderType};
use crate::render::geometry::IntRect;
use crate::render::gpu::vertex::{IndexBuffer, VertexBuffer};
use crate::render::matrix::Matrix;
use crate::render::raster::{Canvas, ClipRegion, RasterVertex};
use std::any::Any;

#[derive(Debug)]
struct Geometry {
    vertices: VertexBuffer,
    indices: IndexBuffer,
}

/// Pipeline setup derived from a state, reused while the state does not change.
struct Bound {
    transform: Matrix,
    region: ClipRegion,
}

#[derive(Debug)]
pub struct SoftwareDriver {
    texture_ids: IdAllocator<TextureId>,
    render_buffer_ids: IdAllocator<RenderBufferId>,
    geometry_ids: IdAllocator<GeometryId>,
    textures: ResourceTable<TextureId, Bitmap>,
    render_buffers: ResourceTable<RenderBufferId, RenderBuffer>,
    geometry: ResourceTable<GeometryId, Geometry>,
    in_frame: bool,
    skip_redundant_state: bool,
    state_binds: u64,
}

impl Default for SoftwareDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDriver {
    pub fn new() -> Self {
        Self {
            texture_ids: IdAllocator::new(),
            render_buffer_ids: IdAllocator::new(),
            geometry_ids: IdAllocator::new(),
            textures: ResourceTable::new(),
            render_buffers: ResourceTable::new(),
            geometry: ResourceTable::new(),
            in_frame: false,
            skip_redundant_state: true,
            state_binds: 0,
        }
    }

    /// When disabled every command rebinds its state, even if it equals the
    /// previous one.
    pub fn with_state_dedup(mut self, enabled: bool) -> Self {
        self.skip_redundant_state = enabled;
        self
    }

    pub fn texture(&self, id: TextureId) -> Option<&Bitmap> {
        self.textures.get(id)
    }

    /// The pixels a render buffer draws into.
    pub fn render_buffer_pixels(&self, id: RenderBufferId) -> Option<&Bitmap> {
        let rb = self.render_buffers.get(id)?;
        self.textures.get(rb.texture)
    }

    /// How many times a pipeline state was set up.
    pub fn state_binds(&self) -> u64 {
        self.state_binds
    }

    /// Number of live resources of all kinds.
    pub fn resource_count(&self) -> usize {
        self.textures.len() + self.render_buffers.len() + self.geometry.len()
    }

    fn check_frame(&self, what: &str) -> Result<(), DriverError> {
        if self.in_frame {
            Ok(())
        } else {
            Err(DriverError::ProtocolViolation(format!("{what} outside begin/end_synchronize")))
        }
    }

    fn execute(&self, command: &Command, target: &mut Bitmap, bound: &Bound) -> Result<(), DriverError> {
        let mut canvas = Canvas::for_bitmap(target)?;
        match command {
            Command::ClearRenderBuffer { .. } => {
                canvas.clear(&bound.region, [0; 4]);
                Ok(())
            }
            Command::DrawGeometry { state, geometry, indices_offset, indices_count } => {
                let geometry = self.geometry.lookup(*geometry)?;
                let vertices: Vec<RasterVertex> = match state.shader_type {
                    ShaderType::Fill => geometry
                        .vertices
                        .as_quads()?
                        .iter()
                        .map(|v| RasterVertex::from_quad(v, &bound.transform))
                        .collect(),
                    ShaderType::FillPath => geometry
                        .vertices
                        .as_path()?
                        .iter()
                        .map(|v| RasterVertex::from_path(v, &bound.transform))
                        .collect(),
                };
                let indices = geometry.indices.range(*indices_offset, *indices_count)?;
                let texture = match (state.enable_texturing, state.textures[0]) {
                    (true, Some(id)) => Some(self.textures.lookup(id)?),
                    _ => None,
                };
                canvas.fill_indexed(&vertices, indices, texture, &bound.region, state.enable_blend)
            }
        }
    }

    fn bind(&mut self, state: &GpuState, target: &Bitmap) -> Bound {
        self.state_binds += 1;
        let bounds = IntRect::from_size(target.width(), target.height());
        Bound { transform: Matrix::from_matrix4x4(&state.transform), region: ClipRegion::from_state(state, bounds) }
    }
}

impl GpuDriver for SoftwareDriver {
    fn name(&self) -> &str {
        "SoftwareDriver"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn begin_synchronize(&mut self) {
        if self.in_frame {
            log::warn!("SoftwareDriver: nested begin_synchronize");
        }
        self.in_frame = true;
    }

    fn end_synchronize(&mut self) {
        self.in_frame = false;
    }

    fn next_texture_id(&mut self) -> Option<TextureId> {
        self.texture_ids.next()
    }

    fn create_texture(&mut self, id: TextureId, bitmap: &Bitmap) -> Result<(), DriverError> {
        self.check_frame("create_texture")?;
        self.textures.insert(id, bitmap.clone())
    }

    fn update_texture(&mut self, id: TextureId, bitmap: &Bitmap) -> Result<(), DriverError> {
        self.check_frame("update_texture")?;
        *self.textures.lookup_mut(id)? = bitmap.clone();
        Ok(())
    }

    fn destroy_texture(&mut self, id: TextureId) -> Result<(), DriverError> {
        self.check_frame("destroy_texture")?;
        self.textures.remove(id).map(drop)
    }

    fn next_render_buffer_id(&mut self) -> Option<RenderBufferId> {
        self.render_buffer_ids.next()
    }

    fn create_render_buffer(&mut self, id: RenderBufferId, buffer: &RenderBuffer) -> Result<(), DriverError> {
        self.check_frame("create_render_buffer")?;
        let texture = self.textures.lookup_mut(buffer.texture)?;
        if texture.is_empty() {
            *texture = Bitmap::new(buffer.width, buffer.height, BitmapFormat::Bgra8UnormPremultiplied);
        }
        self.render_buffers.insert(id, *buffer)
    }

    fn destroy_render_buffer(&mut self, id: RenderBufferId) -> Result<(), DriverError> {
        self.check_frame("destroy_render_buffer")?;
        self.render_buffers.remove(id).map(drop)
    }

    fn next_geometry_id(&mut self) -> Option<GeometryId> {
        self.geometry_ids.next()
    }

    fn create_geometry(&mut self, id: GeometryId, v: &VertexBuffer, i: &IndexBuffer) -> Result<(), DriverError> {
        self.check_frame("create_geometry")?;
        self.geometry.insert(id, Geometry { vertices: v.clone(), indices: i.clone() })
    }

    fn update_geometry(&mut self, id: GeometryId, v: &VertexBuffer, i: &IndexBuffer) -> Result<(), DriverError> {
        self.check_frame("update_geometry")?;
        *self.geometry.lookup_mut(id)? = Geometry { vertices: v.clone(), indices: i.clone() };
        Ok(())
    }

    fn destroy_geometry(&mut self, id: GeometryId) -> Result<(), DriverError> {
        self.check_frame("destroy_geometry")?;
        self.geometry.remove(id).map(drop)
    }

    fn update_command_list(&mut self, list: &CommandList) -> Result<(), DriverError> {
        self.check_frame("update_command_list")?;
        let mut bound: Option<Bound> = None;
        for (command, changed) in list.state_changes() {
            let state = command.state();
            let rb = state
                .render_buffer
                .ok_or_else(|| DriverError::Backend("command without a render buffer".into()))?;
            let texture_id = self.render_buffers.lookup(rb)?.texture;

            // Take the target out of the table so source textures stay readable.
            let mut target = self.textures.remove(texture_id)?;
            if changed || !self.skip_redundant_state || bound.is_none() {
                bound = Some(self.bind(state, &target));
            }
            let result = match &bound {
                Some(b) => self.execute(command, &mut target, b),
                None => Ok(()),
            };
            self.textures.insert(texture_id, target)?;
            result?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::display_list::{Color, DisplayItem, DisplayList, Layer, LayerId};
    use crate::render::errors::ResourceKind;
    use crate::render::geometry::Point;
    use crate::render::gpu::ids::ResourceLedger;
    use crate::render::gpu::stream::CommandStream;
    use crate::render::gpu::target::GpuTarget;

    fn overlapping_scene() -> DisplayList {
        let mut list = DisplayList::new();
        let mut background = Layer::new(LayerId(1), IntRect::from_size(40, 40));
        background.push(DisplayItem::Clear { color: Color::WHITE });
        for i in 0..4 {
            let x = 4.0 + i as f32 * 6.0;
            background.push(DisplayItem::Rect { x, y: x, w: 12.0, h: 12.0, color: Color::from_u8(0, 0, 255, 128) });
        }
        list.push_layer(background);

        // same pipeline state as the rects below it
        let mut overlay = Layer::new(LayerId(2), IntRect::from_size(40, 40));
        for i in 0..3 {
            let y = 30.0 - i as f32 * 7.0;
            overlay.push(DisplayItem::Rect { x: 2.0, y, w: 30.0, h: 5.0, color: Color::from_u8(255, 0, 0, 100) });
        }
        list.push_layer(overlay);

        let mut path = Layer::new(LayerId(3), IntRect::from_size(40, 40));
        path.push(DisplayItem::Path {
            points: vec![Point::new(20.0, 2.0), Point::new(38.0, 20.0), Point::new(20.0, 38.0)],
            color: Color::from_u8(0, 200, 0, 200),
        });
        list.push_layer(path);
        list
    }

    fn render(driver: &mut SoftwareDriver, list: &DisplayList) -> Bitmap {
        let mut ledger = ResourceLedger::new();
        let mut target = GpuTarget::new(40, 40);
        driver.begin_synchronize();
        let commands = CommandStream::new(driver, &mut ledger, 1.0).encode(&mut target, list, IntRect::EMPTY).unwrap();
        driver.update_command_list(&commands).unwrap();
        driver.end_synchronize();
        let rb = target.render_buffer().unwrap();
        driver.render_buffer_pixels(rb).unwrap().clone()
    }

    #[test]
    fn executes_clear_and_draws() {
        let mut driver = SoftwareDriver::new();
        let mut layer = Layer::new(LayerId(1), IntRect::from_size(40, 40));
        layer.push(DisplayItem::Rect { x: 10.0, y: 10.0, w: 10.0, h: 10.0, color: Color::from_u8(255, 0, 0, 255) });
        let mut list = DisplayList::new();
        list.push_layer(layer);

        let pixels = render(&mut driver, &list);
        assert_eq!(pixels.pixel(15, 15), Some(&[0u8, 0, 255, 255][..]));
        assert_eq!(pixels.pixel(5, 5), Some(&[0u8, 0, 0, 0][..]));
    }

    #[test]
    fn skipping_redundant_state_is_equivalent() {
        let list = overlapping_scene();
        let mut deduped = SoftwareDriver::new();
        let mut plain = SoftwareDriver::new().with_state_dedup(false);

        assert_eq!(render(&mut deduped, &list), render(&mut plain, &list));
        assert!(deduped.state_binds() < plain.state_binds());
    }

    #[test]
    fn calls_outside_a_frame_are_rejected() {
        let mut driver = SoftwareDriver::new();
        let id = driver.next_texture_id().unwrap();
        assert!(matches!(driver.create_texture(id, &Bitmap::empty()), Err(DriverError::ProtocolViolation(_))));
    }

    #[test]
    fn unknown_geometry_fails_the_list() {
        let mut driver = SoftwareDriver::new();
        driver.begin_synchronize();
        let tex = driver.next_texture_id().unwrap();
        driver.create_texture(tex, &Bitmap::empty()).unwrap();
        let rb = driver.next_render_buffer_id().unwrap();
        driver
            .create_render_buffer(rb, &RenderBuffer { texture: tex, width: 4, height: 4, has_stencil: false, has_depth: false })
            .unwrap();

        let mut state = GpuState::default();
        state.render_buffer = Some(rb);
        let mut list = CommandList::new();
        list.push(Command::DrawGeometry { state, geometry: GeometryId::new(99).unwrap(), indices_offset: 0, indices_count: 3 });
        assert!(matches!(
            driver.update_command_list(&list),
            Err(DriverError::UnknownResource { kind: ResourceKind::Geometry, id: 99 })
        ));
        // the target survives the failed list
        assert!(driver.render_buffer_pixels(rb).is_some());
        driver.end_synchronize();
    }
}
