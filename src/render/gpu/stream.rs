//! Builds the per-frame command list of one GPU-path view.
//!
//! For the frame's damage region the stream emits at most one
//! `ClearRenderBuffer` followed by the draws of every layer touching the
//! damage, in paint order. Geometry is cached per layer and vertex format on the
//! [`GpuTarget`]; only layers that changed since their last upload are sent to
//! the driver again.

use crate::render::backend::GpuDriver;
use crate::render::bitmap::Bitmap;
use crate::render::display_list::{DisplayList, Layer};
use crate::render::errors::{DriverError, RenderError, ResourceKind};
use crate::render::geometry::IntRect;
use crate::render::gpu::command::{Command, CommandList};
use crate::render::gpu::ids::{GeometryId, ResourceLedger, TextureId};
use crate::render::gpu::state::GpuState;
use crate::render::gpu::target::{flush_releases, GpuTarget, ImageTexture, LayerGeometry, Release};
use crate::render::gpu::vertex::{IndexBuffer, VertexBuffer, VertexFormat};
use crate::render::tessellate::{DrawSpan, LayerMesh};
use crate::render::viewport::Viewport;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Encodes display lists into command lists against one driver.
pub struct CommandStream<'a> {
    driver: &'a mut dyn GpuDriver,
    ledger: &'a mut ResourceLedger,
    device_scale: f64,
}

impl<'a> CommandStream<'a> {
    pub fn new(driver: &'a mut dyn GpuDriver, ledger: &'a mut ResourceLedger, device_scale: f64) -> Self {
        Self { driver, ledger, device_scale }
    }

    /// Encodes `list` for `target`, redrawing `damage`. A fresh target is always
    /// cleared and redrawn in full.
    ///
    /// Must run inside a synchronize bracket. On error nothing that was already
    /// created leaks: every new id is recorded on the target before the next call.
    pub fn encode(
        &mut self,
        target: &mut GpuTarget,
        list: &DisplayList,
        damage: IntRect,
    ) -> Result<CommandList, RenderError> {
        for layer in &list.layers {
            layer.validate()?;
        }
        let render_buffer = target.ensure_allocated(self.driver, self.ledger)?;
        self.sync_geometry(target, list)?;

        let viewport = Viewport::new(target.width(), target.height());
        let full = viewport.bounds();
        let damage = if target.is_fresh() { full } else { damage.intersect(&full) };

        let mut commands = CommandList::new();
        if damage.is_empty() {
            return Ok(commands);
        }

        let mut base = GpuState::new(viewport, self.device_scale);
        base.render_buffer = Some(render_buffer);
        base.scissor = if damage == full { None } else { Some(damage) };

        commands.push(Command::ClearRenderBuffer { state: base });

        for layer in &list.layers {
            if !layer.device_bounds().intersects(&damage) {
                continue;
            }
            let mut layer_state = base;
            layer_state.transform = layer.transform.to_matrix4x4();
            layer_state.set_clips(&layer.clips)?;

            let Some(geometry) = target.layers.get(&layer.id) else { continue };
            let spans = geometry.mesh.spans.clone();
            let (quads, paths) = (geometry.quads, geometry.paths);

            for span in &spans {
                let geometry = match span.format() {
                    VertexFormat::Quad2f4ub2f2f28f => quads,
                    VertexFormat::Path2f4ub2f => paths,
                };
                let Some(geometry) = geometry else { continue };
                let texture = match &span.image {
                    Some(image) => Some(self.image_texture(target, image)?),
                    None => None,
                };
                let state = span_state(&layer_state, span, texture);
                push_draw(&mut commands, state, geometry, span.first_index, span.index_count);
            }
        }

        self.release_unused_images(target);

        for command in &commands {
            self.ledger.check_command(command)?;
        }
        Ok(commands)
    }

    /// Uploads geometry for new and changed layers and destroys the geometry
    /// of layers that are gone.
    fn sync_geometry(&mut self, target: &mut GpuTarget, list: &DisplayList) -> Result<(), RenderError> {
        let present: BTreeSet<_> = list.layers.iter().map(|l| l.id).collect();
        let removed: Vec<_> = target.layers.keys().filter(|id| !present.contains(id)).copied().collect();
        let mut releases = Vec::new();
        for id in removed {
            if let Some(old) = target.layers.remove(&id) {
                releases.extend([old.quads, old.paths].into_iter().flatten().map(Release::Geometry));
            }
        }
        self.release_now(target, releases);

        for layer in &list.layers {
            let unchanged = target.layers.get(&layer.id).is_some_and(|g| g.source == *layer);
            if !unchanged {
                self.upload_layer(target, layer)?;
            }
        }
        Ok(())
    }

    fn upload_layer(&mut self, target: &mut GpuTarget, layer: &Layer) -> Result<(), RenderError> {
        let mesh = LayerMesh::build(layer);
        let mut releases = Vec::new();
        let entry = target.layers.entry(layer.id).or_insert_with(|| LayerGeometry {
            source: Layer::new(layer.id, IntRect::EMPTY),
            mesh: LayerMesh::default(),
            quads: None,
            paths: None,
        });

        // geometry dropped from the layer is released even when a later upload fails
        let mut result = Ok(());
        for format in [VertexFormat::Quad2f4ub2f2f28f, VertexFormat::Path2f4ub2f] {
            let slot = match format {
                VertexFormat::Quad2f4ub2f2f28f => &mut entry.quads,
                VertexFormat::Path2f4ub2f => &mut entry.paths,
            };
            let step = match (*slot, mesh.buffers(format)) {
                (Some(id), Some((vertices, indices))) => {
                    self.driver.update_geometry(id, &vertices, &indices).map_err(RenderError::from)
                }
                (None, Some((vertices, indices))) => {
                    self.create_geometry(&vertices, &indices).map(|id| *slot = Some(id))
                }
                (Some(id), None) => {
                    releases.push(Release::Geometry(id));
                    *slot = None;
                    Ok(())
                }
                (None, None) => Ok(()),
            };
            if step.is_err() {
                result = step;
                break;
            }
        }

        if result.is_ok() {
            entry.source = layer.clone();
            entry.mesh = mesh;
        }
        self.release_now(target, releases);
        result
    }

    fn create_geometry(&mut self, vertices: &VertexBuffer, indices: &IndexBuffer) -> Result<GeometryId, RenderError> {
        let id = self.next_geometry_id()?;
        self.ledger.check_unused(id)?;
        self.driver.create_geometry(id, vertices, indices)?;
        self.ledger.record_create(id)?;
        Ok(id)
    }

    /// Destroys within this frame. Whatever the driver fails to destroy waits
    /// in the target's queue for the next frame.
    fn release_now(&mut self, target: &mut GpuTarget, releases: Vec<Release>) {
        for release in flush_releases(releases, self.driver, self.ledger) {
            target.queue_release(release);
        }
    }

    fn next_geometry_id(&mut self) -> Result<GeometryId, DriverError> {
        self.driver.next_geometry_id().ok_or(DriverError::IdsExhausted(ResourceKind::Geometry))
    }

    fn image_texture(&mut self, target: &mut GpuTarget, image: &Arc<Bitmap>) -> Result<TextureId, RenderError> {
        let key = Arc::as_ptr(image) as usize;
        if let Some(entry) = target.images.get(&key) {
            return Ok(entry.id);
        }
        let id = self.driver.next_texture_id().ok_or(DriverError::IdsExhausted(ResourceKind::Texture))?;
        self.ledger.check_unused(id)?;
        self.driver.create_texture(id, image)?;
        self.ledger.record_create(id)?;
        target.images.insert(key, ImageTexture { _bitmap: image.clone(), id });
        Ok(id)
    }

    /// Queues the textures of images no cached layer draws anymore.
    fn release_unused_images(&mut self, target: &mut GpuTarget) {
        let in_use: HashSet<usize> = target
            .layers
            .values()
            .flat_map(|l| l.mesh.spans.iter())
            .filter_map(|span| span.image.as_ref().map(|i| Arc::as_ptr(i) as usize))
            .collect();
        let unused: Vec<usize> = target.images.keys().filter(|k| !in_use.contains(k)).copied().collect();
        for key in unused {
            if let Some(image) = target.images.remove(&key) {
                target.queue_release(Release::Texture(image.id));
            }
        }
    }
}

fn span_state(layer_state: &GpuState, span: &DrawSpan, texture: Option<TextureId>) -> GpuState {
    let mut state = *layer_state;
    state.shader_type = span.shader;
    state.enable_blend = span.blend;
    state.enable_texturing = texture.is_some();
    state.textures[0] = texture;
    state
}

/// Appends a draw, folding it into the previous one when the state and
/// geometry match and the index ranges are contiguous.
fn push_draw(commands: &mut CommandList, state: GpuState, geometry: GeometryId, offset: u32, count: u32) {
    if let Some(Command::DrawGeometry { state: prev, geometry: prev_geometry, indices_offset, indices_count }) =
        commands.last_mut()
    {
        if *prev == state && *prev_geometry == geometry && *indices_offset + *indices_count == offset {
            *indices_count += count;
            return;
        }
    }
    commands.push(Command::DrawGeometry { state, geometry, indices_offset: offset, indices_count: count });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::recording::{DriverCall, RecordingDriver};
    use crate::render::display_list::{Clip, Color, DisplayItem, LayerId};
    use crate::render::geometry::Rect;
    use crate::render::gpu::state::MAX_CLIPS;
    use crate::render::matrix::Matrix;

    fn scene(red_x: f32) -> DisplayList {
        let mut background = Layer::new(LayerId(1), IntRect::from_size(100, 100));
        background.push(DisplayItem::Clear { color: Color::WHITE });
        let mut square = Layer::new(LayerId(2), IntRect::new(0, 0, 80, 40));
        square.push(DisplayItem::Rect { x: red_x, y: 10.0, w: 20.0, h: 20.0, color: Color::from_u8(255, 0, 0, 255) });
        let mut list = DisplayList::new();
        list.push_layer(background);
        list.push_layer(square);
        list
    }

    fn encode(driver: &mut RecordingDriver, ledger: &mut ResourceLedger, target: &mut GpuTarget, list: &DisplayList, damage: IntRect) -> Result<CommandList, RenderError> {
        driver.begin_synchronize();
        let result = CommandStream::new(driver, ledger, 1.0).encode(target, list, damage);
        driver.end_synchronize();
        result
    }

    #[test]
    fn fresh_target_gets_full_clear_then_draws_in_order() {
        let mut driver = RecordingDriver::new();
        let mut ledger = ResourceLedger::new();
        let mut target = GpuTarget::new(100, 100);

        let list = encode(&mut driver, &mut ledger, &mut target, &scene(10.0), IntRect::EMPTY).unwrap();
        assert_eq!(list.len(), 3);
        assert!(matches!(list.as_slice()[0], Command::ClearRenderBuffer { state } if state.scissor.is_none()));
        let geometries: Vec<_> = list
            .iter()
            .filter_map(|c| match c {
                Command::DrawGeometry { geometry, .. } => Some(*geometry),
                _ => None,
            })
            .collect();
        assert_eq!(geometries.len(), 2);
        assert_ne!(geometries[0], geometries[1]);
        assert_eq!(ledger.created(ResourceKind::Geometry), 2);
    }

    #[test]
    fn unchanged_layers_are_not_reuploaded() {
        let mut driver = RecordingDriver::new();
        let log = driver.log();
        let mut ledger = ResourceLedger::new();
        let mut target = GpuTarget::new(100, 100);

        encode(&mut driver, &mut ledger, &mut target, &scene(10.0), IntRect::EMPTY).unwrap();
        target.mark_presented();

        let next = scene(50.0);
        let damage = next.damage_since(&scene(10.0));
        let list = encode(&mut driver, &mut ledger, &mut target, &next, damage).unwrap();

        let log = log.borrow();
        assert_eq!(log.count(|c| matches!(c, DriverCall::CreateGeometry(_))), 2);
        assert_eq!(log.count(|c| matches!(c, DriverCall::UpdateGeometry(_))), 1);
        match list.as_slice()[0] {
            Command::ClearRenderBuffer { state } => assert_eq!(state.scissor, Some(damage)),
            _ => panic!("expected a clear first"),
        }
    }

    #[test]
    fn removed_layers_destroy_their_geometry() {
        let mut driver = RecordingDriver::new();
        let mut ledger = ResourceLedger::new();
        let mut target = GpuTarget::new(100, 100);

        encode(&mut driver, &mut ledger, &mut target, &scene(10.0), IntRect::EMPTY).unwrap();
        target.mark_presented();

        let mut only_background = scene(10.0);
        only_background.layers.truncate(1);
        encode(&mut driver, &mut ledger, &mut target, &only_background, IntRect::from_size(100, 100)).unwrap();
        assert_eq!(ledger.destroyed(ResourceKind::Geometry), 1);
        assert_eq!(ledger.live_count(ResourceKind::Geometry), 1);
    }

    #[test]
    fn failed_geometry_destroys_wait_in_the_target_queue() {
        let mut driver = RecordingDriver::new();
        let mut ledger = ResourceLedger::new();
        let mut target = GpuTarget::new(100, 100);
        encode(&mut driver, &mut ledger, &mut target, &scene(10.0), IntRect::EMPTY).unwrap();
        target.mark_presented();

        driver.fail_destroys = 1;
        let mut only_background = scene(10.0);
        only_background.layers.truncate(1);
        encode(&mut driver, &mut ledger, &mut target, &only_background, IntRect::from_size(100, 100)).unwrap();
        assert_eq!(ledger.live_count(ResourceKind::Geometry), 2);

        let pending = target.take_pending();
        assert_eq!(pending.len(), 1);
        driver.begin_synchronize();
        assert!(flush_releases(pending, &mut driver, &mut ledger).is_empty());
        driver.end_synchronize();
        assert_eq!(ledger.live_count(ResourceKind::Geometry), 1);
    }

    #[test]
    fn clip_stack_overflow_fails_the_frame() {
        let mut driver = RecordingDriver::new();
        let mut ledger = ResourceLedger::new();
        let mut target = GpuTarget::new(100, 100);

        let mut list = scene(10.0);
        for _ in 0..=MAX_CLIPS {
            list.layers[1].clips.push(Clip::new(Rect::new(0.0, 0.0, 50.0, 50.0), Matrix::IDENTITY));
        }
        let err = encode(&mut driver, &mut ledger, &mut target, &list, IntRect::EMPTY).unwrap_err();
        assert_eq!(err, RenderError::ClipStackOverflow { depth: MAX_CLIPS + 1, max: MAX_CLIPS });
    }

    #[test]
    fn layers_outside_damage_are_skipped() {
        let mut driver = RecordingDriver::new();
        let mut ledger = ResourceLedger::new();
        let mut target = GpuTarget::new(100, 100);

        let mut list = DisplayList::new();
        for (i, x) in [0, 50].into_iter().enumerate() {
            let mut layer = Layer::new(LayerId(i as u64), IntRect::from_xywh(x, 0, 10, 10));
            layer.push(DisplayItem::Clear { color: Color::BLACK });
            list.push_layer(layer);
        }
        encode(&mut driver, &mut ledger, &mut target, &list, IntRect::EMPTY).unwrap();
        target.mark_presented();

        let cmds = encode(&mut driver, &mut ledger, &mut target, &list, IntRect::new(0, 0, 5, 5)).unwrap();
        assert_eq!(cmds.len(), 2);
    }

    #[test]
    fn images_get_textures_once() {
        let mut driver = RecordingDriver::new();
        let log = driver.log();
        let mut ledger = ResourceLedger::new();
        let mut target = GpuTarget::new(100, 100);

        let image = Arc::new(Bitmap::solid(4, 4, Color::BLACK));
        let mut layer = Layer::new(LayerId(1), IntRect::from_size(100, 100));
        layer.push(DisplayItem::Image { x: 0.0, y: 0.0, w: 8.0, h: 8.0, image: image.clone() });
        layer.push(DisplayItem::Image { x: 20.0, y: 0.0, w: 8.0, h: 8.0, image });
        let mut list = DisplayList::new();
        list.push_layer(layer);

        let cmds = encode(&mut driver, &mut ledger, &mut target, &list, IntRect::EMPTY).unwrap();
        // one for the render target, one for the image
        assert_eq!(log.borrow().count(|c| matches!(c, DriverCall::CreateTexture(..))), 2);
        let draw = cmds.as_slice()[1];
        assert!(draw.state().enable_texturing);
        assert!(draw.state().textures[0].is_some());
    }
}
