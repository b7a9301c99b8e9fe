//! Per-view GPU resources.

use crate::render::backend::{GpuDriver, RenderBuffer};
use crate::render::bitmap::{Bitmap, BitmapFormat};
use crate::render::display_list::{Layer, LayerId};
use crate::render::errors::{DriverError, RenderError, ResourceKind};
use crate::render::geometry::Rect;
use crate::render::gpu::ids::{GeometryId, RenderBufferId, ResourceLedger, TextureId};
use crate::render::tessellate::LayerMesh;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Where a GPU-path view's pixels live, for hosts compositing them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderTarget {
    /// `true` until the first frame allocated the texture.
    pub is_empty: bool,
    pub width: u32,
    pub height: u32,
    pub texture_id: Option<TextureId>,
    pub texture_width: u32,
    pub texture_height: u32,
    pub texture_format: BitmapFormat,
    /// Part of the texture holding the view's pixels.
    pub uv_coords: Rect,
    pub render_buffer_id: Option<RenderBufferId>,
}

/// A resource waiting to be destroyed inside the next synchronize bracket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Release {
    Texture(TextureId),
    RenderBuffer(RenderBufferId),
    Geometry(GeometryId),
}

impl Release {
    /// Destroys the resource on the driver, then forgets it in the ledger.
    ///
    /// An id the ledger does not know is refused without calling the driver.
    /// When the driver fails the id stays live and the release can be retried.
    pub fn apply(self, driver: &mut dyn GpuDriver, ledger: &mut ResourceLedger) -> Result<(), DriverError> {
        match self {
            Release::Texture(id) => {
                ledger.check_live(id)?;
                driver.destroy_texture(id)?;
                ledger.record_destroy(id)
            }
            Release::RenderBuffer(id) => {
                ledger.check_live(id)?;
                driver.destroy_render_buffer(id)?;
                ledger.record_destroy(id)
            }
            Release::Geometry(id) => {
                ledger.check_live(id)?;
                driver.destroy_geometry(id)?;
                ledger.record_destroy(id)
            }
        }
    }

    fn is_live(self, ledger: &ResourceLedger) -> bool {
        match self {
            Release::Texture(id) => ledger.is_live(id),
            Release::RenderBuffer(id) => ledger.is_live(id),
            Release::Geometry(id) => ledger.is_live(id),
        }
    }
}

/// Applies `releases` in order and returns the ones to retry next frame:
/// those the driver failed to destroy.
pub fn flush_releases(
    releases: impl IntoIterator<Item = Release>,
    driver: &mut dyn GpuDriver,
    ledger: &mut ResourceLedger,
) -> Vec<Release> {
    let mut retry = Vec::new();
    for release in releases {
        if let Err(e) = release.apply(driver, ledger) {
            log::warn!("{}: failed to release {:?}: {}", driver.name(), release, e);
            if release.is_live(ledger) {
                retry.push(release);
            }
        }
    }
    retry
}

/// Geometry uploaded for one layer, with the layer it was built from.
#[derive(Debug)]
pub(crate) struct LayerGeometry {
    pub source: Layer,
    pub mesh: LayerMesh,
    pub quads: Option<GeometryId>,
    pub paths: Option<GeometryId>,
}

#[derive(Debug)]
pub(crate) struct ImageTexture {
    // keeps the pointer used as cache key alive
    pub _bitmap: Arc<Bitmap>,
    pub id: TextureId,
}

/// Texture + render buffer pair of a view plus its geometry and image caches.
#[derive(Debug)]
pub struct GpuTarget {
    width: u32,
    height: u32,
    texture: Option<TextureId>,
    render_buffer: Option<RenderBufferId>,
    fresh: bool,
    pub(crate) layers: BTreeMap<LayerId, LayerGeometry>,
    pub(crate) images: HashMap<usize, ImageTexture>,
    pending: Vec<Release>,
}

impl GpuTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            texture: None,
            render_buffer: None,
            fresh: true,
            layers: BTreeMap::new(),
            images: HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn render_buffer(&self) -> Option<RenderBufferId> {
        self.render_buffer
    }

    /// `true` when the next frame must clear and redraw everything.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub(crate) fn mark_presented(&mut self) {
        self.fresh = false;
    }

    pub fn descriptor(&self) -> RenderTarget {
        RenderTarget {
            is_empty: self.texture.is_none() || self.render_buffer.is_none(),
            width: self.width,
            height: self.height,
            texture_id: self.texture,
            texture_width: self.width,
            texture_height: self.height,
            texture_format: BitmapFormat::Bgra8UnormPremultiplied,
            uv_coords: Rect::new(0.0, 0.0, 1.0, 1.0),
            render_buffer_id: self.render_buffer,
        }
    }

    /// Allocates the texture and render buffer if needed. Must run inside a
    /// synchronize bracket.
    pub fn ensure_allocated(
        &mut self,
        driver: &mut dyn GpuDriver,
        ledger: &mut ResourceLedger,
    ) -> Result<RenderBufferId, RenderError> {
        let texture = match self.texture {
            Some(id) => id,
            None => {
                let id = driver.next_texture_id().ok_or(DriverError::IdsExhausted(ResourceKind::Texture))?;
                ledger.check_unused(id)?;
                driver.create_texture(id, &Bitmap::empty())?;
                ledger.record_create(id)?;
                self.texture = Some(id);
                self.fresh = true;
                id
            }
        };
        match self.render_buffer {
            Some(id) => Ok(id),
            None => {
                let id = driver
                    .next_render_buffer_id()
                    .ok_or(DriverError::IdsExhausted(ResourceKind::RenderBuffer))?;
                let desc = RenderBuffer {
                    texture,
                    width: self.width,
                    height: self.height,
                    has_stencil: false,
                    has_depth: false,
                };
                ledger.check_unused(id)?;
                driver.create_render_buffer(id, &desc)?;
                ledger.record_create(id)?;
                log::debug!("{}: allocated render target {} ({}x{})", driver.name(), id, self.width, self.height);
                self.render_buffer = Some(id);
                self.fresh = true;
                Ok(id)
            }
        }
    }

    /// Moves every resource id into the pending release queue.
    fn release_all(&mut self) {
        if let Some(id) = self.render_buffer.take() {
            self.pending.push(Release::RenderBuffer(id));
        }
        if let Some(id) = self.texture.take() {
            self.pending.push(Release::Texture(id));
        }
        self.purge_caches();
    }

    /// Drops every resource; the next frame reallocates at the new size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.release_all();
        self.width = width;
        self.height = height;
    }

    /// Releases everything and hands back the ids still to be destroyed.
    pub fn into_releases(mut self) -> Vec<Release> {
        self.release_all();
        std::mem::take(&mut self.pending)
    }

    /// Drops cached geometry and images so they are rebuilt on demand.
    pub fn purge_caches(&mut self) {
        for (_, layer) in std::mem::take(&mut self.layers) {
            self.pending.extend(layer.quads.map(Release::Geometry));
            self.pending.extend(layer.paths.map(Release::Geometry));
        }
        for (_, image) in self.images.drain() {
            self.pending.push(Release::Texture(image.id));
        }
        self.fresh = true;
    }

    pub(crate) fn queue_release(&mut self, release: Release) {
        self.pending.push(release);
    }

    pub fn take_pending(&mut self) -> Vec<Release> {
        std::mem::take(&mut self.pending)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of live driver resources this target holds.
    pub fn resource_count(&self) -> usize {
        let geometry: usize = self
            .layers
            .values()
            .map(|l| l.quads.is_some() as usize + l.paths.is_some() as usize)
            .sum();
        self.texture.is_some() as usize + self.render_buffer.is_some() as usize + geometry + self.images.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::recording::{DriverCall, RecordingDriver};

    #[test]
    fn allocation_is_lazy_and_idempotent() {
        let mut driver = RecordingDriver::new();
        let mut ledger = ResourceLedger::new();
        let mut target = GpuTarget::new(64, 32);
        assert!(target.descriptor().is_empty);

        driver.begin_synchronize();
        let rb = target.ensure_allocated(&mut driver, &mut ledger).unwrap();
        assert_eq!(target.ensure_allocated(&mut driver, &mut ledger).unwrap(), rb);
        driver.end_synchronize();

        let desc = target.descriptor();
        assert!(!desc.is_empty);
        assert_eq!((desc.texture_width, desc.texture_height), (64, 32));
        assert_eq!(desc.render_buffer_id, Some(rb));
        assert_eq!(ledger.created(ResourceKind::Texture), 1);
        assert_eq!(ledger.created(ResourceKind::RenderBuffer), 1);
    }

    #[test]
    fn resize_queues_releases() {
        let mut driver = RecordingDriver::new();
        let mut ledger = ResourceLedger::new();
        let mut target = GpuTarget::new(10, 10);
        driver.begin_synchronize();
        target.ensure_allocated(&mut driver, &mut ledger).unwrap();
        driver.end_synchronize();
        target.mark_presented();

        target.resize(20, 20);
        assert!(target.is_fresh());
        assert!(target.descriptor().is_empty);
        let pending = target.take_pending();
        assert_eq!(pending.len(), 2);

        driver.begin_synchronize();
        assert!(flush_releases(pending, &mut driver, &mut ledger).is_empty());
        driver.end_synchronize();
        assert_eq!(ledger.total_live(), 0);
    }

    #[test]
    fn failed_destroys_stay_live_and_are_retried() {
        let mut driver = RecordingDriver::new();
        let log = driver.log();
        let mut ledger = ResourceLedger::new();
        let mut target = GpuTarget::new(10, 10);
        driver.begin_synchronize();
        target.ensure_allocated(&mut driver, &mut ledger).unwrap();
        driver.end_synchronize();

        driver.fail_destroys = 1;
        driver.begin_synchronize();
        let retry = flush_releases(target.into_releases(), &mut driver, &mut ledger);
        driver.end_synchronize();
        assert_eq!(retry.len(), 1);
        assert_eq!(ledger.total_live(), 1);
        assert_eq!(log.borrow().live(), 1);

        driver.begin_synchronize();
        assert!(flush_releases(retry, &mut driver, &mut ledger).is_empty());
        driver.end_synchronize();
        assert_eq!(ledger.total_live(), 0);
        assert_eq!(log.borrow().live(), 0);
        assert!(log.borrow().violations.is_empty());
    }

    #[test]
    fn unknown_releases_never_reach_the_driver() {
        let mut driver = RecordingDriver::new();
        let log = driver.log();
        let mut ledger = ResourceLedger::new();
        let stale = Release::Geometry(GeometryId::new(7).unwrap());

        driver.begin_synchronize();
        assert!(matches!(stale.apply(&mut driver, &mut ledger), Err(DriverError::UnknownResource { .. })));
        assert!(flush_releases([stale], &mut driver, &mut ledger).is_empty());
        driver.end_synchronize();
        assert_eq!(log.borrow().count(|c| matches!(c, DriverCall::DestroyGeometry(_))), 0);
    }

    #[test]
    fn ids_the_ledger_already_tracks_are_not_created() {
        let mut driver = RecordingDriver::new();
        let log = driver.log();
        let mut ledger = ResourceLedger::new();
        // the driver hands out texture 1 first
        ledger.record_create(TextureId::new(1).unwrap()).unwrap();

        let mut target = GpuTarget::new(10, 10);
        driver.begin_synchronize();
        let err = target.ensure_allocated(&mut driver, &mut ledger).unwrap_err();
        driver.end_synchronize();
        assert_eq!(err, RenderError::Driver(DriverError::DuplicateResource { kind: ResourceKind::Texture, id: 1 }));
        assert_eq!(log.borrow().count(|c| matches!(c, DriverCall::CreateTexture(..))), 0);
        assert!(target.descriptor().is_empty);
    }
}
