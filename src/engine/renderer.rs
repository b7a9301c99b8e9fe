use crate::engine::config::Config;
use crate::engine::errors::EngineError;
use crate::engine::platform::Platform;
use crate::engine::session::Session;
use crate::engine::tick::{FrameClock, Tick};
use crate::engine::view::{View, ViewId, ViewTarget};
use crate::render::backend::GpuDriver;
use crate::render::errors::{RenderError, ResourceKind};
use crate::render::gpu::ids::ResourceLedger;
use crate::render::gpu::target::{flush_releases, GpuTarget, Release};
use crate::render::surface::SurfaceFactory;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Size of inspector views until the host resizes them.
const INSPECTOR_SIZE: u32 = 10;

/// Outcome of one [`Renderer::render`] call.
#[derive(Debug, Default)]
pub struct RenderReport {
    pub painted: Vec<ViewId>,
    /// Views whose frame failed. They keep `needs_paint` and are retried.
    pub failed: Vec<(ViewId, RenderError)>,
    /// Views skipped because another thread holds their script lock.
    pub skipped: Vec<ViewId>,
}

impl RenderReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Snapshot of what the renderer currently holds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryUsage {
    pub views: usize,
    pub cpu_views: usize,
    pub gpu_views: usize,
    /// Pixel memory of all paint targets.
    pub pixel_bytes: usize,
    pub live_textures: usize,
    pub live_render_buffers: usize,
    pub live_geometry: usize,
    /// Resources waiting to be destroyed on the next frame.
    pub pending_releases: usize,
}

/// Owns every view and drives their painting.
///
/// The renderer lives on one thread: the driver and surface factory it holds
/// are not `Send`. Call [`update`](Renderer::update) then
/// [`render`](Renderer::render) once per host frame.
pub struct Renderer {
    config: Config,
    gpu_driver: Option<Box<dyn GpuDriver>>,
    surface_factory: Box<dyn SurfaceFactory>,
    /// Every driver resource the core created and has not destroyed
    ledger: ResourceLedger,
    views: BTreeMap<ViewId, View>,
    default_session: Arc<Session>,
    next_session_id: u64,
    clock: FrameClock,
    frame: u64,
    last_animation: Option<f64>,
    last_recycle: f64,
    /// Releases of destroyed views, flushed inside the next bracket
    pending: Vec<Release>,
}

impl Renderer {
    /// Creates a renderer from the host's platform. Fails when GPU rendering
    /// is configured without a driver.
    pub fn new(platform: Platform) -> Result<Self, EngineError> {
        let Platform { config, mut gpu_driver, surface_factory } = platform;
        if config.use_gpu_renderer && gpu_driver.is_none() {
            return Err(EngineError::GpuDriverMissing);
        }
        if let Some(driver) = gpu_driver.as_deref_mut() {
            driver.set_face_winding(config.face_winding);
        }

        let default_session = Arc::new(Session::new(0, "default", true, config.cache_path.as_deref()));
        log::info!(
            "Renderer: {} (driver: {})",
            config,
            gpu_driver.as_ref().map(|d| d.name()).unwrap_or("none")
        );

        Ok(Self {
            config,
            gpu_driver,
            surface_factory,
            ledger: ResourceLedger::new(),
            views: BTreeMap::new(),
            default_session,
            next_session_id: 1,
            clock: FrameClock::new(),
            frame: 0,
            last_animation: None,
            last_recycle: 0.0,
            pending: Vec::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn create_session(&mut self, persistent: bool, name: &str) -> Arc<Session> {
        let id = self.next_session_id;
        self.next_session_id += 1;
        let session = Session::new(id, name, persistent, self.config.cache_path.as_deref());
        log::debug!("Renderer: created session {}", session);
        Arc::new(session)
    }

    pub fn default_session(&self) -> Arc<Session> {
        Arc::clone(&self.default_session)
    }

    /// Creates a view. It paints through the GPU driver when GPU rendering is
    /// configured, unless `force_cpu` asks for a CPU surface.
    pub fn create_view(
        &mut self,
        width: u32,
        height: u32,
        transparent: bool,
        session: Option<Arc<Session>>,
        force_cpu: bool,
    ) -> Result<ViewId, EngineError> {
        if self.views.len() >= self.config.max_views {
            return Err(EngineError::ViewLimitExceeded);
        }

        let target = if self.config.use_gpu_renderer && !force_cpu {
            ViewTarget::Gpu(GpuTarget::new(width, height))
        } else {
            ViewTarget::Cpu(self.surface_factory.create_surface(width, height)?)
        };
        let session = session.unwrap_or_else(|| self.default_session());
        let id = ViewId::new();
        let mut view = View::new(id, width, height, transparent, session, target);
        view.set_user_agent(&self.config.user_agent);
        log::debug!("Renderer: created view {} ({}x{}, gpu: {})", id, width, height, view.is_gpu());
        self.views.insert(id, view);
        Ok(id)
    }

    pub fn view(&self, id: ViewId) -> Option<&View> {
        self.views.get(&id)
    }

    pub fn view_mut(&mut self, id: ViewId) -> Option<&mut View> {
        self.views.get_mut(&id)
    }

    /// All views in paint order.
    pub fn views(&self) -> impl Iterator<Item = &View> + '_ {
        self.views.values()
    }

    /// Destroys a view and its inspector. Inspectors belong to their parent and
    /// cannot be destroyed on their own.
    pub fn destroy_view(&mut self, id: ViewId) -> Result<(), EngineError> {
        let view = self.views.get(&id).ok_or(EngineError::InvalidViewId)?;
        if view.is_inspector() {
            return Err(EngineError::NotOwned);
        }
        self.remove_view(id);
        Ok(())
    }

    fn remove_view(&mut self, id: ViewId) {
        let Some(view) = self.views.remove(&id) else { return };
        if let Some(inspector) = view.inspector_id() {
            self.remove_view(inspector);
        }
        log::debug!("Renderer: destroying view {}", id);
        match view.into_target() {
            ViewTarget::Cpu(surface) => self.surface_factory.destroy_surface(surface),
            ViewTarget::Gpu(target) => self.pending.extend(target.into_releases()),
        }
    }

    /// Returns the inspector of `parent`, creating it on first use.
    pub fn inspector(&mut self, parent: ViewId) -> Result<ViewId, EngineError> {
        let view = self.views.get(&parent).ok_or(EngineError::InvalidViewId)?;
        if let Some(id) = view.inspector_id() {
            return Ok(id);
        }
        let session = Arc::clone(view.session());
        let force_cpu = !view.is_gpu();

        let id = self.create_view(INSPECTOR_SIZE, INSPECTOR_SIZE, false, Some(session), force_cpu)?;
        if let Some(inspector) = self.views.get_mut(&id) {
            inspector.set_parent(parent);
        }
        if let Some(view) = self.views.get_mut(&parent) {
            view.set_inspector(id);
        }
        Ok(id)
    }

    /// Advances the frame clock and collects content changes.
    ///
    /// Content is ticked at most every `animation_timer_delay` seconds. With
    /// `force_repaint` every view is repainted each frame. Idle GPU caches are
    /// recycled every `recycle_delay` seconds.
    pub fn update(&mut self) {
        let tick = self.clock.tick();
        self.advance(tick);
    }

    fn advance(&mut self, tick: Tick) {
        let animate = self
            .last_animation
            .map_or(true, |last| tick.now - last >= self.config.animation_timer_delay);
        if animate {
            self.last_animation = Some(tick.now);
            for view in self.views.values_mut() {
                view.tick(&tick);
            }
        }

        if self.config.force_repaint {
            for view in self.views.values_mut() {
                view.set_needs_paint(true);
            }
        }

        if tick.now - self.last_recycle >= self.config.recycle_delay {
            self.last_recycle = tick.now;
            self.recycle();
        }
    }

    // Views that did not paint since the previous run give back their caches.
    fn recycle(&mut self) {
        let since = self.frame.saturating_sub(1);
        let mut recycled = 0;
        for view in self.views.values_mut().filter(|v| v.is_gpu()) {
            if view.last_paint_frame().map_or(true, |f| f < since) && !view.needs_paint() {
                view.purge_caches();
                recycled += 1;
            }
        }
        if recycled > 0 {
            log::debug!("Renderer: recycled caches of {} idle views", recycled);
        }
    }

    /// Paints every view that needs it, in stable id order.
    ///
    /// GPU work of the whole frame is sent inside one synchronize bracket,
    /// starting with the resources released since the previous frame.
    pub fn render(&mut self) -> RenderReport {
        let mut report = RenderReport::default();
        let frame = self.frame;
        self.frame += 1;

        let gpu_work = !self.pending.is_empty()
            || self.views.values().any(|v| v.is_gpu() && (v.needs_paint() || v.has_releases()));
        let mut driver = self.gpu_driver.as_deref_mut().filter(|_| gpu_work);

        if let Some(driver) = driver.as_deref_mut() {
            driver.begin_synchronize();
            let releases: Vec<Release> =
                self.pending.drain(..).chain(self.views.values_mut().flat_map(View::take_releases)).collect();
            self.pending = flush_releases(releases, driver, &mut self.ledger);
        }

        for (id, view) in self.views.iter_mut() {
            if !view.needs_paint() {
                continue;
            }
            match view.paint(driver.as_deref_mut(), &mut self.ledger, self.config.device_scale, frame) {
                Ok(_) => report.painted.push(*id),
                Err(RenderError::ScriptLocked) => {
                    log::debug!("Renderer: view {} is script locked, skipping", id);
                    report.skipped.push(*id);
                }
                Err(e) => {
                    log::warn!("Renderer: painting view {} failed: {}", id, e);
                    report.failed.push((*id, e));
                }
            }
        }

        if let Some(driver) = driver {
            driver.end_synchronize();
        }
        report
    }

    /// Drops every cached GPU resource that can be rebuilt. Views redraw fully
    /// on their next paint.
    pub fn purge_memory(&mut self) {
        for view in self.views.values_mut() {
            view.purge_caches();
            if view.is_gpu() {
                view.set_needs_paint(true);
            }
        }
        log::info!("Renderer: purged memory");
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let gpu_views = self.views.values().filter(|v| v.is_gpu()).count();
        MemoryUsage {
            views: self.views.len(),
            cpu_views: self.views.len() - gpu_views,
            gpu_views,
            pixel_bytes: self.views.values().map(View::pixel_bytes).sum(),
            live_textures: self.ledger.live_count(ResourceKind::Texture),
            live_render_buffers: self.ledger.live_count(ResourceKind::RenderBuffer),
            live_geometry: self.ledger.live_count(ResourceKind::Geometry),
            pending_releases: self.pending.len(),
        }
    }

    pub fn log_memory_usage(&self) {
        match serde_json::to_string(&self.memory_usage()) {
            Ok(json) => log::info!("Renderer memory: {}", json),
            Err(e) => log::warn!("Renderer: cannot serialize memory usage: {}", e),
        }
    }

    /// The installed GPU driver, for hosts that downcast to their own type.
    pub fn gpu_driver(&self) -> Option<&dyn GpuDriver> {
        self.gpu_driver.as_deref()
    }

    pub fn gpu_driver_mut(&mut self) -> Option<&mut (dyn GpuDriver + 'static)> {
        self.gpu_driver.as_deref_mut()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let ids: Vec<ViewId> = self.views.keys().copied().collect();
        for id in ids {
            self.remove_view(id);
        }
        if self.pending.is_empty() {
            return;
        }
        match self.gpu_driver.as_deref_mut() {
            Some(driver) => {
                driver.begin_synchronize();
                let leaked = flush_releases(self.pending.drain(..), driver, &mut self.ledger);
                driver.end_synchronize();
                if !leaked.is_empty() {
                    log::warn!("Renderer: {} GPU resources could not be released", leaked.len());
                }
            }
            None => log::warn!("Renderer: {} GPU resources leaked, no driver installed", self.pending.len()),
        }
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("config", &self.config)
            .field("views", &self.views.len())
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}
