//! Offscreen views.
//!
//! A [`View`] is one offscreen web page. It owns the page state, a script lock,
//! and exactly one paint target: a CPU [`Surface`] or a GPU render target
//! created through the installed driver. Views are created, painted and
//! destroyed by the [`Renderer`](crate::engine::Renderer); the host only loads
//! content, resizes, and reads pixels back.

pub mod page;
pub mod script_lock;

use crate::engine::errors::EngineError;
use crate::engine::session::Session;
use crate::engine::tick::Tick;
use crate::render::backend::GpuDriver;
use crate::render::errors::RenderError;
use crate::render::gpu::ids::ResourceLedger;
use crate::render::gpu::stream::CommandStream;
use crate::render::gpu::target::{GpuTarget, Release, RenderTarget};
use crate::render::raster::{paint_display_list, Canvas, ClipRegion};
use crate::render::surface::{with_locked_pixels, Surface};
use crate::render::{DisplayList, IntRect, Viewport};
use bitflags::bitflags;
use page::{ContentSource, PageContext};
use script_lock::ScriptLock;
use std::fmt;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// A unique identifier for a view within a [`Renderer`](crate::engine::Renderer).
///
/// Treat it as an opaque handle; the [`Uuid`] inside is an implementation detail.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(Uuid);

impl ViewId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ViewId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// Reasons a view must be painted again.
    pub struct InvalidationFlags: u8 {
        /// Page content produced a new display list
        const CONTENT = 0b0001;
        /// The view was resized
        const SIZE    = 0b0010;
        /// The paint target lost its contents
        const TARGET  = 0b0100;
        /// Repaint requested by the host or by `force_repaint`
        const FORCED  = 0b1000;
    }
}

/// Where a view paints.
pub enum ViewTarget {
    Cpu(Box<dyn Surface>),
    Gpu(GpuTarget),
}

impl fmt::Debug for ViewTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewTarget::Cpu(s) => write!(f, "Cpu({}x{})", s.width(), s.height()),
            ViewTarget::Gpu(t) => f.debug_tuple("Gpu").field(t).finish(),
        }
    }
}

pub struct View {
    id: ViewId,
    width: u32,
    height: u32,
    session: Arc<Session>,
    page: PageContext,
    target: ViewTarget,
    invalidation: InvalidationFlags,
    /// Display list currently visible in the target
    painted: DisplayList,
    /// Page scene epoch `painted` was built at
    painted_epoch: Option<u64>,
    script_lock: Arc<ScriptLock>,
    /// Set on inspector views
    parent: Option<ViewId>,
    inspector: Option<ViewId>,
    /// Renderer frame of the last successful paint
    last_paint_frame: Option<u64>,
}

impl View {
    pub(crate) fn new(
        id: ViewId,
        width: u32,
        height: u32,
        transparent: bool,
        session: Arc<Session>,
        target: ViewTarget,
    ) -> Self {
        Self {
            id,
            width,
            height,
            session,
            page: PageContext::new(Viewport::new(width, height), transparent),
            target,
            invalidation: InvalidationFlags::CONTENT | InvalidationFlags::TARGET,
            painted: DisplayList::new(),
            painted_epoch: None,
            script_lock: ScriptLock::new(),
            parent: None,
            inspector: None,
            last_paint_frame: None,
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Resizes the view. The paint target is reallocated and the next paint
    /// redraws everything. A locked CPU surface cannot be resized.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        match &mut self.target {
            ViewTarget::Cpu(surface) => surface.resize(width, height)?,
            ViewTarget::Gpu(target) => target.resize(width, height),
        }
        log::debug!("view {}: resized {}x{} -> {}x{}", self.id, self.width, self.height, width, height);
        self.width = width;
        self.height = height;
        self.page.set_viewport(Viewport::new(width, height));
        self.painted.clear();
        self.painted_epoch = None;
        self.invalidation |= InvalidationFlags::SIZE | InvalidationFlags::TARGET;
        Ok(())
    }

    pub fn needs_paint(&self) -> bool {
        !self.invalidation.is_empty()
    }

    /// Forces a repaint on the next frame, or drops all pending reasons.
    pub fn set_needs_paint(&mut self, needs_paint: bool) {
        if needs_paint {
            self.invalidation |= InvalidationFlags::FORCED;
        } else {
            self.invalidation = InvalidationFlags::empty();
        }
    }

    pub fn invalidation(&self) -> InvalidationFlags {
        self.invalidation
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self.target, ViewTarget::Gpu(_))
    }

    /// The CPU surface, `None` for views on the GPU path.
    pub fn surface(&self) -> Option<&dyn Surface> {
        match &self.target {
            ViewTarget::Cpu(surface) => Some(surface.as_ref()),
            ViewTarget::Gpu(_) => None,
        }
    }

    pub fn surface_mut(&mut self) -> Option<&mut (dyn Surface + 'static)> {
        match &mut self.target {
            ViewTarget::Cpu(surface) => Some(surface.as_mut()),
            ViewTarget::Gpu(_) => None,
        }
    }

    /// Texture and render buffer of a GPU-path view, `None` on the CPU path.
    pub fn render_target(&self) -> Option<RenderTarget> {
        match &self.target {
            ViewTarget::Gpu(target) => Some(target.descriptor()),
            ViewTarget::Cpu(_) => None,
        }
    }

    pub fn load_html(&mut self, html: &str, url: Option<&str>) -> Result<(), EngineError> {
        self.page.load_html(html, url)?;
        self.invalidation |= InvalidationFlags::CONTENT;
        Ok(())
    }

    pub fn load_display_list(&mut self, list: DisplayList) {
        self.page.load_display_list(list);
        self.invalidation |= InvalidationFlags::CONTENT;
    }

    pub fn load_content(&mut self, source: Box<dyn ContentSource>) {
        self.page.load_content(source);
        self.invalidation |= InvalidationFlags::CONTENT;
    }

    pub fn url(&self) -> Option<&Url> {
        self.page.current_url()
    }

    pub fn title(&self) -> &str {
        self.page.title()
    }

    pub fn is_loading(&self) -> bool {
        self.page.is_loading()
    }

    pub fn is_transparent(&self) -> bool {
        self.page.is_transparent()
    }

    pub fn user_agent(&self) -> &str {
        self.page.user_agent()
    }

    pub(crate) fn set_user_agent(&mut self, user_agent: &str) {
        self.page.set_user_agent(user_agent);
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Lock to hold around script access from worker threads.
    pub fn script_lock(&self) -> Arc<ScriptLock> {
        Arc::clone(&self.script_lock)
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    /// The view this inspector belongs to.
    pub fn parent(&self) -> Option<ViewId> {
        self.parent
    }

    pub fn inspector_id(&self) -> Option<ViewId> {
        self.inspector
    }

    pub fn is_inspector(&self) -> bool {
        self.parent.is_some()
    }

    pub(crate) fn set_parent(&mut self, parent: ViewId) {
        self.parent = Some(parent);
    }

    pub(crate) fn set_inspector(&mut self, inspector: ViewId) {
        self.inspector = Some(inspector);
    }

    pub fn last_paint_frame(&self) -> Option<u64> {
        self.last_paint_frame
    }

    pub(crate) fn tick(&mut self, tick: &Tick) {
        if self.page.tick(tick) {
            self.invalidation |= InvalidationFlags::CONTENT;
        }
    }

    /// Paints pending changes into the view's target and returns the area that
    /// was redrawn.
    ///
    /// GPU-path views must be painted inside a synchronize bracket. On error
    /// the view keeps its invalidation flags and is retried next frame.
    pub(crate) fn paint(
        &mut self,
        driver: Option<&mut (dyn GpuDriver + 'static)>,
        ledger: &mut ResourceLedger,
        device_scale: f64,
        frame: u64,
    ) -> Result<IntRect, RenderError> {
        // Held until the paint is done so workers cannot touch the page mid-frame
        let script_lock = Arc::clone(&self.script_lock);
        let _guard = script_lock.try_lock().ok_or(RenderError::ScriptLocked)?;

        self.page.rebuild_display_list_if_needed();
        let epoch = self.page.scene_epoch();
        let list = self.page.display_list();

        let full = IntRect::from_size(self.width, self.height);
        let redraw_all = InvalidationFlags::SIZE | InvalidationFlags::TARGET | InvalidationFlags::FORCED;
        let damage = if self.invalidation.intersects(redraw_all) {
            full
        } else if self.painted_epoch == Some(epoch) {
            IntRect::EMPTY
        } else {
            list.damage_since(&self.painted).intersect(&full)
        };

        match &mut self.target {
            ViewTarget::Cpu(surface) => {
                if !damage.is_empty() {
                    let (width, height) = (surface.width(), surface.height());
                    with_locked_pixels(surface.as_mut(), |pixels, row_bytes| -> Result<(), RenderError> {
                        let mut canvas = Canvas::new(pixels, width, height, row_bytes)?;
                        canvas.clear(&ClipRegion::new(damage), [0; 4]);
                        paint_display_list(&mut canvas, list, damage)
                    })??;
                    surface.set_dirty_bounds(damage);
                }
            }
            ViewTarget::Gpu(target) => {
                let driver = driver.ok_or(RenderError::MissingDriver)?;
                let commands = CommandStream::new(&mut *driver, ledger, device_scale).encode(target, list, damage)?;
                if !commands.is_empty() {
                    driver.update_command_list(&commands)?;
                }
                target.mark_presented();
            }
        }

        log::trace!("view {}: painted {:?}", self.id, damage);
        if self.painted_epoch != Some(epoch) {
            self.painted = list.clone();
            self.painted_epoch = Some(epoch);
        }
        self.invalidation = InvalidationFlags::empty();
        self.last_paint_frame = Some(frame);
        Ok(damage)
    }

    /// Releases cached GPU geometry and images. The next paint redraws fully.
    pub(crate) fn purge_caches(&mut self) {
        if let ViewTarget::Gpu(target) = &mut self.target {
            target.purge_caches();
        }
    }

    pub(crate) fn take_releases(&mut self) -> Vec<Release> {
        match &mut self.target {
            ViewTarget::Gpu(target) => target.take_pending(),
            ViewTarget::Cpu(_) => Vec::new(),
        }
    }

    pub(crate) fn has_releases(&self) -> bool {
        match &self.target {
            ViewTarget::Gpu(target) => target.has_pending(),
            ViewTarget::Cpu(_) => false,
        }
    }

    /// Bytes of pixel memory held by the paint target.
    pub fn pixel_bytes(&self) -> usize {
        match &self.target {
            ViewTarget::Cpu(surface) => surface.size(),
            ViewTarget::Gpu(target) => target.width() as usize * target.height() as usize * 4,
        }
    }

    pub(crate) fn into_target(self) -> ViewTarget {
        self.target
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("id", &self.id)
            .field("size", &(self.width, self.height))
            .field("session", &self.session.name())
            .field("target", &self.target)
            .field("invalidation", &self.invalidation)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::software::SoftwareDriver;
    use crate::render::errors::SurfaceError;
    use crate::render::surface::{BitmapSurfaceFactory, SurfaceFactory};
    use crate::render::{Color, DisplayItem, Layer, LayerId};
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::mpsc;
    use std::thread;

    /// Content whose paint asks another thread to take the script lock.
    struct ContendedContent {
        lock: Arc<ScriptLock>,
        worker_got_lock: Rc<Cell<Option<bool>>>,
    }

    impl ContentSource for ContendedContent {
        fn paint(&mut self, viewport: Viewport) -> DisplayList {
            let lock = Arc::clone(&self.lock);
            let got = thread::spawn(move || lock.try_lock().is_some()).join().unwrap();
            self.worker_got_lock.set(Some(got));
            DisplayList::solid(viewport.width, viewport.height, Color::BLACK)
        }
    }

    fn cpu_view(width: u32, height: u32, transparent: bool) -> View {
        let surface = BitmapSurfaceFactory.create_surface(width, height).unwrap();
        let session = Arc::new(Session::new(1, "test", false, None));
        View::new(ViewId::new(), width, height, transparent, session, ViewTarget::Cpu(surface))
    }

    fn square(x: f32) -> DisplayList {
        let mut layer = Layer::new(LayerId(1), IntRect::from_xywh(x as i32, 10, 20, 20));
        layer.push(DisplayItem::Rect { x, y: 10.0, w: 20.0, h: 20.0, color: Color::from_u8(0, 0, 255, 255) });
        let mut list = DisplayList::new();
        list.push_layer(layer);
        list
    }

    #[test]
    fn first_paint_is_full_then_damage_only() {
        let mut view = cpu_view(100, 100, true);
        let mut ledger = ResourceLedger::new();
        view.load_display_list(square(10.0));
        assert_eq!(view.paint(None, &mut ledger, 1.0, 0).unwrap(), IntRect::from_size(100, 100));
        assert!(!view.needs_paint());

        view.surface_mut().unwrap().clear_dirty_bounds();
        view.load_display_list(square(50.0));
        let damage = view.paint(None, &mut ledger, 1.0, 1).unwrap();
        assert_eq!(damage, IntRect::new(10, 10, 70, 30));
        assert_eq!(view.surface().unwrap().dirty_bounds(), damage);

        let surface = view.surface().unwrap().as_any().downcast_ref::<crate::render::surface::BitmapSurface>().unwrap();
        // old position cleared, new one painted
        assert_eq!(surface.bitmap().pixel(15, 15), Some(&[0u8, 0, 0, 0][..]));
        assert_eq!(surface.bitmap().pixel(55, 15), Some(&[255u8, 0, 0, 255][..]));
    }

    #[test]
    fn resize_is_rejected_while_locked() {
        let mut view = cpu_view(20, 20, false);
        view.surface_mut().unwrap().lock_pixels().unwrap();
        assert!(matches!(view.resize(40, 40), Err(EngineError::Surface(SurfaceError::Locked))));
        assert_eq!(view.width(), 20);

        view.surface_mut().unwrap().unlock_pixels().unwrap();
        view.resize(40, 40).unwrap();
        assert_eq!(view.surface().unwrap().width(), 40);
        assert!(view.invalidation().contains(InvalidationFlags::SIZE));
    }

    #[test]
    fn set_needs_paint_round_trips() {
        let mut view = cpu_view(8, 8, false);
        let mut ledger = ResourceLedger::new();
        view.paint(None, &mut ledger, 1.0, 0).unwrap();
        assert!(!view.needs_paint());
        view.set_needs_paint(true);
        assert_eq!(view.invalidation(), InvalidationFlags::FORCED);
        view.set_needs_paint(false);
        assert!(!view.needs_paint());
    }

    #[test]
    fn gpu_view_without_driver_fails() {
        let session = Arc::new(Session::new(1, "test", false, None));
        let mut view = View::new(ViewId::new(), 8, 8, false, session, ViewTarget::Gpu(GpuTarget::new(8, 8)));
        let mut ledger = ResourceLedger::new();
        assert_eq!(view.paint(None, &mut ledger, 1.0, 0), Err(RenderError::MissingDriver));
        assert!(view.needs_paint());
    }

    #[test]
    fn gpu_view_paints_through_driver() {
        let session = Arc::new(Session::new(1, "test", false, None));
        let mut view = View::new(ViewId::new(), 100, 100, false, session, ViewTarget::Gpu(GpuTarget::new(100, 100)));
        view.load_display_list(square(10.0));

        let mut driver = SoftwareDriver::new();
        let mut ledger = ResourceLedger::new();
        driver.begin_synchronize();
        view.paint(Some(&mut driver), &mut ledger, 1.0, 0).unwrap();
        driver.end_synchronize();

        let target = view.render_target().unwrap();
        assert!(!target.is_empty);
        let pixels = driver.render_buffer_pixels(target.render_buffer_id.unwrap()).unwrap();
        assert_eq!(pixels.pixel(15, 15), Some(&[255u8, 0, 0, 255][..]));
        assert_eq!(pixels.pixel(50, 50), Some(&[255u8, 255, 255, 255][..]));
    }

    #[test]
    fn paint_holds_the_script_lock() {
        let mut view = cpu_view(8, 8, true);
        let lock = view.script_lock();
        let worker_got_lock = Rc::new(Cell::new(None));
        view.load_content(Box::new(ContendedContent { lock, worker_got_lock: Rc::clone(&worker_got_lock) }));

        view.paint(None, &mut ResourceLedger::new(), 1.0, 0).unwrap();
        assert_eq!(worker_got_lock.get(), Some(false));
        assert!(!view.script_lock().is_locked());
    }

    #[test]
    fn paint_is_refused_while_another_thread_holds_the_lock() {
        let mut view = cpu_view(8, 8, false);
        let lock = view.script_lock();
        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let worker = thread::spawn(move || {
            let _guard = lock.lock();
            locked_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });
        locked_rx.recv().unwrap();

        let mut ledger = ResourceLedger::new();
        assert_eq!(view.paint(None, &mut ledger, 1.0, 0), Err(RenderError::ScriptLocked));
        assert!(view.needs_paint());
        assert!(view.page().needs_rebuild());

        release_tx.send(()).unwrap();
        worker.join().unwrap();
        assert!(view.paint(None, &mut ledger, 1.0, 1).is_ok());
    }

    #[test]
    fn unchanged_scene_repaints_nothing() {
        let mut view = cpu_view(40, 40, true);
        let mut ledger = ResourceLedger::new();
        view.load_display_list(square(10.0));
        view.paint(None, &mut ledger, 1.0, 0).unwrap();
        let epoch = view.page().scene_epoch();

        view.surface_mut().unwrap().clear_dirty_bounds();
        assert!(view.paint(None, &mut ledger, 1.0, 1).unwrap().is_empty());
        assert_eq!(view.page().scene_epoch(), epoch);
        assert!(view.surface().unwrap().dirty_bounds().is_empty());

        // a reload of the same content is a new scene with nothing to redraw
        view.load_display_list(square(10.0));
        assert!(view.paint(None, &mut ledger, 1.0, 2).unwrap().is_empty());
        assert_eq!(view.page().scene_epoch(), epoch + 1);

        view.set_needs_paint(true);
        assert_eq!(view.paint(None, &mut ledger, 1.0, 3).unwrap(), IntRect::from_size(40, 40));
    }
}
