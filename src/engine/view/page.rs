use crate::engine::tick::Tick;
use crate::render::{Color, DisplayItem, DisplayList, Layer, LayerId, Viewport};
use url::Url;

/// Layer id reserved for the page background.
pub const BACKGROUND_LAYER: LayerId = LayerId(u64::MAX);

/// Producer of a view's display lists.
///
/// The page engine behind a view is opaque to the renderer: it is ticked once
/// per `Renderer::update` and asked to paint whenever it reported a change.
pub trait ContentSource {
    /// Advances animations and timers. Returns `true` when the content changed
    /// and must be painted again.
    fn tick(&mut self, _tick: &Tick) -> bool {
        false
    }

    /// Produces the display list for the given viewport.
    fn paint(&mut self, viewport: Viewport) -> DisplayList;
}

/// Content that never changes on its own.
#[derive(Debug, Clone, Default)]
pub struct StaticContent {
    list: DisplayList,
}

impl StaticContent {
    pub fn new(list: DisplayList) -> Self {
        Self { list }
    }
}

impl ContentSource for StaticContent {
    fn paint(&mut self, _viewport: Viewport) -> DisplayList {
        self.list.clone()
    }
}

/// Raw HTML handed to the page engine. Only the document's background is
/// painted here; layout happens inside the engine proper.
#[derive(Debug, Clone, Default)]
pub struct HtmlContent {
    html: String,
}

impl HtmlContent {
    pub fn new(html: &str) -> Self {
        Self { html: html.to_string() }
    }

    pub fn html(&self) -> &str {
        &self.html
    }
}

impl ContentSource for HtmlContent {
    fn paint(&mut self, _viewport: Viewport) -> DisplayList {
        DisplayList::new()
    }
}

/// The page state of one view.
///
/// Holds the current document, its URL and title, and the display list it
/// last produced. The list is only rebuilt when the content or the viewport
/// changed.
pub struct PageContext {
    /// URL of the current document, if it was loaded with one
    current_url: Option<Url>,
    title: String,
    /// True between a load and the first display list built from it
    loading: bool,
    transparent: bool,
    viewport: Viewport,
    source: Box<dyn ContentSource>,
    display_list: DisplayList,
    /// Display list must be rebuilt before the next paint
    render_dirty: bool,
    /// Bumped every time the display list is rebuilt
    scene_epoch: u64,
    user_agent: String,
}

impl PageContext {
    pub(crate) fn new(viewport: Viewport, transparent: bool) -> Self {
        Self {
            current_url: None,
            title: String::new(),
            loading: false,
            transparent,
            viewport,
            source: Box::new(StaticContent::default()),
            display_list: DisplayList::new(),
            render_dirty: true,
            scene_epoch: 0,
            user_agent: String::new(),
        }
    }

    /// Loads an HTML document. `url` is the document's address, if any.
    pub fn load_html(&mut self, html: &str, url: Option<&str>) -> Result<(), url::ParseError> {
        let url = url.map(Url::parse).transpose()?;
        self.title = extract_title(html).unwrap_or_default();
        self.begin_load(url, Box::new(HtmlContent::new(html)));
        Ok(())
    }

    pub fn load_display_list(&mut self, list: DisplayList) {
        self.title.clear();
        self.begin_load(None, Box::new(StaticContent::new(list)));
    }

    pub fn load_content(&mut self, source: Box<dyn ContentSource>) {
        self.title.clear();
        self.begin_load(None, source);
    }

    fn begin_load(&mut self, url: Option<Url>, source: Box<dyn ContentSource>) {
        self.current_url = url;
        self.source = source;
        self.loading = true;
        self.invalidate_render();
    }

    /// Returns `true` when the viewport actually changed.
    pub fn set_viewport(&mut self, viewport: Viewport) -> bool {
        if self.viewport == viewport {
            return false;
        }
        self.viewport = viewport;
        self.invalidate_render();
        true
    }

    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn invalidate_render(&mut self) {
        self.render_dirty = true;
    }

    pub fn needs_rebuild(&self) -> bool {
        self.render_dirty
    }

    /// Ticks the content. Returns `true` when it changed.
    pub fn tick(&mut self, tick: &Tick) -> bool {
        let changed = self.source.tick(tick);
        if changed {
            self.invalidate_render();
        }
        changed
    }

    /// Rebuilds the display list if anything changed. Returns `true` when it did.
    pub fn rebuild_display_list_if_needed(&mut self) -> bool {
        if !self.render_dirty {
            return false;
        }

        let mut list = self.source.paint(self.viewport);
        if !self.transparent {
            let mut background = Layer::new(BACKGROUND_LAYER, self.viewport.bounds());
            background.push(DisplayItem::Clear { color: Color::WHITE });
            list.layers.insert(0, background);
        }

        self.display_list = list;
        self.render_dirty = false;
        self.loading = false;
        self.scene_epoch = self.scene_epoch.wrapping_add(1);
        true
    }

    #[inline]
    pub fn display_list(&self) -> &DisplayList {
        &self.display_list
    }

    #[inline]
    pub fn scene_epoch(&self) -> u64 {
        self.scene_epoch
    }

    pub fn current_url(&self) -> Option<&Url> {
        self.current_url.as_ref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    /// User agent the page identifies itself with.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub(crate) fn set_user_agent(&mut self, user_agent: &str) {
        self.user_agent = user_agent.to_string();
    }
}

impl std::fmt::Debug for PageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageContext")
            .field("current_url", &self.current_url.as_ref().map(Url::as_str))
            .field("title", &self.title)
            .field("loading", &self.loading)
            .field("viewport", &self.viewport)
            .field("scene_epoch", &self.scene_epoch)
            .finish_non_exhaustive()
    }
}

/// Text of the first `<title>` element, whitespace collapsed.
fn extract_title(html: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with `html`
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    let title = html[start..end].split_whitespace().collect::<Vec<_>>().join(" ");
    Some(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::IntRect;

    struct Blinker {
        on: bool,
    }

    impl ContentSource for Blinker {
        fn tick(&mut self, tick: &Tick) -> bool {
            self.on = tick.frame % 2 == 0;
            true
        }

        fn paint(&mut self, viewport: Viewport) -> DisplayList {
            let color = if self.on { Color::BLACK } else { Color::WHITE };
            DisplayList::solid(viewport.width, viewport.height, color)
        }
    }

    #[test]
    fn title_is_extracted() {
        assert_eq!(
            extract_title("<html><head><TITLE lang=en>\n  Hello\n  world </TITLE></head></html>").as_deref(),
            Some("Hello world")
        );
        assert_eq!(extract_title("<p>no title</p>"), None);
        assert_eq!(extract_title("<title>unterminated"), None);
    }

    #[test]
    fn load_html_sets_url_and_loading() {
        let mut page = PageContext::new(Viewport::new(10, 10), false);
        page.load_html("<title>Doc</title>", Some("https://example.com/a")).unwrap();
        assert_eq!(page.title(), "Doc");
        assert_eq!(page.current_url().map(Url::as_str), Some("https://example.com/a"));
        assert!(page.is_loading());

        assert!(page.rebuild_display_list_if_needed());
        assert!(!page.is_loading());
        assert!(!page.rebuild_display_list_if_needed());
        assert_eq!(page.scene_epoch(), 1);

        assert!(page.load_html("", Some("not a url")).is_err());
    }

    #[test]
    fn opaque_pages_get_a_white_background() {
        let mut page = PageContext::new(Viewport::new(20, 10), false);
        page.load_display_list(DisplayList::solid(5, 5, Color::BLACK));
        page.rebuild_display_list_if_needed();
        let layers = &page.display_list().layers;
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].id, BACKGROUND_LAYER);
        assert_eq!(layers[0].bounds, IntRect::from_size(20, 10));

        let mut clear = PageContext::new(Viewport::new(20, 10), true);
        clear.load_display_list(DisplayList::solid(5, 5, Color::BLACK));
        clear.rebuild_display_list_if_needed();
        assert_eq!(clear.display_list().layers.len(), 1);
    }

    #[test]
    fn ticking_content_invalidates() {
        let mut page = PageContext::new(Viewport::new(4, 4), true);
        page.load_content(Box::new(Blinker { on: false }));
        page.rebuild_display_list_if_needed();
        assert!(!page.needs_rebuild());

        let tick = Tick { now: 0.0, delta: 0.0, frame: 0 };
        assert!(page.tick(&tick));
        assert!(page.needs_rebuild());
        page.rebuild_display_list_if_needed();
        assert_eq!(page.display_list(), &DisplayList::solid(4, 4, Color::BLACK));
    }

    #[test]
    fn viewport_change_rebuilds_once() {
        let mut page = PageContext::new(Viewport::new(4, 4), false);
        page.rebuild_display_list_if_needed();
        assert!(!page.set_viewport(Viewport::new(4, 4)));
        assert!(page.set_viewport(Viewport::new(8, 4)));
        assert!(page.rebuild_display_list_if_needed());
        assert_eq!(page.display_list().layers[0].bounds, IntRect::from_size(8, 4));
    }
}
