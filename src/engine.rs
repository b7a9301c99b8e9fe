//! Public engine API: the renderer, its views and their configuration.
//!
//! A host builds a [`Platform`] (config, optional GPU driver, surface factory),
//! hands it to [`Renderer::new`], creates views and then calls
//! [`Renderer::update`] and [`Renderer::render`] once per frame.
//!
//! ```rust
//! use lumen_engine::{Color, Config, DisplayList, Platform, Renderer};
//!
//! # fn main() -> Result<(), lumen_engine::EngineError> {
//! let mut renderer = Renderer::new(Platform::new(Config::default()))?;
//! let id = renderer.create_view(64, 64, false, None, false)?;
//! renderer.view_mut(id).unwrap().load_display_list(DisplayList::solid(64, 64, Color::BLACK));
//!
//! renderer.update();
//! let report = renderer.render();
//! assert_eq!(report.painted, vec![id]);
//! # Ok(()) }
//! ```

pub mod config;
pub mod errors;
pub mod platform;
pub mod renderer;
pub mod session;
pub mod tick;
pub mod view;

pub use config::{Config, ConfigBuilder, ConfigError};
pub use errors::EngineError;
pub use platform::Platform;
pub use renderer::{MemoryUsage, RenderReport, Renderer};
pub use session::Session;
pub use tick::{FrameClock, Tick};
pub use view::page::{ContentSource, HtmlContent, StaticContent};
pub use view::script_lock::{ScriptLock, ScriptLockGuard};
pub use view::{InvalidationFlags, View, ViewId};
