use crate::engine::config::ConfigError;
use crate::render::errors::{BitmapError, RenderError, SurfaceError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid view ID")]
    InvalidViewId,

    #[error("View limit exceeded")]
    ViewLimitExceeded,

    #[error("View is owned by its parent and cannot be destroyed directly")]
    NotOwned,

    #[error("GPU rendering is enabled but no GPU driver is installed")]
    GpuDriverMissing,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Renderer error: {0}")]
    Render(#[from] RenderError),

    #[error("Bitmap error: {0}")]
    Bitmap(#[from] BitmapError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
