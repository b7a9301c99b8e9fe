//! Renderer configuration.
//!
//! [`Config`] controls how the [`Renderer`](crate::engine::Renderer) paints its
//! views: GPU or CPU path, device scale, repaint and recycling timers, and a
//! few identity and path settings handed to page content.
//!
//! Defaults come from [`Default`]; [`Config::builder()`] customizes and
//! validates. Configs can also be loaded from JSON.
//!
//! ```rust
//! use lumen_engine::engine::config::Config;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = Config::builder()
//!     .use_gpu_renderer(false)
//!     .device_scale(1.3)
//!     .max_views(4)
//!     .build()?;
//! assert_eq!(cfg.device_scale, 1.25);
//! # Ok(()) }
//! ```

use crate::render::backend::FaceWinding;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/605.1.15 (KHTML, like Gecko) Lumen/0.1";

/// Device scale is kept on a 1/8 grid so text and pixel snapping stay stable.
const DEVICE_SCALE_STEP: f64 = 0.125;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Paint views through the installed GPU driver instead of CPU surfaces.
    pub use_gpu_renderer: bool,
    /// Ratio of device pixels to CSS pixels, rounded to the nearest 1/8.
    pub device_scale: f64,
    /// Winding of front-facing triangles, for drivers that cull.
    pub face_winding: FaceWinding,
    /// Repaint every view on every frame, even when nothing changed.
    pub force_repaint: bool,
    /// Seconds between animation ticks delivered to page content.
    pub animation_timer_delay: f64,
    /// Seconds between runs of the memory recycler.
    pub recycle_delay: f64,
    /// Directory for persistent session data. `None` disables persistence on disk.
    pub cache_path: Option<PathBuf>,
    /// Reported by every view's page.
    pub user_agent: String,
    /// Maximum number of live views, inspectors included.
    pub max_views: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_gpu_renderer: false,
            device_scale: 1.0,
            face_winding: FaceWinding::default(),
            force_repaint: false,
            animation_timer_delay: 1.0 / 60.0,
            recycle_delay: 4.0,
            cache_path: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_views: 64,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Parses and validates a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Config, ConfigError> {
        let cfg: Config = serde_json::from_str(json)?;
        ConfigBuilder { inner: cfg }.build()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn round_device_scale(scale: f64) -> f64 {
    (scale / DEVICE_SCALE_STEP).round() * DEVICE_SCALE_STEP
}

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    inner: Config,
}

impl ConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn use_gpu_renderer(self, on: bool) -> Self { self.map(|c| c.use_gpu_renderer = on) }
    pub fn device_scale(self, scale: f64) -> Self { self.map(|c| c.device_scale = scale) }
    pub fn face_winding(self, winding: FaceWinding) -> Self { self.map(|c| c.face_winding = winding) }
    pub fn force_repaint(self, on: bool) -> Self { self.map(|c| c.force_repaint = on) }
    pub fn animation_timer_delay(self, secs: f64) -> Self { self.map(|c| c.animation_timer_delay = secs) }
    pub fn recycle_delay(self, secs: f64) -> Self { self.map(|c| c.recycle_delay = secs) }
    pub fn cache_path<P: Into<PathBuf>>(self, path: P) -> Self { self.map(|c| c.cache_path = Some(path.into())) }
    pub fn user_agent<S: Into<String>>(self, ua: S) -> Self { self.map(|c| c.user_agent = ua.into()) }
    pub fn max_views(self, n: usize) -> Self { self.map(|c| c.max_views = n) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut Config)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(mut self) -> Result<Config, ConfigError> {
        let c = &mut self.inner;

        if !c.device_scale.is_finite() || c.device_scale <= 0.0 {
            return Err(ConfigError::InvalidDeviceScale(c.device_scale));
        }
        c.device_scale = round_device_scale(c.device_scale);
        if c.device_scale < DEVICE_SCALE_STEP {
            return Err(ConfigError::InvalidDeviceScale(c.device_scale));
        }
        if !c.animation_timer_delay.is_finite() || c.animation_timer_delay <= 0.0 {
            return Err(ConfigError::InvalidDelay { field: "animation_timer_delay", value: c.animation_timer_delay });
        }
        if !c.recycle_delay.is_finite() || c.recycle_delay <= 0.0 {
            return Err(ConfigError::InvalidDelay { field: "recycle_delay", value: c.recycle_delay });
        }
        if c.max_views == 0 {
            return Err(ConfigError::InvalidMaxViews);
        }
        if c.user_agent.trim().is_empty() {
            return Err(ConfigError::EmptyUserAgent);
        }

        Ok(self.inner)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("device_scale must be a positive number, got {0}")]
    InvalidDeviceScale(f64),
    #[error("{field} must be a positive number of seconds, got {value}")]
    InvalidDelay { field: &'static str, value: f64 },
    #[error("max_views must be at least 1")]
    InvalidMaxViews,
    #[error("user_agent must not be empty")]
    EmptyUserAgent,
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} renderer, scale {}, max {} views",
            if self.use_gpu_renderer { "gpu" } else { "cpu" },
            self.device_scale,
            self.max_views
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::builder().build().unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.recycle_delay, 4.0);
        assert!(!cfg.use_gpu_renderer);
    }

    #[test]
    fn device_scale_snaps_to_eighths() {
        assert_eq!(Config::builder().device_scale(1.3).build().unwrap().device_scale, 1.25);
        assert_eq!(Config::builder().device_scale(2.06).build().unwrap().device_scale, 2.0);
        assert!(matches!(
            Config::builder().device_scale(0.01).build(),
            Err(ConfigError::InvalidDeviceScale(_))
        ));
        assert!(Config::builder().device_scale(f64::NAN).build().is_err());
    }

    #[test]
    fn rejects_bad_limits() {
        assert!(matches!(Config::builder().max_views(0).build(), Err(ConfigError::InvalidMaxViews)));
        assert!(matches!(
            Config::builder().recycle_delay(0.0).build(),
            Err(ConfigError::InvalidDelay { field: "recycle_delay", .. })
        ));
        assert!(matches!(Config::builder().user_agent("  ").build(), Err(ConfigError::EmptyUserAgent)));
    }

    #[test]
    fn loads_partial_json() {
        let cfg = Config::from_json_str(r#"{ "use_gpu_renderer": true, "face_winding": "clockwise" }"#).unwrap();
        assert!(cfg.use_gpu_renderer);
        assert_eq!(cfg.face_winding, FaceWinding::Clockwise);
        assert_eq!(cfg.max_views, Config::default().max_views);

        assert!(matches!(Config::from_json_str("{"), Err(ConfigError::Json(_))));
        assert!(Config::from_json_str(r#"{ "max_views": 0 }"#).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = Config::builder().device_scale(2.0).build().unwrap().to_json_string().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let cfg = Config::from_file(file.path()).unwrap();
        assert_eq!(cfg.device_scale, 2.0);
    }
}
