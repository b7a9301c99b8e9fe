//! Host capabilities handed to the renderer.
//!
//! There is no global platform singleton: the host builds a [`Platform`] and
//! passes it into [`Renderer::new`](crate::engine::Renderer::new). Logging goes
//! through the `log` facade, so the host's logger is whatever it installed.

use crate::engine::config::Config;
use crate::render::backend::GpuDriver;
use crate::render::surface::{BitmapSurfaceFactory, SurfaceFactory};

pub struct Platform {
    pub config: Config,
    pub gpu_driver: Option<Box<dyn GpuDriver>>,
    pub surface_factory: Box<dyn SurfaceFactory>,
}

impl Default for Platform {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Platform {
    /// Platform with no GPU driver and heap-backed surfaces.
    pub fn new(config: Config) -> Self {
        Self { config, gpu_driver: None, surface_factory: Box::new(BitmapSurfaceFactory) }
    }

    pub fn with_gpu_driver(mut self, driver: impl GpuDriver) -> Self {
        self.gpu_driver = Some(Box::new(driver));
        self
    }

    pub fn with_surface_factory(mut self, factory: impl SurfaceFactory + 'static) -> Self {
        self.surface_factory = Box::new(factory);
        self
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("config", &self.config)
            .field("gpu_driver", &self.gpu_driver.as_ref().map(|d| d.name().to_string()))
            .finish_non_exhaustive()
    }
}
