use std::fmt;

/// Resource class managed through the GPU driver boundary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    RenderBuffer,
    Geometry,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Texture => write!(f, "texture"),
            ResourceKind::RenderBuffer => write!(f, "render buffer"),
            ResourceKind::Geometry => write!(f, "geometry"),
        }
    }
}

/// Errors reported by a [`GpuDriver`](crate::render::backend::GpuDriver) implementation.
///
/// Drivers never panic across the boundary; every failure is returned as one of these.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
    #[error("{kind} {id} could not be allocated")]
    AllocationFailed { kind: ResourceKind, id: u32 },

    #[error("unknown {kind} {id}")]
    UnknownResource { kind: ResourceKind, id: u32 },

    #[error("{kind} {id} already exists")]
    DuplicateResource { kind: ResourceKind, id: u32 },

    #[error("{0} id space exhausted")]
    IdsExhausted(ResourceKind),

    #[error("malformed buffer: {0}")]
    MalformedBuffer(String),

    #[error("synchronization protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Misuse of the [`Surface`](crate::render::surface::Surface) lock state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("surface pixels are locked")]
    Locked,

    #[error("surface pixels are not locked")]
    NotLocked,

    #[error("surface of {width}x{height} exceeds the addressable size")]
    TooLarge { width: u32, height: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum BitmapError {
    #[error("pixel buffer too small: expected {expected} bytes, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("row bytes {row_bytes} smaller than a row of {width} pixels")]
    RowBytesTooSmall { row_bytes: u32, width: u32 },

    #[error("cannot encode an empty bitmap")]
    Empty,

    #[error(transparent)]
    Png(#[from] png::EncodingError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure while painting a single view. Only that view's frame is lost; the
/// view keeps `needs_paint` set and is retried on the next frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error("clip stack of depth {depth} exceeds the maximum of {max}")]
    ClipStackOverflow { depth: usize, max: usize },

    #[error("command references {kind} {id} which is not alive")]
    StaleResource { kind: ResourceKind, id: u32 },

    #[error("script context is locked by another thread")]
    ScriptLocked,

    #[error("view uses the GPU path but no GPU driver is installed")]
    MissingDriver,
}
