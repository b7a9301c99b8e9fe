use std::fmt;
use std::path::{Path, PathBuf};

/// Storage identity shared by views.
///
/// A session only names where cookies, local storage and caches would live.
/// Persistent sessions get a directory below `<cache_path>/sessions/`;
/// in-memory ones have no disk path. Views share sessions through `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: u64,
    name: String,
    persistent: bool,
    disk_path: Option<PathBuf>,
}

impl Session {
    pub(crate) fn new(id: u64, name: &str, persistent: bool, cache_path: Option<&Path>) -> Self {
        let disk_path = match (persistent, cache_path) {
            (true, Some(cache)) => Some(cache.join("sessions").join(sanitize(name))),
            _ => None,
        };
        Self { id, name: name.to_string(), persistent, disk_path }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Directory for on-disk data, `None` for in-memory sessions or when no
    /// cache path is configured.
    pub fn disk_path(&self) -> Option<&Path> {
        self.disk_path.as_deref()
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// Maps a session name onto a single safe path component.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        "session".to_string()
    } else {
        cleaned
    }
}
