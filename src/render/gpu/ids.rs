//! Resource identifiers shared between the core and a GPU driver.
//!
//! The core asks the driver for ids (`next_texture_id` and friends), creates the
//! resource under that id and later refers to it from commands. Ids are never
//! zero: on the wire `0` means "no resource", which Rust models as `Option<Id>`.

use crate::render::errors::{DriverError, RenderError, ResourceKind};
use crate::render::gpu::command::Command;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::num::NonZeroU32;

/// Common behaviour of the three resource id classes.
pub trait ResourceId: Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display {
    const KIND: ResourceKind;

    /// Builds an id from its wire value. `0` yields `None`.
    fn from_raw(raw: u32) -> Option<Self>;

    /// The wire value, never `0`.
    fn raw(self) -> u32;
}

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(NonZeroU32);

        impl $name {
            pub fn new(raw: u32) -> Option<Self> {
                NonZeroU32::new(raw).map(Self)
            }

            pub fn get(self) -> u32 {
                self.0.get()
            }

            /// Wire encoding of an optional id.
            pub fn to_wire(id: Option<Self>) -> u32 {
                id.map_or(0, |id| id.get())
            }
        }

        impl ResourceId for $name {
            const KIND: ResourceKind = $kind;

            fn from_raw(raw: u32) -> Option<Self> {
                Self::new(raw)
            }

            fn raw(self) -> u32 {
                self.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

resource_id!(
    /// Identifies a texture: an uploaded image or a render-to-texture target.
    TextureId,
    ResourceKind::Texture
);

resource_id!(
    /// Identifies a render buffer: a texture bound as a drawing target.
    RenderBufferId,
    ResourceKind::RenderBuffer
);

resource_id!(
    /// Identifies a vertex/index buffer pair.
    GeometryId,
    ResourceKind::Geometry
);

/// Monotonic id source for one resource class.
///
/// Starts at 1 and counts up. A released id is only handed out again when the
/// allocator was built with [`IdAllocator::with_recycling`]. Running past
/// `u32::MAX` is an allocation failure, the counter never wraps.
#[derive(Debug)]
pub struct IdAllocator<I: ResourceId> {
    next: u64,
    free: Option<BTreeSet<u32>>,
    _kind: PhantomData<I>,
}

impl<I: ResourceId> Default for IdAllocator<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ResourceId> IdAllocator<I> {
    pub fn new() -> Self {
        Self { next: 1, free: None, _kind: PhantomData }
    }

    /// Allocator that reuses released ids, lowest first.
    pub fn with_recycling() -> Self {
        Self { next: 1, free: Some(BTreeSet::new()), _kind: PhantomData }
    }

    /// Allocator whose first id is `first`. Mostly useful to test exhaustion.
    pub fn starting_at(first: u32) -> Self {
        Self { next: u64::from(first.max(1)), free: None, _kind: PhantomData }
    }

    pub fn next(&mut self) -> Option<I> {
        if let Some(raw) = self.free.as_mut().and_then(|f| f.pop_first()) {
            return I::from_raw(raw);
        }
        if self.next > u64::from(u32::MAX) {
            return None;
        }
        let raw = self.next as u32;
        self.next += 1;
        I::from_raw(raw)
    }

    /// Same as [`next`](Self::next) but reports exhaustion as a driver error.
    pub fn try_next(&mut self) -> Result<I, DriverError> {
        self.next().ok_or(DriverError::IdsExhausted(I::KIND))
    }

    /// Returns an id to the allocator. Ignored unless recycling is enabled.
    pub fn release(&mut self, id: I) {
        if let Some(free) = self.free.as_mut() {
            if u64::from(id.raw()) < self.next {
                free.insert(id.raw());
            }
        }
    }
}

/// Driver-side map from id to backend resource.
#[derive(Debug)]
pub struct ResourceTable<I: ResourceId, T> {
    entries: BTreeMap<I, T>,
}

impl<I: ResourceId, T> Default for ResourceTable<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ResourceId, T> ResourceTable<I, T> {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new() }
    }

    /// Stores a new resource. Creating the same id twice is an error.
    pub fn insert(&mut self, id: I, value: T) -> Result<(), DriverError> {
        if self.entries.contains_key(&id) {
            return Err(DriverError::DuplicateResource { kind: I::KIND, id: id.raw() });
        }
        self.entries.insert(id, value);
        Ok(())
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.entries.get_mut(&id)
    }

    /// Like [`get`](Self::get) but an unknown id is an error.
    pub fn lookup(&self, id: I) -> Result<&T, DriverError> {
        self.entries.get(&id).ok_or(DriverError::UnknownResource { kind: I::KIND, id: id.raw() })
    }

    pub fn lookup_mut(&mut self, id: I) -> Result<&mut T, DriverError> {
        self.entries.get_mut(&id).ok_or(DriverError::UnknownResource { kind: I::KIND, id: id.raw() })
    }

    pub fn remove(&mut self, id: I) -> Result<T, DriverError> {
        self.entries.remove(&id).ok_or(DriverError::UnknownResource { kind: I::KIND, id: id.raw() })
    }

    pub fn contains(&self, id: I) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = I> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> + '_ {
        self.entries.iter().map(|(id, v)| (*id, v))
    }
}

#[derive(Debug, Default, Clone)]
struct KindLedger {
    live: BTreeSet<u32>,
    created: u64,
    destroyed: u64,
}

/// Core-side bookkeeping of which ids are alive on the driver.
///
/// Every create and destroy the core sends goes through here first, so a bug
/// that would double-create, double-destroy or reference a dead resource is
/// caught before it reaches the driver.
#[derive(Debug, Default, Clone)]
pub struct ResourceLedger {
    textures: KindLedger,
    render_buffers: KindLedger,
    geometry: KindLedger,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn kind(&self, kind: ResourceKind) -> &KindLedger {
        match kind {
            ResourceKind::Texture => &self.textures,
            ResourceKind::RenderBuffer => &self.render_buffers,
            ResourceKind::Geometry => &self.geometry,
        }
    }

    fn kind_mut(&mut self, kind: ResourceKind) -> &mut KindLedger {
        match kind {
            ResourceKind::Texture => &mut self.textures,
            ResourceKind::RenderBuffer => &mut self.render_buffers,
            ResourceKind::Geometry => &mut self.geometry,
        }
    }

    /// Fails when `id` is already alive. Checked before the driver is asked to
    /// create it.
    pub fn check_unused<I: ResourceId>(&self, id: I) -> Result<(), DriverError> {
        if self.is_live(id) {
            return Err(DriverError::DuplicateResource { kind: I::KIND, id: id.raw() });
        }
        Ok(())
    }

    pub fn check_live<I: ResourceId>(&self, id: I) -> Result<(), DriverError> {
        if !self.is_live(id) {
            return Err(DriverError::UnknownResource { kind: I::KIND, id: id.raw() });
        }
        Ok(())
    }

    pub fn record_create<I: ResourceId>(&mut self, id: I) -> Result<(), DriverError> {
        let ledger = self.kind_mut(I::KIND);
        if !ledger.live.insert(id.raw()) {
            return Err(DriverError::DuplicateResource { kind: I::KIND, id: id.raw() });
        }
        ledger.created += 1;
        Ok(())
    }

    pub fn record_destroy<I: ResourceId>(&mut self, id: I) -> Result<(), DriverError> {
        let ledger = self.kind_mut(I::KIND);
        if !ledger.live.remove(&id.raw()) {
            return Err(DriverError::UnknownResource { kind: I::KIND, id: id.raw() });
        }
        ledger.destroyed += 1;
        Ok(())
    }

    pub fn is_live<I: ResourceId>(&self, id: I) -> bool {
        self.kind(I::KIND).live.contains(&id.raw())
    }

    pub fn live_count(&self, kind: ResourceKind) -> usize {
        self.kind(kind).live.len()
    }

    pub fn created(&self, kind: ResourceKind) -> u64 {
        self.kind(kind).created
    }

    pub fn destroyed(&self, kind: ResourceKind) -> u64 {
        self.kind(kind).destroyed
    }

    /// Total number of live resources across all classes.
    pub fn total_live(&self) -> usize {
        self.textures.live.len() + self.render_buffers.live.len() + self.geometry.live.len()
    }

    fn require<I: ResourceId>(&self, id: I) -> Result<(), RenderError> {
        if self.is_live(id) {
            Ok(())
        } else {
            Err(RenderError::StaleResource { kind: I::KIND, id: id.raw() })
        }
    }

    /// Verifies every id a command references is alive.
    pub fn check_command(&self, command: &Command) -> Result<(), RenderError> {
        let state = command.state();
        if let Some(rb) = state.render_buffer {
            self.require(rb)?;
        }
        for texture in state.textures.iter().flatten() {
            self.require(*texture)?;
        }
        if let Command::DrawGeometry { geometry, .. } = command {
            self.require(*geometry)?;
        }
        Ok(())
    }
}
