//! Resource Cache
//!
//! Resolves `(display, layer-or-target, slot)` plus an optional incoming handle into
//! the native buffer the hardware should use. Clients only send a handle when a
//! slot's buffer changes; otherwise the cached one is reused.
//!
//! Every resolution hands back a [`ResolvedBuffer`] that owns a [`BufferReleaser`].
//! Buffers displaced from the cache are parked in the releaser and let go when it
//! drops, after the hardware call that consumed the resolution has returned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use composer_ipc::{DisplayId, LayerId, NativeHandle};
use thiserror::Error;
use tracing::{debug, trace};

use crate::hal::HwcError;

/// Output buffers of virtual displays are never multi-buffered by clients
pub const OUTPUT_BUFFER_SLOTS: usize = 1;

/// Resolved native buffer or stream, shared between cache and hardware
#[derive(Debug, Clone)]
pub struct BufferHandle(Arc<NativeHandle>);

impl BufferHandle {
    pub fn new(native: NativeHandle) -> Self {
        Self(Arc::new(native))
    }

    pub fn native(&self) -> &NativeHandle {
        &self.0
    }

    /// True when both handles refer to the same cached import
    pub fn same_buffer(&self, other: &BufferHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Which cache namespace a resolution targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferScope {
    ClientTarget { display: DisplayId, slot: i32 },
    OutputBuffer { display: DisplayId, slot: i32 },
    LayerBuffer { display: DisplayId, layer: LayerId, slot: i32 },
    SidebandStream { display: DisplayId, layer: LayerId },
}

impl BufferScope {
    fn is_buffer(&self) -> bool {
        !matches!(self, BufferScope::SidebandStream { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("display {0} is not registered")]
    NoDisplay(DisplayId),
    #[error("display {0} is already registered")]
    DisplayExists(DisplayId),
    #[error("layer {layer} is not registered on display {display}")]
    NoLayer { display: DisplayId, layer: LayerId },
    #[error("layer {layer} is already registered on display {display}")]
    LayerExists { display: DisplayId, layer: LayerId },
    #[error("display {0} has no output buffer")]
    NotVirtual(DisplayId),
    #[error("slot {slot} out of range (slot count {count})")]
    SlotOutOfRange { slot: i32, count: usize },
    #[error("slot {0} has no cached buffer")]
    EmptySlot(i32),
    #[error("native handle is empty")]
    InvalidHandle,
}

impl From<ResourceError> for HwcError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::NoDisplay(_) => HwcError::BadDisplay,
            ResourceError::NoLayer { .. } => HwcError::BadLayer,
            ResourceError::NotVirtual(_) => HwcError::Unsupported,
            ResourceError::DisplayExists(_)
            | ResourceError::LayerExists { .. }
            | ResourceError::SlotOutOfRange { .. }
            | ResourceError::EmptySlot(_)
            | ResourceError::InvalidHandle => HwcError::BadParameter,
        }
    }
}

/// Scoped owner of buffers displaced during one resolution
#[derive(Debug)]
pub struct BufferReleaser {
    is_buffer: bool,
    pending: Vec<BufferHandle>,
    released: Arc<AtomicU64>,
}

impl BufferReleaser {
    fn new(is_buffer: bool, released: Arc<AtomicU64>) -> Self {
        Self {
            is_buffer,
            pending: Vec::new(),
            released,
        }
    }

    fn defer(&mut self, handle: BufferHandle) {
        self.pending.push(handle);
    }
}

impl Drop for BufferReleaser {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let count = self.pending.len() as u64;
        trace!(
            "Releasing {} displaced {}",
            count,
            if self.is_buffer { "buffer(s)" } else { "stream(s)" }
        );
        self.pending.clear();
        self.released.fetch_add(count, Ordering::Relaxed);
    }
}

/// A resolved handle plus the releaser that must outlive its use
#[derive(Debug)]
pub struct ResolvedBuffer {
    pub handle: BufferHandle,
    _releaser: BufferReleaser,
}

/// Buffer cache and per-display validation bookkeeping
pub trait ComposerResources {
    fn add_display(&mut self, display: DisplayId, client_target_slots: u32, is_virtual: bool) -> Result<(), ResourceError>;
    fn remove_display(&mut self, display: DisplayId) -> Result<(), ResourceError>;
    fn add_layer(&mut self, display: DisplayId, layer: LayerId, buffer_slots: u32) -> Result<(), ResourceError>;
    fn remove_layer(&mut self, display: DisplayId, layer: LayerId) -> Result<(), ResourceError>;

    /// Resolve `scope`. `None` reuses the cached handle, `Some` replaces it.
    /// Sideband streams always carry a handle.
    fn resolve(&mut self, scope: BufferScope, handle: Option<&NativeHandle>) -> Result<ResolvedBuffer, ResourceError>;

    fn must_validate_display(&self, display: DisplayId) -> bool;
    fn set_display_must_validate_state(&mut self, display: DisplayId, must_validate: bool);
}

#[derive(Debug, Default)]
struct LayerResources {
    buffers: Vec<Option<BufferHandle>>,
    sideband: Option<BufferHandle>,
}

impl LayerResources {
    fn cached(&self) -> impl Iterator<Item = &BufferHandle> {
        self.buffers.iter().flatten().chain(self.sideband.iter())
    }
}

#[derive(Debug)]
struct DisplayResources {
    must_validate: bool,
    client_targets: Vec<Option<BufferHandle>>,
    output_buffers: Option<Vec<Option<BufferHandle>>>,
    layers: HashMap<LayerId, LayerResources>,
}

/// In-memory [`ComposerResources`]
#[derive(Debug, Default)]
pub struct ResourceCache {
    displays: HashMap<DisplayId, DisplayResources>,
    released: Arc<AtomicU64>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers and streams let go so far
    pub fn released_count(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    fn releaser(&self, is_buffer: bool) -> BufferReleaser {
        BufferReleaser::new(is_buffer, self.released.clone())
    }

    fn display_mut(&mut self, display: DisplayId) -> Result<&mut DisplayResources, ResourceError> {
        self.displays
            .get_mut(&display)
            .ok_or(ResourceError::NoDisplay(display))
    }

    fn layer_mut(&mut self, display: DisplayId, layer: LayerId) -> Result<&mut LayerResources, ResourceError> {
        self.display_mut(display)?
            .layers
            .get_mut(&layer)
            .ok_or(ResourceError::NoLayer { display, layer })
    }
}

fn check_handle(native: &NativeHandle) -> Result<(), ResourceError> {
    if native.fds.is_empty() && native.ints.is_empty() {
        return Err(ResourceError::InvalidHandle);
    }
    Ok(())
}

fn resolve_slot(
    slots: &mut [Option<BufferHandle>],
    slot: i32,
    handle: Option<&NativeHandle>,
    releaser: &mut BufferReleaser,
) -> Result<BufferHandle, ResourceError> {
    let count = slots.len();
    let entry = usize::try_from(slot)
        .ok()
        .and_then(|index| slots.get_mut(index))
        .ok_or(ResourceError::SlotOutOfRange { slot, count })?;

    match handle {
        None => entry.clone().ok_or(ResourceError::EmptySlot(slot)),
        Some(native) => {
            check_handle(native)?;
            let imported = BufferHandle::new(native.clone());
            if let Some(previous) = entry.replace(imported.clone()) {
                releaser.defer(previous);
            }
            Ok(imported)
        }
    }
}

impl ComposerResources for ResourceCache {
    fn add_display(&mut self, display_id: DisplayId, client_target_slots: u32, is_virtual: bool) -> Result<(), ResourceError> {
        if self.displays.contains_key(&display_id) {
            return Err(ResourceError::DisplayExists(display_id));
        }
        debug!(
            "Registering display {} ({} client target slots, virtual={})",
            display_id, client_target_slots, is_virtual
        );
        self.displays.insert(
            display_id,
            DisplayResources {
                must_validate: true,
                client_targets: vec![None; client_target_slots as usize],
                output_buffers: is_virtual.then(|| vec![None; OUTPUT_BUFFER_SLOTS]),
                layers: HashMap::new(),
            },
        );
        Ok(())
    }

    fn remove_display(&mut self, display_id: DisplayId) -> Result<(), ResourceError> {
        let removed = self
            .displays
            .remove(&display_id)
            .ok_or(ResourceError::NoDisplay(display_id))?;

        let mut releaser = self.releaser(true);
        let targets = removed
            .client_targets
            .into_iter()
            .chain(removed.output_buffers.into_iter().flatten())
            .flatten();
        for handle in targets {
            releaser.defer(handle);
        }
        for layer in removed.layers.values() {
            for handle in layer.cached() {
                releaser.defer(handle.clone());
            }
        }
        debug!("Removed display {}", display_id);
        Ok(())
    }

    fn add_layer(&mut self, display: DisplayId, layer: LayerId, buffer_slots: u32) -> Result<(), ResourceError> {
        let resources = self.display_mut(display)?;
        if resources.layers.contains_key(&layer) {
            return Err(ResourceError::LayerExists { display, layer });
        }
        resources.layers.insert(
            layer,
            LayerResources {
                buffers: vec![None; buffer_slots as usize],
                sideband: None,
            },
        );
        Ok(())
    }

    fn remove_layer(&mut self, display: DisplayId, layer: LayerId) -> Result<(), ResourceError> {
        let removed = self
            .display_mut(display)?
            .layers
            .remove(&layer)
            .ok_or(ResourceError::NoLayer { display, layer })?;

        let mut releaser = self.releaser(true);
        for handle in removed.cached() {
            releaser.defer(handle.clone());
        }
        Ok(())
    }

    fn resolve(&mut self, scope: BufferScope, handle: Option<&NativeHandle>) -> Result<ResolvedBuffer, ResourceError> {
        let mut releaser = self.releaser(scope.is_buffer());

        let resolved = match scope {
            BufferScope::ClientTarget { display, slot } => {
                let resources = self.display_mut(display)?;
                resolve_slot(&mut resources.client_targets, slot, handle, &mut releaser)?
            }
            BufferScope::OutputBuffer { display, slot } => {
                let slots = self
                    .display_mut(display)?
                    .output_buffers
                    .as_mut()
                    .ok_or(ResourceError::NotVirtual(display))?;
                resolve_slot(slots, slot, handle, &mut releaser)?
            }
            BufferScope::LayerBuffer { display, layer, slot } => {
                let resources = self.layer_mut(display, layer)?;
                resolve_slot(&mut resources.buffers, slot, handle, &mut releaser)?
            }
            BufferScope::SidebandStream { display, layer } => {
                let native = handle.ok_or(ResourceError::InvalidHandle)?;
                check_handle(native)?;
                let resources = self.layer_mut(display, layer)?;
                let stream = BufferHandle::new(native.clone());
                if let Some(previous) = resources.sideband.replace(stream.clone()) {
                    releaser.defer(previous);
                }
                stream
            }
        };

        Ok(ResolvedBuffer {
            handle: resolved,
            _releaser: releaser,
        })
    }

    fn must_validate_display(&self, display: DisplayId) -> bool {
        self.displays
            .get(&display)
            .map(|resources| resources.must_validate)
            .unwrap_or(true)
    }

    fn set_display_must_validate_state(&mut self, display: DisplayId, must_validate: bool) {
        if let Some(resources) = self.displays.get_mut(&display) {
            resources.must_validate = must_validate;
        }
    }
}
