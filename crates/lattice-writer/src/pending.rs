//! Pending collection and dictionary adds.
//!
//! A container add cannot always run when its item arrives: the item (or
//! its dictionary key) may still be a parked fixup. Once one add for a
//! container is queued, every later add for that container queues too,
//! otherwise resolved items would jump ahead of unresolved ones and the
//! insertion order of the markup would be lost. Entries are patched in
//! place by temporary index as their fixups resolve, then drained front to
//! back when the container's last dependency clears.

use lattice_common::{Span, TypeId};
use lattice_runtime::{ObjId, Value};
use lattice_schema::ConverterId;
use rustc_hash::FxHashMap;

use crate::fixup::Slot;

/// One queued container add.
#[derive(Debug, Clone)]
pub struct PendingAdd {
    pub item: Slot,
    /// Dictionary key, if the container is a dictionary.
    pub key: Option<Slot>,
    /// The key value's own source span, for drain-time key diagnostics.
    pub key_span: Option<Span>,
    /// The container's declared item type, for drain-time text conversion.
    pub item_ty: Option<TypeId>,
    pub span: Span,
}

/// The queued adds of one container, in arrival order.
#[derive(Debug, Default)]
pub struct ContainerQueue {
    pub adds: Vec<PendingAdd>,
    /// Converter of the declared key type, cached for drain-time key
    /// conversion of raw text keys.
    pub key_converter: Option<ConverterId>,
}

/// Queued adds for every container that currently has any.
#[derive(Default)]
pub struct PendingAddQueue {
    containers: FxHashMap<ObjId, ContainerQueue>,
}

impl PendingAddQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this container already has queued adds. Once true, every
    /// further add for it must queue as well.
    pub fn is_pending(&self, container: ObjId) -> bool {
        self.containers.contains_key(&container)
    }

    /// Queue an add and return its temporary index for fixup targets.
    pub fn push(
        &mut self,
        container: ObjId,
        add: PendingAdd,
        key_converter: Option<ConverterId>,
    ) -> usize {
        let queue = self.containers.entry(container).or_default();
        queue.key_converter = key_converter;
        queue.adds.push(add);
        queue.adds.len() - 1
    }

    /// Patch a queued add's item with its resolved value.
    pub fn patch_item(&mut self, container: ObjId, index: usize, value: Value) {
        if let Some(queue) = self.containers.get_mut(&container) {
            queue.adds[index].item = Slot::Value(value);
        }
    }

    /// Patch a queued add's key with its resolved value.
    pub fn patch_key(&mut self, container: ObjId, index: usize, value: Value) {
        if let Some(queue) = self.containers.get_mut(&container) {
            queue.adds[index].key = Some(Slot::Value(value));
        }
    }

    /// Take the whole queue of a container for draining.
    pub fn take(&mut self, container: ObjId) -> Option<ContainerQueue> {
        self.containers.remove(&container)
    }
}
