//! Arena of scheduled sources.
//!
//! Slots are reused through a free list. Each slot carries a generation that is
//! bumped on free, so a [`MixHandle`] taken before a slot was recycled no
//! longer resolves.

use crate::context::ContextId;
use crate::error::Result;
use crate::source::SourceId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MixHandle {
    index: usize,
    generation: u32,
}

/// A source scheduled for mixing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixNode {
    pub context: ContextId,
    pub source: SourceId,
    /// Render this node on the next pass.
    pub play_me: bool,
    /// Tear this node down at the end of the current pass.
    pub destroy_me: bool,
}

impl MixNode {
    pub fn new(context: ContextId, source: SourceId) -> Self {
        Self {
            context,
            source,
            play_me: true,
            destroy_me: false,
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<MixNode>,
}

#[derive(Debug, Default)]
pub struct MixPool {
    slots: Vec<Slot>,
    free: Vec<usize>,
    by_source: HashMap<(ContextId, SourceId), MixHandle>,
}

impl MixPool {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut pool = Self::default();
        pool.slots.try_reserve(capacity)?;
        pool.free.try_reserve(capacity)?;
        pool.by_source.try_reserve(capacity)?;
        Ok(pool)
    }

    /// Place `node` in a free slot, growing the arena if none is free.
    pub fn alloc(&mut self, node: MixNode) -> Result<MixHandle> {
        let key = (node.context, node.source);
        self.by_source.try_reserve(1)?;

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.node = Some(node);
                MixHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.try_reserve(1)?;
                self.free.try_reserve(1)?;
                let index = self.slots.len();
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                MixHandle {
                    index,
                    generation: 0,
                }
            }
        };
        self.by_source.insert(key, handle);
        Ok(handle)
    }

    pub fn get(&self, handle: MixHandle) -> Option<&MixNode> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, handle: MixHandle) -> Option<&mut MixNode> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Free the slot behind `handle`, returning its node.
    pub fn dealloc(&mut self, handle: MixHandle) -> Option<MixNode> {
        let slot = self
            .slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.by_source.remove(&(node.context, node.source));
        Some(node)
    }

    /// Handle of the node scheduling `source` in `context`, if any.
    pub fn find(&self, context: ContextId, source: SourceId) -> Option<MixHandle> {
        self.by_source.get(&(context, source)).copied()
    }

    /// Append every live handle to `out` in slot order.
    pub fn collect_handles(&self, out: &mut Vec<MixHandle>) {
        out.extend(self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.node.as_ref().map(|_| MixHandle {
                index,
                generation: slot.generation,
            })
        }));
    }

    /// Live nodes.
    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    /// Total slots, live or free.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
