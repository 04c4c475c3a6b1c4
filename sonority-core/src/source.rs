//! Sources: a buffer queue, a play state and spatial attributes.
//!
//! The source's references in the [`BufferRegistry`] follow from its state:
//!
//! - `Initial`: every queued buffer is held as *queued*.
//! - `Playing` / `Paused`: entries before the read cursor hold nothing, the
//!   entry under the cursor is *current*, later entries are *queued*.
//! - `Stopped`: nothing is held.
//!
//! Every transition updates the registry by diffing the old and new holdings
//! entry by entry, adding before removing so a pending-delete buffer shared by
//! both sides is never freed in between.

use crate::buffer::{BufferId, BufferRegistry};
use crate::error::{Result, SonorityError};
use crate::queue::{BufferQueue, QueueSplice};
use glam::Vec3;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceState {
    #[default]
    Initial,
    Playing,
    Paused,
    Stopped,
}

impl SourceState {
    /// Playing or paused: the source holds a read position.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// Gain and spatial attributes of a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceAttributes {
    pub gain: f32,
    /// Lower bound on the attenuated gain.
    pub min_gain: f32,
    /// Upper bound on the attenuated gain.
    pub max_gain: f32,
    /// Stored and reported; playback rate is not altered.
    pub pitch: f32,
    pub position: Vec3,
    /// Position is relative to the listener rather than the world origin.
    pub relative: bool,
    pub reference_distance: f32,
    pub rolloff_factor: f32,
    pub max_distance: f32,
    pub looping: bool,
}

impl Default for SourceAttributes {
    fn default() -> Self {
        Self {
            gain: 1.0,
            min_gain: 0.0,
            max_gain: 1.0,
            pitch: 1.0,
            position: Vec3::ZERO,
            relative: false,
            reference_distance: 1.0,
            rolloff_factor: 1.0,
            max_distance: f32::MAX,
            looping: false,
        }
    }
}

impl SourceAttributes {
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("gain", self.gain),
            ("min_gain", self.min_gain),
            ("max_gain", self.max_gain),
            ("reference_distance", self.reference_distance),
            ("rolloff_factor", self.rolloff_factor),
            ("max_distance", self.max_distance),
        ];
        for (name, value) in non_negative {
            if value.is_nan() || value < 0.0 {
                return Err(SonorityError::InvalidValue(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        if self.min_gain > 1.0 || self.max_gain > 1.0 {
            return Err(SonorityError::InvalidValue(
                "min_gain and max_gain must lie in [0, 1]".into(),
            ));
        }
        if self.pitch.is_nan() || self.pitch <= 0.0 {
            return Err(SonorityError::InvalidValue(format!(
                "pitch must be positive, got {}",
                self.pitch
            )));
        }
        if !self.position.is_finite() {
            return Err(SonorityError::InvalidValue("position must be finite".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Holding {
    Nothing,
    Queued,
    Current,
}

fn holding(state: SourceState, read_index: usize, index: usize) -> Holding {
    match state {
        SourceState::Initial => Holding::Queued,
        SourceState::Stopped => Holding::Nothing,
        SourceState::Playing | SourceState::Paused => {
            if index < read_index {
                Holding::Nothing
            } else if index == read_index {
                Holding::Current
            } else {
                Holding::Queued
            }
        }
    }
}

#[derive(Debug)]
pub struct Source {
    id: SourceId,
    state: SourceState,
    pub attributes: SourceAttributes,
    queue: BufferQueue,
    /// Frames already read from the entry under the cursor.
    soundpos: u64,
    /// Render target reused across passes.
    pub(crate) scratch: Vec<i16>,
}

impl Source {
    pub(crate) fn new(id: SourceId) -> Self {
        Self {
            id,
            state: SourceState::Initial,
            attributes: SourceAttributes::default(),
            queue: BufferQueue::new(),
            soundpos: 0,
            scratch: Vec::new(),
        }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn queue(&self) -> &BufferQueue {
        &self.queue
    }

    pub fn soundpos(&self) -> u64 {
        self.soundpos
    }

    fn hold(&self, registry: &BufferRegistry, buffer: BufferId, how: Holding) {
        match how {
            Holding::Nothing => {}
            Holding::Queued => registry.add_queue_ref(buffer, self.id),
            Holding::Current => registry.add_current_ref(buffer, self.id),
        }
    }

    fn release(&self, registry: &BufferRegistry, buffer: BufferId, how: Holding) {
        match how {
            Holding::Nothing => {}
            Holding::Queued => registry.remove_queue_ref(buffer, self.id),
            Holding::Current => registry.remove_current_ref(buffer, self.id),
        }
    }

    /// Move to `state` at (`read_index`, `soundpos`), updating registry references.
    fn set_cursor(
        &mut self,
        registry: &BufferRegistry,
        state: SourceState,
        read_index: usize,
        soundpos: u64,
    ) {
        let (old_state, old_read) = (self.state, self.queue.read_index());
        self.state = state;
        self.queue.set_read_index(read_index);
        self.soundpos = soundpos;
        let new_read = self.queue.read_index();

        for (index, entry) in self.queue.entries().iter().enumerate() {
            let Some(buffer) = entry.buffer else {
                continue;
            };
            let before = holding(old_state, old_read, index);
            let after = holding(state, new_read, index);
            match (before, after) {
                _ if before == after => {}
                (Holding::Queued, Holding::Current) => registry.promote_ref(buffer, self.id),
                _ => {
                    self.hold(registry, buffer, after);
                    self.release(registry, buffer, before);
                }
            }
        }
    }

    /// Start, restart or resume playback. Returns true when resuming from pause.
    ///
    /// A playing source is left where it is.
    pub(crate) fn play(&mut self, registry: &BufferRegistry) -> bool {
        match self.state {
            SourceState::Playing => false,
            SourceState::Paused => {
                // A seek made during the pause takes effect before the next chunk.
                match self.queue.take_splice() {
                    Some(splice) => self.set_cursor(
                        registry,
                        SourceState::Playing,
                        splice.read_index,
                        splice.soundpos,
                    ),
                    None => self.state = SourceState::Playing,
                }
                true
            }
            _ => {
                // A seek requested while stopped picks the starting point.
                let (read_index, soundpos) = self
                    .queue
                    .take_splice()
                    .map_or((0, 0), |splice| (splice.read_index, splice.soundpos));
                self.set_cursor(registry, SourceState::Playing, read_index, soundpos);
                false
            }
        }
    }

    /// Pause a playing source. Returns false for any other state.
    pub(crate) fn pause(&mut self) -> bool {
        if self.state == SourceState::Playing {
            self.state = SourceState::Paused;
            true
        } else {
            false
        }
    }

    /// Stop and mark every entry processed.
    pub(crate) fn stop(&mut self, registry: &BufferRegistry) {
        self.queue.take_splice();
        let end = self.queue.len();
        self.set_cursor(registry, SourceState::Stopped, end, 0);
    }

    /// Back to `Initial` at the start of the queue.
    pub(crate) fn rewind(&mut self, registry: &BufferRegistry) {
        self.queue.take_splice();
        self.set_cursor(registry, SourceState::Initial, 0, 0);
    }

    /// Reposition an active source. Used by the mixer after each pass.
    pub(crate) fn advance(&mut self, registry: &BufferRegistry, read_index: usize, soundpos: u64) {
        let state = self.state;
        self.set_cursor(registry, state, read_index, soundpos);
    }

    pub(crate) fn take_splice(&mut self) -> Option<QueueSplice> {
        self.queue.take_splice()
    }

    pub(crate) fn request_splice(&mut self, read_index: usize, soundpos: u64) -> Result<()> {
        self.queue.request_splice(read_index, soundpos)
    }

    pub(crate) fn set_pending_callback(&mut self, index: usize, pending: bool) {
        if let Some(entry) = self.queue.get_mut(index) {
            entry.pending_callback = pending;
        }
    }

    pub(crate) fn queue_buffer(&mut self, registry: &BufferRegistry, buffer: BufferId) -> Result<()> {
        self.queue.append(buffer)?;
        let index = self.queue.len() - 1;
        let how = holding(self.state, self.queue.read_index(), index);
        self.hold(registry, buffer, how);
        Ok(())
    }

    /// Remove `n` processed buffers from the front of the queue.
    pub(crate) fn unqueue(&mut self, n: usize) -> Result<Vec<BufferId>> {
        // Processed entries hold no references in any state.
        self.queue.unqueue(n)
    }

    fn release_all(&self, registry: &BufferRegistry) {
        let read = self.queue.read_index();
        for (index, entry) in self.queue.entries().iter().enumerate() {
            if let Some(buffer) = entry.buffer {
                self.release(registry, buffer, holding(self.state, read, index));
            }
        }
    }

    fn check_inactive(&self, what: &str) -> Result<()> {
        if self.state.is_active() {
            return Err(SonorityError::InvalidOperation(format!(
                "Cannot {} on {} while {:?}",
                what, self.id, self.state
            )));
        }
        Ok(())
    }

    /// Drop every queued buffer. Only valid on an initial or stopped source.
    pub(crate) fn clear_queue(&mut self, registry: &BufferRegistry) -> Result<()> {
        self.check_inactive("clear the queue")?;
        self.release_all(registry);
        self.queue.clear();
        self.soundpos = 0;
        Ok(())
    }

    /// Replace the queue with `buffer` alone. Only valid on an initial or
    /// stopped source; the source returns to `Initial`.
    pub(crate) fn set_buffer(&mut self, registry: &BufferRegistry, buffer: Option<BufferId>) -> Result<()> {
        self.check_inactive("set the buffer")?;
        if let Some(buffer) = buffer {
            registry.add_queue_ref(buffer, self.id);
        }
        self.release_all(registry);
        self.queue.head(buffer);
        self.state = SourceState::Initial;
        self.soundpos = 0;
        Ok(())
    }

    /// Release every reference ahead of the source being destroyed.
    pub(crate) fn detach(&mut self, registry: &BufferRegistry) {
        self.release_all(registry);
        self.queue.clear();
        self.state = SourceState::Stopped;
    }
}
