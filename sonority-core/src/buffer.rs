//! Buffer registry.
//!
//! Buffers are shared by every source that queues them. The registry tracks,
//! per buffer, which sources are *currently* reading it and which have it
//! *queued* for later. A deleted buffer stays alive until both lists are
//! empty; its destructor runs exactly once, when it is actually freed.

use crate::error::{Result, SonorityError};
use crate::events::MixerEvent;
use crate::source::SourceId;
use crate::sync::lock;
use crossbeam_channel::Sender;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

/// Layout of the interleaved i16 samples a buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

impl BufferFormat {
    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    pub fn mono(sample_rate: u32) -> Self {
        Self::new(1, sample_rate)
    }

    pub fn stereo(sample_rate: u32) -> Self {
        Self::new(2, sample_rate)
    }

    fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.sample_rate == 0 {
            return Err(SonorityError::AudioFormat(format!(
                "Unsupported buffer format: {} channels at {} Hz",
                self.channels, self.sample_rate
            )));
        }
        Ok(())
    }
}

/// Produces samples on demand: fills the slice with interleaved samples in the
/// buffer's format and returns the number of frames written. Returning fewer
/// frames than requested ends the data.
pub type BufferCallback = Box<dyn FnMut(SourceId, BufferId, &mut [i16]) -> usize + Send>;

/// Runs once, when a buffer is freed.
pub type BufferDestructor = Box<dyn FnOnce(BufferId) + Send>;

pub(crate) type SharedCallback = Arc<Mutex<BufferCallback>>;

/// Whether [`BufferRegistry::delete`] freed the buffer or deferred it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferDeletion {
    Deleted,
    /// Still referenced by a source; freed when the last reference drops.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Not referenced by any source.
    Unused,
    /// Queued by a source but not being read yet.
    Pending,
    /// Being read by at least one source.
    Processed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Static,
    Streaming,
    Callback,
}

enum BufferData {
    Static(Arc<[i16]>),
    Streaming {
        samples: VecDeque<i16>,
        consumed_frames: u64,
    },
    Callback(SharedCallback),
}

/// What the mixer needs to render from a buffer, cloned out of the registry.
pub(crate) enum BufferView {
    Static(BufferFormat, Arc<[i16]>),
    Streaming(BufferFormat),
    Callback(BufferFormat, SharedCallback),
}

impl BufferView {
    pub(crate) fn format(&self) -> BufferFormat {
        match self {
            Self::Static(format, _) | Self::Streaming(format) | Self::Callback(format, _) => {
                *format
            }
        }
    }
}

struct Buffer {
    format: BufferFormat,
    data: BufferData,
    current_refs: Vec<SourceId>,
    queue_refs: Vec<SourceId>,
    pending_delete: bool,
    destructor: Option<BufferDestructor>,
}

impl Buffer {
    fn new(format: BufferFormat, data: BufferData) -> Self {
        Self {
            format,
            data,
            current_refs: Vec::new(),
            queue_refs: Vec::new(),
            pending_delete: false,
            destructor: None,
        }
    }

    fn is_referenced(&self) -> bool {
        !self.current_refs.is_empty() || !self.queue_refs.is_empty()
    }

    fn state(&self) -> BufferState {
        if !self.current_refs.is_empty() {
            BufferState::Processed
        } else if !self.queue_refs.is_empty() {
            BufferState::Pending
        } else {
            BufferState::Unused
        }
    }
}

fn remove_one(refs: &mut Vec<SourceId>, source: SourceId) -> bool {
    match refs.iter().position(|&s| s == source) {
        Some(index) => {
            refs.swap_remove(index);
            true
        }
        None => false,
    }
}

pub struct BufferRegistry {
    buffers: Mutex<HashMap<BufferId, Buffer>>,
    events: Sender<MixerEvent>,
}

impl BufferRegistry {
    pub fn new(events: Sender<MixerEvent>) -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn insert(&self, format: BufferFormat, data: BufferData) -> Result<BufferId> {
        format.validate()?;
        let id = BufferId::next();
        let mut buffers = lock(&self.buffers);
        buffers.try_reserve(1)?;
        buffers.insert(id, Buffer::new(format, data));
        Ok(id)
    }

    /// Register immutable interleaved samples.
    pub fn create_static(&self, format: BufferFormat, samples: Vec<i16>) -> Result<BufferId> {
        check_frames(format, samples.len())?;
        self.insert(format, BufferData::Static(samples.into()))
    }

    /// Register an empty stream fed by [`append_stream_data`](Self::append_stream_data).
    pub fn create_streaming(&self, format: BufferFormat) -> Result<BufferId> {
        self.insert(
            format,
            BufferData::Streaming {
                samples: VecDeque::new(),
                consumed_frames: 0,
            },
        )
    }

    /// Register a buffer whose samples come from `callback`.
    pub fn create_callback(&self, format: BufferFormat, callback: BufferCallback) -> Result<BufferId> {
        self.insert(format, BufferData::Callback(Arc::new(Mutex::new(callback))))
    }

    /// Replace a buffer's contents with static samples. Fails while any
    /// source references the buffer.
    pub fn set_data(&self, id: BufferId, format: BufferFormat, samples: Vec<i16>) -> Result<()> {
        format.validate()?;
        check_frames(format, samples.len())?;
        let mut buffers = lock(&self.buffers);
        let buffer = live_mut(&mut buffers, id)?;
        if buffer.is_referenced() {
            return Err(SonorityError::InvalidOperation(format!(
                "{} is in use and cannot be refilled",
                id
            )));
        }
        buffer.format = format;
        buffer.data = BufferData::Static(samples.into());
        Ok(())
    }

    /// Append samples to a streaming buffer.
    pub fn append_stream_data(&self, id: BufferId, samples: &[i16]) -> Result<()> {
        let mut buffers = lock(&self.buffers);
        let buffer = live_mut(&mut buffers, id)?;
        check_frames(buffer.format, samples.len())?;
        match &mut buffer.data {
            BufferData::Streaming { samples: queue, .. } => {
                queue.try_reserve(samples.len())?;
                queue.extend(samples.iter().copied());
                Ok(())
            }
            _ => Err(SonorityError::InvalidOperation(format!(
                "{} is not a streaming buffer",
                id
            ))),
        }
    }

    /// Install a closure run once when the buffer is freed.
    pub fn set_destructor(&self, id: BufferId, destructor: BufferDestructor) -> Result<()> {
        let mut buffers = lock(&self.buffers);
        live_mut(&mut buffers, id)?.destructor = Some(destructor);
        Ok(())
    }

    /// Delete a buffer, or defer the free until no source references it.
    pub fn delete(&self, id: BufferId) -> Result<BufferDeletion> {
        let freed = {
            let mut buffers = lock(&self.buffers);
            let buffer = live_mut(&mut buffers, id)?;
            if buffer.is_referenced() {
                buffer.pending_delete = true;
                log::debug!("Deferring delete of {}: still referenced", id);
                return Ok(BufferDeletion::Deferred);
            }
            buffers.remove(&id)
        };
        if let Some(buffer) = freed {
            self.release(id, buffer);
        }
        Ok(BufferDeletion::Deleted)
    }

    /// True for buffers that exist and have not been deleted.
    pub fn is_valid(&self, id: BufferId) -> bool {
        lock(&self.buffers)
            .get(&id)
            .is_some_and(|buffer| !buffer.pending_delete)
    }

    /// True while the buffer still exists, deleted or not.
    pub fn exists(&self, id: BufferId) -> bool {
        lock(&self.buffers).contains_key(&id)
    }

    pub fn state(&self, id: BufferId) -> Result<BufferState> {
        let buffers = lock(&self.buffers);
        buffers
            .get(&id)
            .map(Buffer::state)
            .ok_or_else(|| SonorityError::InvalidName(format!("Unknown {}", id)))
    }

    pub fn format(&self, id: BufferId) -> Result<BufferFormat> {
        let buffers = lock(&self.buffers);
        buffers
            .get(&id)
            .map(|buffer| buffer.format)
            .ok_or_else(|| SonorityError::InvalidName(format!("Unknown {}", id)))
    }

    pub fn kind(&self, id: BufferId) -> Result<BufferKind> {
        let buffers = lock(&self.buffers);
        let buffer = buffers
            .get(&id)
            .ok_or_else(|| SonorityError::InvalidName(format!("Unknown {}", id)))?;
        Ok(match buffer.data {
            BufferData::Static(_) => BufferKind::Static,
            BufferData::Streaming { .. } => BufferKind::Streaming,
            BufferData::Callback(_) => BufferKind::Callback,
        })
    }

    /// Frames held by a static buffer, or frames waiting in a stream.
    /// Callback buffers have no fixed length.
    pub fn frames(&self, id: BufferId) -> Result<Option<u64>> {
        let buffers = lock(&self.buffers);
        let buffer = buffers
            .get(&id)
            .ok_or_else(|| SonorityError::InvalidName(format!("Unknown {}", id)))?;
        let channels = buffer.format.channels as u64;
        Ok(match &buffer.data {
            BufferData::Static(samples) => Some(samples.len() as u64 / channels),
            BufferData::Streaming { samples, .. } => Some(samples.len() as u64 / channels),
            BufferData::Callback(_) => None,
        })
    }

    /// Frames consumed from a stream so far.
    pub fn stream_position(&self, id: BufferId) -> Result<u64> {
        let buffers = lock(&self.buffers);
        match buffers.get(&id).map(|buffer| &buffer.data) {
            Some(BufferData::Streaming {
                consumed_frames, ..
            }) => Ok(*consumed_frames),
            Some(_) => Err(SonorityError::InvalidOperation(format!(
                "{} is not a streaming buffer",
                id
            ))),
            None => Err(SonorityError::InvalidName(format!("Unknown {}", id))),
        }
    }

    /// Live buffers, including deleted ones still awaiting their last reference.
    pub fn len(&self) -> usize {
        lock(&self.buffers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_queue_ref(&self, id: BufferId, source: SourceId) {
        if let Some(buffer) = lock(&self.buffers).get_mut(&id) {
            buffer.queue_refs.push(source);
        }
    }

    pub fn remove_queue_ref(&self, id: BufferId, source: SourceId) {
        self.drop_ref(id, source, |buffer| &mut buffer.queue_refs);
    }

    pub fn add_current_ref(&self, id: BufferId, source: SourceId) {
        if let Some(buffer) = lock(&self.buffers).get_mut(&id) {
            buffer.current_refs.push(source);
        }
    }

    pub fn remove_current_ref(&self, id: BufferId, source: SourceId) {
        self.drop_ref(id, source, |buffer| &mut buffer.current_refs);
    }

    /// Move one of `source`'s references on `id` from queued to current.
    pub fn promote_ref(&self, id: BufferId, source: SourceId) {
        if let Some(buffer) = lock(&self.buffers).get_mut(&id) {
            remove_one(&mut buffer.queue_refs, source);
            buffer.current_refs.push(source);
        }
    }

    fn drop_ref(&self, id: BufferId, source: SourceId, refs: fn(&mut Buffer) -> &mut Vec<SourceId>) {
        let freed = {
            let mut buffers = lock(&self.buffers);
            let Some(buffer) = buffers.get_mut(&id) else {
                return;
            };
            if !remove_one(refs(buffer), source) {
                log::warn!("{} holds no such reference from {}", id, source);
            }
            if buffer.pending_delete && !buffer.is_referenced() {
                buffers.remove(&id)
            } else {
                None
            }
        };
        if let Some(buffer) = freed {
            self.release(id, buffer);
        }
    }

    fn release(&self, id: BufferId, mut buffer: Buffer) {
        if let Some(destructor) = buffer.destructor.take() {
            destructor(id);
        }
        log::debug!("Released {}", id);
        let _ = self.events.send(MixerEvent::BufferReleased { buffer: id });
    }

    pub(crate) fn view(&self, id: BufferId) -> Option<BufferView> {
        let buffers = lock(&self.buffers);
        let buffer = buffers.get(&id)?;
        Some(match &buffer.data {
            BufferData::Static(samples) => BufferView::Static(buffer.format, samples.clone()),
            BufferData::Streaming { .. } => BufferView::Streaming(buffer.format),
            BufferData::Callback(callback) => BufferView::Callback(buffer.format, callback.clone()),
        })
    }

    /// Copy up to `frames` frames from the front of a stream into `out`
    /// without consuming them. Returns the frames copied.
    pub(crate) fn peek_stream(&self, id: BufferId, frames: usize, out: &mut Vec<i16>) -> usize {
        let buffers = lock(&self.buffers);
        let Some(buffer) = buffers.get(&id) else {
            return 0;
        };
        let BufferData::Streaming { samples, .. } = &buffer.data else {
            return 0;
        };
        let channels = buffer.format.channels as usize;
        let available = (samples.len() / channels).min(frames);
        out.extend(samples.iter().take(available * channels).copied());
        available
    }

    /// Consume `frames` frames from the front of a stream.
    pub(crate) fn advance_stream(&self, id: BufferId, frames: usize) {
        let mut buffers = lock(&self.buffers);
        let Some(buffer) = buffers.get_mut(&id) else {
            return;
        };
        let channels = buffer.format.channels as usize;
        if let BufferData::Streaming {
            samples,
            consumed_frames,
        } = &mut buffer.data
        {
            let frames = frames.min(samples.len() / channels);
            samples.drain(..frames * channels);
            *consumed_frames += frames as u64;
        }
    }
}

fn check_frames(format: BufferFormat, samples: usize) -> Result<()> {
    if format.channels == 0 || samples % format.channels as usize != 0 {
        return Err(SonorityError::AudioFormat(format!(
            "{} samples is not a whole number of {}-channel frames",
            samples, format.channels
        )));
    }
    Ok(())
}

fn live_mut(buffers: &mut HashMap<BufferId, Buffer>, id: BufferId) -> Result<&mut Buffer> {
    buffers
        .get_mut(&id)
        .filter(|buffer| !buffer.pending_delete)
        .ok_or_else(|| SonorityError::InvalidName(format!("Unknown {}", id)))
}
