//! The mixer engine.
//!
//! One [`MixerEngine`] owns the contexts, the buffer registry, the scheduled
//! sources and the output device. Each call to [`MixerEngine::mix_pass`] (or
//! each iteration of the background thread) renders one chunk from every
//! playing source, sums them and writes the result to the device.
//!
//! Locks are always taken in this order:
//!
//! 1. mix stage (mix manager, kernel table, output chunk)
//! 2. mix state (pool of scheduled sources, per-pass stream table)
//! 3. context table, then a single source
//! 4. buffer registry, only for the duration of one registry call
//!
//! The output device lock is only taken while holding the mix stage.

mod pass;
mod thread;

pub use pass::MixReport;
pub use thread::MixerPauseGuard;

use crate::backend::{DeviceBackend, DeviceFormat};
use crate::buffer::{BufferId, BufferKind, BufferRegistry};
use crate::config::{KernelPreference, MixerDesc};
use crate::context::{Context, ContextId, SharedSource};
use crate::convert::{ChannelConverter, FormatConverter};
use crate::error::{Result, SonorityError};
use crate::events::MixerEvent;
use crate::mix_manager::MixManager;
use crate::mix_pool::{MixHandle, MixNode, MixPool};
use crate::mixfunc::{CpuCaps, MixFuncTable};
use crate::source::{Source, SourceAttributes, SourceId, SourceState};
use crate::sync::{lock, read, write};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;
use thread::PauseGate;

/// Where a source is reading: an entry of its queue and a frame offset into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayPosition {
    pub entry: usize,
    pub frame: u64,
}

pub(crate) struct MixStage {
    manager: MixManager,
    table: MixFuncTable,
    chunk: Vec<i16>,
    converted: Vec<i16>,
}

pub(crate) struct MixState {
    pool: MixPool,
    /// Frames read from each streaming buffer during the current pass.
    streams: HashMap<BufferId, usize>,
    handles: Vec<MixHandle>,
    /// Stream reads land here before being scaled into a source's scratch.
    staging: Vec<i16>,
}

pub(crate) struct Output {
    device: Box<dyn DeviceBackend>,
    converter: Box<dyn FormatConverter>,
}

pub(crate) struct EngineShared {
    stage: Mutex<MixStage>,
    mix: Mutex<MixState>,
    gate: PauseGate,
    contexts: RwLock<HashMap<ContextId, Arc<Context>>>,
    buffers: BufferRegistry,
    output: Mutex<Output>,
    events_tx: Sender<MixerEvent>,
    events_rx: Receiver<MixerEvent>,
    stop_thread: AtomicBool,
    sample_rate: u32,
    channels: u16,
    chunk_frames: AtomicUsize,
    derive_chunk: bool,
}

impl EngineShared {
    fn chunk_duration(&self) -> Duration {
        let frames = self.chunk_frames.load(Ordering::Relaxed) as u64;
        Duration::from_micros(frames * 1_000_000 / self.sample_rate as u64)
    }

    fn context(&self, id: ContextId) -> Result<Arc<Context>> {
        read(&self.contexts)
            .get(&id)
            .cloned()
            .ok_or_else(|| SonorityError::InvalidName(format!("Unknown {}", id)))
    }

    fn source(&self, context: ContextId, source: SourceId) -> Result<SharedSource> {
        self.context(context)?
            .source(source)
            .ok_or_else(|| SonorityError::InvalidName(format!("Unknown {} in {}", source, context)))
    }

    fn emit(&self, event: MixerEvent) {
        let _ = self.events_tx.send(event);
    }
}

/// The mixing engine.
pub struct MixerEngine {
    shared: Arc<EngineShared>,
    thread: Option<JoinHandle<()>>,
    shut_down: bool,
}

impl MixerEngine {
    /// Build the engine and, unless `desc.synchronous`, start its thread.
    ///
    /// Any failure releases everything allocated so far.
    pub fn new(desc: MixerDesc, device: Box<dyn DeviceBackend>) -> Result<Self> {
        desc.validate()?;

        let caps = match desc.kernel {
            KernelPreference::Auto => CpuCaps::detect(),
            KernelPreference::Scalar => CpuCaps::none(),
        };
        let table = MixFuncTable::new(desc.mix_arity, caps)?;

        let device_format = device.format();
        if device_format.sample_rate != desc.sample_rate {
            log::warn!(
                "Device '{}' runs at {} Hz but the mixer at {} Hz; no rate conversion is applied",
                device.name(),
                device_format.sample_rate,
                desc.sample_rate
            );
        }
        let chunk_frames = desc.chunk_frames.unwrap_or_else(|| device.buffer_size());
        if chunk_frames == 0 {
            return Err(SonorityError::InvalidConfiguration(format!(
                "Device '{}' reports a zero buffer size",
                device.name()
            )));
        }

        let chunk_len = chunk_frames * desc.channels as usize;
        let manager = MixManager::new(desc.max_sources, chunk_len)?;
        let pool = MixPool::with_capacity(desc.max_sources)?;
        let converter = ChannelConverter::new(desc.channels, device_format.channels);
        let (events_tx, events_rx) = crossbeam_channel::unbounded();

        log::info!(
            "Mixer: {} Hz, {} channels, {} frames per pass, {:?} kernels, device '{}'",
            desc.sample_rate,
            desc.channels,
            chunk_frames,
            table.family(),
            device.name()
        );

        let shared = Arc::new(EngineShared {
            stage: Mutex::new(MixStage {
                manager,
                table,
                chunk: vec![0; chunk_len],
                converted: Vec::new(),
            }),
            mix: Mutex::new(MixState {
                pool,
                streams: HashMap::new(),
                handles: Vec::new(),
                staging: Vec::new(),
            }),
            gate: PauseGate::default(),
            contexts: RwLock::new(HashMap::new()),
            buffers: BufferRegistry::new(events_tx.clone()),
            output: Mutex::new(Output {
                device,
                converter: Box::new(converter),
            }),
            events_tx,
            events_rx,
            stop_thread: AtomicBool::new(false),
            sample_rate: desc.sample_rate,
            channels: desc.channels,
            chunk_frames: AtomicUsize::new(chunk_frames),
            derive_chunk: desc.chunk_frames.is_none(),
        });

        let thread = if desc.synchronous {
            None
        } else {
            Some(thread::spawn(shared.clone())?)
        };
        shared.emit(MixerEvent::MixerStarted {
            synchronous: desc.synchronous,
        });

        Ok(Self {
            shared,
            thread,
            shut_down: false,
        })
    }

    /// Switch between caller-driven and background mixing.
    pub fn set_mixer(&mut self, synchronous: bool) -> Result<()> {
        match (synchronous, self.thread.is_some()) {
            (true, true) => {
                self.stop_thread();
                log::info!("Mixer switched to synchronous mode");
            }
            (false, false) => {
                self.thread = Some(thread::spawn(self.shared.clone())?);
                log::info!("Mixer switched to asynchronous mode");
            }
            _ => {}
        }
        Ok(())
    }

    pub fn is_synchronous(&self) -> bool {
        self.thread.is_none()
    }

    fn stop_thread(&mut self) {
        if let Some(handle) = self.thread.take() {
            self.shared.stop_thread.store(true, Ordering::Release);
            self.shared.gate.wake();
            if handle.join().is_err() {
                log::error!("Mixer thread panicked");
            }
        }
    }

    /// Run one mixing pass on the calling thread.
    pub fn mix_pass(&self) -> Result<MixReport> {
        self.shared.mix_pass()
    }

    /// Hold the background thread between passes until the guard drops.
    pub fn pause_mixer(&self) -> MixerPauseGuard<'_> {
        MixerPauseGuard::new(&self.shared.gate)
    }

    /// Mixing format. The device may use a different channel count.
    pub fn format(&self) -> DeviceFormat {
        DeviceFormat::new(self.shared.channels, self.shared.sample_rate)
    }

    pub fn chunk_frames(&self) -> usize {
        self.shared.chunk_frames.load(Ordering::Relaxed)
    }

    pub fn device_name(&self) -> String {
        lock(&self.shared.output).device.name().to_string()
    }

    /// Replace the output device.
    pub fn set_device(&self, device: Box<dyn DeviceBackend>) -> Result<()> {
        let _pause = self.pause_mixer();
        let mut stage = lock(&self.shared.stage);
        let mut output = lock(&self.shared.output);

        let format = device.format();
        if self.shared.derive_chunk {
            let frames = device.buffer_size();
            if frames == 0 {
                return Err(SonorityError::InvalidConfiguration(format!(
                    "Device '{}' reports a zero buffer size",
                    device.name()
                )));
            }
            let chunk_len = frames * self.shared.channels as usize;
            stage.manager.set_chunk_len(chunk_len);
            stage.chunk.resize(chunk_len, 0);
            self.shared.chunk_frames.store(frames, Ordering::Relaxed);
        }
        log::info!("Output device changed to '{}'", device.name());
        output.converter = Box::new(ChannelConverter::new(self.shared.channels, format.channels));
        output.device = device;
        Ok(())
    }

    pub fn pause_device(&self) -> Result<()> {
        lock(&self.shared.output).device.pause()
    }

    pub fn resume_device(&self) -> Result<()> {
        lock(&self.shared.output).device.resume()
    }

    /// Drain pending events.
    pub fn poll_events(&self) -> Vec<MixerEvent> {
        self.shared.events_rx.try_iter().collect()
    }

    /// A receiver for events, shared with [`poll_events`](Self::poll_events).
    pub fn events(&self) -> Receiver<MixerEvent> {
        self.shared.events_rx.clone()
    }

    pub fn buffers(&self) -> &BufferRegistry {
        &self.shared.buffers
    }

    // Contexts

    pub fn create_context(&self) -> Result<ContextId> {
        let context = Arc::new(Context::new());
        let id = context.id();
        let mut contexts = write(&self.shared.contexts);
        contexts.try_reserve(1)?;
        contexts.insert(id, context);
        log::debug!("Created {}", id);
        Ok(id)
    }

    /// Remove a context and every source in it.
    pub fn destroy_context(&self, id: ContextId) -> Result<()> {
        let mut mix = lock(&self.shared.mix);
        let context = write(&self.shared.contexts)
            .remove(&id)
            .ok_or_else(|| SonorityError::InvalidName(format!("Unknown {}", id)))?;
        for shared in context.drain_sources() {
            let mut source = lock(&shared);
            if let Some(handle) = mix.pool.find(id, source.id()) {
                mix.pool.dealloc(handle);
            }
            source.detach(&self.shared.buffers);
        }
        log::debug!("Destroyed {}", id);
        Ok(())
    }

    pub fn context(&self, id: ContextId) -> Result<Arc<Context>> {
        self.shared.context(id)
    }

    pub fn context_ids(&self) -> Vec<ContextId> {
        let mut ids: Vec<_> = read(&self.shared.contexts).keys().copied().collect();
        ids.sort();
        ids
    }

    // Sources

    pub fn create_source(&self, context: ContextId) -> Result<SourceId> {
        self.shared.context(context)?.create_source()
    }

    /// Remove a source, unscheduling it and releasing its buffers.
    pub fn delete_source(&self, context: ContextId, source: SourceId) -> Result<()> {
        let mut mix = lock(&self.shared.mix);
        let shared = self
            .shared
            .context(context)?
            .remove_source(source)
            .ok_or_else(|| SonorityError::InvalidName(format!("Unknown {} in {}", source, context)))?;
        if let Some(handle) = mix.pool.find(context, source) {
            mix.pool.dealloc(handle);
        }
        lock(&shared).detach(&self.shared.buffers);
        Ok(())
    }

    fn with_source<T>(
        &self,
        context: ContextId,
        source: SourceId,
        f: impl FnOnce(&mut Source) -> Result<T>,
    ) -> Result<T> {
        let shared = self.shared.source(context, source)?;
        let mut source = lock(&shared);
        f(&mut source)
    }

    pub fn source_state(&self, context: ContextId, source: SourceId) -> Result<SourceState> {
        self.with_source(context, source, |s| Ok(s.state()))
    }

    pub fn source_attributes(&self, context: ContextId, source: SourceId) -> Result<SourceAttributes> {
        self.with_source(context, source, |s| Ok(s.attributes))
    }

    pub fn set_source_attributes(
        &self,
        context: ContextId,
        source: SourceId,
        attributes: SourceAttributes,
    ) -> Result<()> {
        attributes.validate()?;
        self.with_source(context, source, |s| {
            s.attributes = attributes;
            Ok(())
        })
    }

    pub fn source_position(&self, context: ContextId, source: SourceId) -> Result<PlayPosition> {
        self.with_source(context, source, |s| {
            Ok(PlayPosition {
                entry: s.queue().read_index(),
                frame: s.soundpos(),
            })
        })
    }

    /// Buffers queued on a source, in order.
    pub fn source_buffers(&self, context: ContextId, source: SourceId) -> Result<Vec<BufferId>> {
        self.with_source(context, source, |s| Ok(s.queue().buffers().collect()))
    }

    /// Number of queue entries already played.
    pub fn buffers_processed(&self, context: ContextId, source: SourceId) -> Result<usize> {
        self.with_source(context, source, |s| Ok(s.queue().processed()))
    }

    /// Sources currently scheduled, including ones waiting to be torn down.
    pub fn scheduled_sources(&self) -> usize {
        lock(&self.shared.mix).pool.len()
    }

    pub fn is_scheduled(&self, context: ContextId, source: SourceId) -> bool {
        let mix = lock(&self.shared.mix);
        mix.pool
            .find(context, source)
            .and_then(|handle| mix.pool.get(handle))
            .is_some_and(|node| node.play_me && !node.destroy_me)
    }

    /// Start, restart or resume a source and schedule it for mixing.
    ///
    /// Returns false when no scheduling change was needed: the source was
    /// already scheduled, or it has nothing queued and goes straight to
    /// `Stopped`. A source that is already playing keeps its position.
    pub fn add_source_to_mixer(&self, context: ContextId, source: SourceId) -> Result<bool> {
        let mut mix = lock(&self.shared.mix);
        let shared = self.shared.source(context, source)?;
        let mut src = lock(&shared);

        if src.queue().is_empty() {
            src.stop(&self.shared.buffers);
            return Ok(false);
        }
        src.play(&self.shared.buffers);

        if let Some(node) = mix
            .pool
            .find(context, source)
            .and_then(|handle| mix.pool.get_mut(handle))
        {
            let revived = node.destroy_me || !node.play_me;
            node.destroy_me = false;
            node.play_me = true;
            return Ok(revived);
        }

        mix.pool.alloc(MixNode::new(context, source))?;
        log::debug!("Scheduled {} in {}", source, context);
        Ok(true)
    }

    /// Stop a source and unschedule it. Initial and stopped sources are left
    /// untouched and `Ok(false)` is returned.
    pub fn remove_source_from_mixer(&self, context: ContextId, source: SourceId) -> Result<bool> {
        let mut mix = lock(&self.shared.mix);
        let shared = self.shared.source(context, source)?;
        let mut src = lock(&shared);

        if !src.state().is_active() {
            return Ok(false);
        }
        src.stop(&self.shared.buffers);
        if let Some(node) = mix
            .pool
            .find(context, source)
            .and_then(|handle| mix.pool.get_mut(handle))
        {
            node.play_me = false;
            node.destroy_me = true;
        }
        Ok(true)
    }

    /// Pause a playing source. It stays scheduled but is skipped.
    pub fn pause_source(&self, context: ContextId, source: SourceId) -> Result<bool> {
        self.with_source(context, source, |s| Ok(s.pause()))
    }

    /// Return a source to `Initial` at the start of its queue.
    pub fn rewind_source(&self, context: ContextId, source: SourceId) -> Result<()> {
        let mut mix = lock(&self.shared.mix);
        let shared = self.shared.source(context, source)?;
        let mut src = lock(&shared);
        src.rewind(&self.shared.buffers);
        if let Some(node) = mix
            .pool
            .find(context, source)
            .and_then(|handle| mix.pool.get_mut(handle))
        {
            node.play_me = false;
            node.destroy_me = true;
        }
        Ok(())
    }

    /// Move a source to `frame` frames from the start of its queue.
    ///
    /// Playing sources jump on the next pass; stopped and initial sources
    /// start from there when next played.
    pub fn seek_source(&self, context: ContextId, source: SourceId, frame: u64) -> Result<()> {
        self.with_source(context, source, |src| {
            let (index, offset) = self.locate_frame(src, frame)?;
            src.request_splice(index, offset)
        })
    }

    fn locate_frame(&self, src: &Source, frame: u64) -> Result<(usize, u64)> {
        let mut remaining = frame;
        for (index, entry) in src.queue().entries().iter().enumerate() {
            let Some(buffer) = entry.buffer else {
                continue;
            };
            if self.shared.buffers.kind(buffer)? != BufferKind::Static {
                return Err(SonorityError::InvalidOperation(format!(
                    "Cannot seek across {}: it has no fixed length",
                    buffer
                )));
            }
            let frames = self.shared.buffers.frames(buffer)?.unwrap_or(0);
            if remaining < frames {
                return Ok((index, remaining));
            }
            remaining -= frames;
        }
        Err(SonorityError::InvalidValue(format!(
            "Frame {} is past the end of {}'s queue",
            frame,
            src.id()
        )))
    }

    // Queues

    /// Append buffers to a source's queue. Nothing is queued unless every
    /// buffer is valid and matches the mixing rate.
    ///
    /// A streaming buffer never finishes, so entries queued after one are
    /// never reached.
    pub fn queue_buffers(&self, context: ContextId, source: SourceId, buffers: &[BufferId]) -> Result<()> {
        for &buffer in buffers {
            self.check_queueable(buffer)?;
        }
        self.with_source(context, source, |src| {
            for &buffer in buffers {
                src.queue_buffer(&self.shared.buffers, buffer)?;
            }
            Ok(())
        })
    }

    fn check_queueable(&self, buffer: BufferId) -> Result<()> {
        if !self.shared.buffers.is_valid(buffer) {
            return Err(SonorityError::InvalidName(format!("Unknown {}", buffer)));
        }
        let format = self.shared.buffers.format(buffer)?;
        if format.sample_rate != self.shared.sample_rate {
            return Err(SonorityError::AudioFormat(format!(
                "{} is {} Hz but the mixer runs at {} Hz",
                buffer, format.sample_rate, self.shared.sample_rate
            )));
        }
        Ok(())
    }

    /// Remove `count` processed buffers from the front of a source's queue.
    pub fn unqueue_buffers(&self, context: ContextId, source: SourceId, count: usize) -> Result<Vec<BufferId>> {
        self.with_source(context, source, |src| src.unqueue(count))
    }

    pub fn clear_queue(&self, context: ContextId, source: SourceId) -> Result<()> {
        self.with_source(context, source, |src| src.clear_queue(&self.shared.buffers))
    }

    /// Replace a source's queue with a single buffer, or empty it with `None`.
    pub fn set_source_buffer(
        &self,
        context: ContextId,
        source: SourceId,
        buffer: Option<BufferId>,
    ) -> Result<()> {
        if let Some(buffer) = buffer {
            self.check_queueable(buffer)?;
        }
        self.with_source(context, source, |src| {
            src.set_buffer(&self.shared.buffers, buffer)
        })
    }

    /// Stop the background thread and release every source's buffers.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.stop_thread();
        let contexts: Vec<_> = write(&self.shared.contexts).drain().collect();
        let mut mix = lock(&self.shared.mix);
        for (id, context) in contexts {
            for shared in context.drain_sources() {
                let mut source = lock(&shared);
                if let Some(handle) = mix.pool.find(id, source.id()) {
                    mix.pool.dealloc(handle);
                }
                source.detach(&self.shared.buffers);
            }
        }
        drop(mix);
        self.shared.emit(MixerEvent::MixerStopped);
        log::info!("Mixer shut down");
    }
}

impl Drop for MixerEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
