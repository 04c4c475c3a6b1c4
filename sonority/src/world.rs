use crate::backends::{CpalBackend, CpalStream, WaveBackend};
use crate::config::{OutputDesc, SonorityWorldDesc};
use sonority_core::{
    BufferDeletion, BufferFormat, BufferId, BufferState, ContextId, DeviceBackend, DeviceFormat,
    DistanceModel, Listener, MixReport, MixerEngine, MixerEvent, NullBackend, PlayPosition, Result,
    SourceAttributes, SourceId, SourceState, Vec3,
};
use std::path::Path;

/// Main world object that manages positional audio sources and playback.
///
/// `SonorityWorld` owns one mixer engine bound to one output device and one
/// context. Buffers hold PCM data at the world's sample rate; sources play
/// queues of buffers with their own gain and position. Mixing happens on a
/// background thread, or on each call to [`update`](Self::update) when the
/// world is synchronous.
///
/// # Architecture
///
/// - **Caller's thread**: owns the world, creates buffers and sources, edits attributes
/// - **Mixer thread**: sums every playing source into 16-bit chunks for the device
/// - **Device callback** (cpal only): drains mixed chunks from a lock-free ring
pub struct SonorityWorld {
    desc: SonorityWorldDesc,
    engine: MixerEngine,
    context: ContextId,
    stream: Option<CpalStream>,
}

impl SonorityWorld {
    /// Create a world writing to the output named in `desc`.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is invalid, the output device or
    /// file cannot be opened, or the mixer thread cannot be started.
    pub fn new(desc: SonorityWorldDesc) -> Result<Self> {
        let format = DeviceFormat::new(desc.channels, desc.sample_rate);
        let (device, stream): (Box<dyn DeviceBackend>, Option<CpalStream>) = match &desc.output {
            OutputDesc::Cpal => {
                let (backend, stream) =
                    CpalBackend::open_default(desc.sample_rate, desc.channels, desc.block_size)?;
                (Box::new(backend), Some(stream))
            }
            OutputDesc::Wave(path) => (
                Box::new(WaveBackend::create(path, format, desc.block_size)?),
                None,
            ),
            OutputDesc::Null => (Box::new(NullBackend::new(format, desc.block_size)), None),
        };
        Self::build(desc, device, stream)
    }

    /// Create a world writing to a caller-supplied device.
    ///
    /// The `output` field of `desc` is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is invalid or the mixer thread
    /// cannot be started.
    pub fn with_device(desc: SonorityWorldDesc, device: Box<dyn DeviceBackend>) -> Result<Self> {
        Self::build(desc, device, None)
    }

    fn build(
        desc: SonorityWorldDesc,
        device: Box<dyn DeviceBackend>,
        stream: Option<CpalStream>,
    ) -> Result<Self> {
        let engine = MixerEngine::new(desc.mixer_desc(), device)?;
        let context = engine.create_context()?;
        Ok(Self {
            desc,
            engine,
            context,
            stream,
        })
    }

    /// Returns the sample rate of the audio world.
    pub fn sample_rate(&self) -> u32 {
        self.desc.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.desc.channels
    }

    pub fn desc(&self) -> &SonorityWorldDesc {
        &self.desc
    }

    /// The underlying engine, for operations the world does not wrap.
    pub fn engine(&self) -> &MixerEngine {
        &self.engine
    }

    pub fn context_id(&self) -> ContextId {
        self.context
    }

    pub fn device_name(&self) -> String {
        self.engine.device_name()
    }

    // Buffers

    /// Creates a buffer holding a fixed block of interleaved PCM.
    ///
    /// # Arguments
    ///
    /// * `channels` - Interleaved channels in `samples` (1 or 2)
    /// * `samples` - 16-bit PCM at the world's sample rate
    ///
    /// # Errors
    ///
    /// Returns `AudioFormat` if `samples` is not a whole number of frames.
    pub fn create_buffer(&self, channels: u16, samples: Vec<i16>) -> Result<BufferId> {
        self.engine
            .buffers()
            .create_static(BufferFormat::new(channels, self.desc.sample_rate), samples)
    }

    /// Creates a streaming buffer, initially empty. Feed it with
    /// [`append_buffer_data`](Self::append_buffer_data).
    pub fn create_streaming_buffer(&self, channels: u16) -> Result<BufferId> {
        self.engine
            .buffers()
            .create_streaming(BufferFormat::new(channels, self.desc.sample_rate))
    }

    /// Creates a buffer whose PCM is produced on demand.
    ///
    /// The callback is invoked from the mixer thread with the playing source,
    /// the buffer and a slice to fill. It returns the number of frames written;
    /// fewer than requested ends the buffer for that source.
    pub fn create_callback_buffer<F>(&self, channels: u16, callback: F) -> Result<BufferId>
    where
        F: FnMut(SourceId, BufferId, &mut [i16]) -> usize + Send + 'static,
    {
        self.engine.buffers().create_callback(
            BufferFormat::new(channels, self.desc.sample_rate),
            Box::new(callback),
        )
    }

    /// Replaces a buffer's contents.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` while any source has the buffer queued.
    pub fn set_buffer_data(&self, buffer: BufferId, channels: u16, samples: Vec<i16>) -> Result<()> {
        self.engine.buffers().set_data(
            buffer,
            BufferFormat::new(channels, self.desc.sample_rate),
            samples,
        )
    }

    /// Appends PCM to a streaming buffer.
    pub fn append_buffer_data(&self, buffer: BufferId, samples: &[i16]) -> Result<()> {
        self.engine.buffers().append_stream_data(buffer, samples)
    }

    /// Registers a function run exactly once when the buffer is finally freed.
    pub fn set_buffer_destructor<F>(&self, buffer: BufferId, destructor: F) -> Result<()>
    where
        F: FnOnce(BufferId) + Send + 'static,
    {
        self.engine
            .buffers()
            .set_destructor(buffer, Box::new(destructor))
    }

    /// Deletes a buffer.
    ///
    /// A buffer still queued on a source is only marked; it is freed once the
    /// last source lets go of it, and a `BufferReleased` event follows.
    pub fn delete_buffer(&self, buffer: BufferId) -> Result<BufferDeletion> {
        self.engine.buffers().delete(buffer)
    }

    pub fn buffer_state(&self, buffer: BufferId) -> Result<BufferState> {
        self.engine.buffers().state(buffer)
    }

    /// Frames in a buffer, or `None` for callback buffers.
    pub fn buffer_frames(&self, buffer: BufferId) -> Result<Option<u64>> {
        self.engine.buffers().frames(buffer)
    }

    pub fn is_buffer(&self, buffer: BufferId) -> bool {
        self.engine.buffers().is_valid(buffer)
    }

    // Sources

    pub fn create_source(&self) -> Result<SourceId> {
        self.engine.create_source(self.context)
    }

    /// Stops and removes a source. Its queued buffers are released.
    pub fn delete_source(&self, source: SourceId) -> Result<()> {
        self.engine.delete_source(self.context, source)
    }

    pub fn source_ids(&self) -> Result<Vec<SourceId>> {
        Ok(self.engine.context(self.context)?.source_ids())
    }

    /// Appends buffers to a source's queue.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` for unknown buffers and `AudioFormat` for buffers
    /// at a different sample rate. On error the queue is unchanged.
    ///
    /// A streaming buffer ends the queue: it plays until the source is stopped
    /// and anything queued behind it is never reached.
    pub fn queue_buffers(&self, source: SourceId, buffers: &[BufferId]) -> Result<()> {
        self.engine.queue_buffers(self.context, source, buffers)
    }

    /// Removes `count` processed buffers from the front of the queue.
    pub fn unqueue_buffers(&self, source: SourceId, count: usize) -> Result<Vec<BufferId>> {
        self.engine.unqueue_buffers(self.context, source, count)
    }

    /// Replaces the whole queue with a single buffer, or empties it.
    pub fn set_source_buffer(&self, source: SourceId, buffer: Option<BufferId>) -> Result<()> {
        self.engine.set_source_buffer(self.context, source, buffer)
    }

    pub fn source_buffers(&self, source: SourceId) -> Result<Vec<BufferId>> {
        self.engine.source_buffers(self.context, source)
    }

    pub fn buffers_processed(&self, source: SourceId) -> Result<usize> {
        self.engine.buffers_processed(self.context, source)
    }

    pub fn source_attributes(&self, source: SourceId) -> Result<SourceAttributes> {
        self.engine.source_attributes(self.context, source)
    }

    /// Replaces all attributes of a source at once.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if any attribute is out of range; nothing is
    /// applied in that case.
    pub fn set_source_attributes(&self, source: SourceId, attributes: SourceAttributes) -> Result<()> {
        self.engine
            .set_source_attributes(self.context, source, attributes)
    }

    fn update_source(&self, source: SourceId, edit: impl FnOnce(&mut SourceAttributes)) -> Result<()> {
        let mut attributes = self.source_attributes(source)?;
        edit(&mut attributes);
        self.set_source_attributes(source, attributes)
    }

    pub fn set_source_position(&self, source: SourceId, position: Vec3) -> Result<()> {
        self.update_source(source, |a| a.position = position)
    }

    pub fn set_source_gain(&self, source: SourceId, gain: f32) -> Result<()> {
        self.update_source(source, |a| a.gain = gain)
    }

    /// Clamp range for the attenuated gain.
    pub fn set_source_gain_range(&self, source: SourceId, min: f32, max: f32) -> Result<()> {
        self.update_source(source, |a| {
            a.min_gain = min;
            a.max_gain = max;
        })
    }

    pub fn set_source_pitch(&self, source: SourceId, pitch: f32) -> Result<()> {
        self.update_source(source, |a| a.pitch = pitch)
    }

    pub fn set_source_looping(&self, source: SourceId, looping: bool) -> Result<()> {
        self.update_source(source, |a| a.looping = looping)
    }

    /// Interpret the source position relative to the listener.
    pub fn set_source_relative(&self, source: SourceId, relative: bool) -> Result<()> {
        self.update_source(source, |a| a.relative = relative)
    }

    /// Distance attenuation parameters fed to the world's distance model.
    pub fn set_source_distance(
        &self,
        source: SourceId,
        reference_distance: f32,
        rolloff_factor: f32,
        max_distance: f32,
    ) -> Result<()> {
        self.update_source(source, |a| {
            a.reference_distance = reference_distance;
            a.rolloff_factor = rolloff_factor;
            a.max_distance = max_distance;
        })
    }

    // Playback

    /// Starts playing a source.
    ///
    /// A playing source is left untouched. A paused source resumes where it
    /// stopped, or at the point set by [`seek`](Self::seek) during the pause;
    /// any other source starts from the head of its queue or from the seek point.
    ///
    /// # Returns
    ///
    /// `false` if the source has nothing queued and was stopped instead.
    pub fn play(&self, source: SourceId) -> Result<bool> {
        self.engine.add_source_to_mixer(self.context, source)
    }

    /// Pauses a playing source, keeping its position.
    ///
    /// # Returns
    ///
    /// `false` if the source was not playing.
    pub fn pause(&self, source: SourceId) -> Result<bool> {
        self.engine.pause_source(self.context, source)
    }

    /// Stops a source. Every queued buffer becomes processed.
    ///
    /// # Returns
    ///
    /// `false` if the source was already initial or stopped; nothing changes then.
    pub fn stop(&self, source: SourceId) -> Result<bool> {
        self.engine.remove_source_from_mixer(self.context, source)
    }

    /// Stops every source in the world.
    pub fn stop_all(&self) -> Result<()> {
        for source in self.source_ids()? {
            self.stop(source)?;
        }
        Ok(())
    }

    /// Returns a source to its initial state at the head of its queue.
    pub fn rewind(&self, source: SourceId) -> Result<()> {
        self.engine.rewind_source(self.context, source)
    }

    /// Moves the play position to `frame`, counted from the head of the queue.
    ///
    /// A playing source jumps on the next pass; otherwise the position is
    /// used by the next [`play`](Self::play).
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if the frame lies past the queued data.
    pub fn seek(&self, source: SourceId, frame: u64) -> Result<()> {
        self.engine.seek_source(self.context, source, frame)
    }

    pub fn source_state(&self, source: SourceId) -> Result<SourceState> {
        self.engine.source_state(self.context, source)
    }

    pub fn source_position(&self, source: SourceId) -> Result<PlayPosition> {
        self.engine.source_position(self.context, source)
    }

    pub fn is_playing(&self, source: SourceId) -> bool {
        matches!(self.source_state(source), Ok(SourceState::Playing))
    }

    // Listener and distance model

    /// Returns a copy of the current listener.
    pub fn listener(&self) -> Result<Listener> {
        Ok(self.engine.context(self.context)?.listener())
    }

    /// Sets the listener position. All non-relative sources are attenuated
    /// by their distance to it.
    pub fn set_listener_position(&self, position: Vec3) -> Result<()> {
        let context = self.engine.context(self.context)?;
        let listener = Listener {
            position,
            ..context.listener()
        };
        context.set_listener(listener)
    }

    /// Sets the master gain applied after distance attenuation.
    pub fn set_listener_gain(&self, gain: f32) -> Result<()> {
        let context = self.engine.context(self.context)?;
        let listener = Listener {
            gain,
            ..context.listener()
        };
        context.set_listener(listener)
    }

    pub fn distance_model(&self) -> Result<DistanceModel> {
        Ok(self.engine.context(self.context)?.distance_model())
    }

    pub fn set_distance_model(&self, model: DistanceModel) -> Result<()> {
        self.engine.context(self.context)?.set_distance_model(model);
        Ok(())
    }

    /// Freezes the world: the mixer skips its sources until [`process`](Self::process).
    pub fn suspend(&self) -> Result<()> {
        self.engine.context(self.context)?.suspend();
        Ok(())
    }

    pub fn process(&self) -> Result<()> {
        self.engine.context(self.context)?.process();
        Ok(())
    }

    // Mixer and output

    /// Runs one mixing pass if the world is synchronous.
    ///
    /// Call this regularly (for example once per frame) after
    /// `SonorityWorldDesc::synchronous(true)`. Does nothing when a background
    /// thread is mixing.
    pub fn update(&self) -> Result<Option<MixReport>> {
        if self.engine.is_synchronous() {
            self.engine.mix_pass().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Switches between caller-driven and background mixing.
    pub fn set_synchronous(&mut self, synchronous: bool) -> Result<()> {
        self.engine.set_mixer(synchronous)?;
        self.desc.synchronous = synchronous;
        Ok(())
    }

    pub fn is_synchronous(&self) -> bool {
        self.engine.is_synchronous()
    }

    /// Replaces the output with a WAV file at `path`.
    pub fn record_to(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let format = DeviceFormat::new(self.desc.channels, self.desc.sample_rate);
        let wave = WaveBackend::create(path.as_ref(), format, self.desc.block_size)?;
        self.engine.set_device(Box::new(wave))?;
        self.desc.output = OutputDesc::Wave(path.as_ref().to_path_buf());
        self.stream = None;
        Ok(())
    }

    /// Silences the output device without stopping any source.
    pub fn pause_output(&self) -> Result<()> {
        self.engine.pause_device()?;
        if let Some(stream) = &self.stream {
            stream.pause()?;
        }
        Ok(())
    }

    pub fn resume_output(&self) -> Result<()> {
        if let Some(stream) = &self.stream {
            stream.play()?;
        }
        self.engine.resume_device()
    }

    /// Drains events reported by the mixer since the last call.
    pub fn poll_events(&self) -> Vec<MixerEvent> {
        self.engine.poll_events()
    }
}

impl std::fmt::Debug for SonorityWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SonorityWorld")
            .field("desc", &self.desc)
            .field("context", &self.context)
            .field("device", &self.engine.device_name())
            .finish()
    }
}
