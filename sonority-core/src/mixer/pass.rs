//! One mixing pass.

use super::{EngineShared, MixState};
use crate::buffer::{BufferId, BufferRegistry, BufferView};
use crate::context::{Context, Listener};
use crate::distance::DistanceModel;
use crate::error::Result;
use crate::events::MixerEvent;
use crate::mix_manager::MixManager;
use crate::mix_pool::MixHandle;
use crate::source::{Source, SourceAttributes, SourceState};
use crate::sync::lock;

/// Summary of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixReport {
    /// Sources that contributed a chunk.
    pub sources_mixed: usize,
    /// Frames written to the device.
    pub frames: usize,
    /// The device rejected the chunk.
    pub device_error: bool,
}

enum Outcome {
    /// Keep the node scheduled.
    Continue { looped: bool },
    /// Not rendered this pass.
    Skipped,
    /// The queue ran out.
    Finished,
    /// The source left the playing states behind the mixer's back.
    Detached,
    Invalid(String),
}

/// Gain applied to a source's samples: attributes, distance attenuation and
/// listener gain combined.
pub(crate) fn effective_gain(attributes: &SourceAttributes, listener: &Listener, model: DistanceModel) -> f32 {
    let offset = if attributes.relative {
        attributes.position
    } else {
        attributes.position - listener.position
    };
    let attenuation = model.gain(
        offset.length(),
        attributes.rolloff_factor,
        attributes.reference_distance,
        attributes.max_distance,
    );
    let gain = (attributes.gain * attenuation)
        .max(attributes.min_gain)
        .min(attributes.max_gain);
    gain * listener.gain
}

/// Write `frames` frames of `src` (in `src_channels`) into `dst` (in
/// `dst_channels`) starting at frame `at`, scaled by `gain`. Output channel
/// `c` reads input channel `c % src_channels`.
fn render_frames(
    dst: &mut [i16],
    dst_channels: usize,
    at: usize,
    src: &[i16],
    src_channels: usize,
    frames: usize,
    gain: f32,
) {
    let out = &mut dst[at * dst_channels..(at + frames) * dst_channels];
    for (frame_out, frame_in) in out
        .chunks_exact_mut(dst_channels)
        .zip(src.chunks_exact(src_channels))
    {
        for (c, sample) in frame_out.iter_mut().enumerate() {
            let input = frame_in[c % src_channels];
            *sample = if gain == 1.0 {
                input
            } else {
                (f32::from(input) * gain).round() as i16
            };
        }
    }
}

/// Per-pass inputs shared by every node.
struct PassInput<'a> {
    buffers: &'a BufferRegistry,
    chunk_frames: usize,
    channels: usize,
}

impl EngineShared {
    pub(crate) fn mix_pass(&self) -> Result<MixReport> {
        let mut stage = lock(&self.stage);
        let stage = &mut *stage;
        let channels = self.channels as usize;
        let chunk_frames = stage.manager.chunk_len() / channels;
        let input = PassInput {
            buffers: &self.buffers,
            chunk_frames,
            channels,
        };

        let mut mix_guard = lock(&self.mix);
        let mix = &mut *mix_guard;
        mix.handles.clear();
        mix.pool.collect_handles(&mut mix.handles);
        stage.manager.reserve(mix.handles.len())?;

        let mut destroyed = Vec::new();
        for index in 0..mix.handles.len() {
            let handle = mix.handles[index];
            let outcome = self.mix_node(&input, mix, handle, &mut stage.manager);
            let Some(node) = mix.pool.get_mut(handle) else {
                continue;
            };
            let (context, source) = (node.context, node.source);
            match outcome {
                Outcome::Continue { looped } => {
                    if looped {
                        self.emit(MixerEvent::SourceLooped { context, source });
                    }
                }
                Outcome::Skipped => {
                    if node.destroy_me {
                        destroyed.push((handle, None));
                    }
                }
                Outcome::Finished => {
                    node.destroy_me = true;
                    destroyed.push((handle, Some(MixerEvent::SourceCompleted { context, source })));
                }
                Outcome::Detached => {
                    node.destroy_me = true;
                    destroyed.push((handle, None));
                }
                Outcome::Invalid(reason) => {
                    log::warn!("Dropping {} from the mixer: {}", source, reason);
                    node.destroy_me = true;
                    destroyed.push((
                        handle,
                        Some(MixerEvent::SourceInvalidated {
                            context,
                            source,
                            reason,
                        }),
                    ));
                }
            }
        }

        for (handle, event) in destroyed {
            let Some(node) = mix.pool.dealloc(handle) else {
                continue;
            };
            if let Ok(context) = self.context(node.context) {
                if let Some(shared) = context.source(node.source) {
                    let mut source = lock(&shared);
                    if source.state().is_active() {
                        source.stop(&self.buffers);
                    }
                }
            }
            log::debug!("Unscheduled {}", node.source);
            if let Some(event) = event {
                self.emit(event);
            }
        }

        for (buffer, frames) in mix.streams.drain() {
            self.buffers.advance_stream(buffer, frames);
        }
        let sources_mixed = stage.manager.len();
        drop(mix_guard);

        stage.chunk.fill(0);
        stage.manager.mix(&stage.table, &mut stage.chunk);

        let mut output = lock(&self.output);
        let output = &mut *output;
        let result = if output.converter.is_identity() {
            output.device.write(&stage.chunk)
        } else {
            output.converter.convert(&stage.chunk, &mut stage.converted);
            output.device.write(&stage.converted)
        };
        let device_error = match result {
            Ok(()) => false,
            Err(e) => {
                log::warn!("Device write failed: {}", e);
                self.emit(MixerEvent::DeviceWriteFailed {
                    error: e.to_string(),
                });
                true
            }
        };

        log::debug!(
            "Mix pass: {} sources, {} frames",
            sources_mixed,
            chunk_frames
        );
        Ok(MixReport {
            sources_mixed,
            frames: chunk_frames,
            device_error,
        })
    }

    fn mix_node(
        &self,
        input: &PassInput<'_>,
        mix: &mut MixState,
        handle: MixHandle,
        manager: &mut MixManager,
    ) -> Outcome {
        let Some(node) = mix.pool.get(handle) else {
            return Outcome::Skipped;
        };
        if node.destroy_me || !node.play_me {
            return Outcome::Skipped;
        }
        let (context_id, source_id) = (node.context, node.source);

        let Ok(context) = self.context(context_id) else {
            return Outcome::Invalid(format!("{} no longer exists", context_id));
        };
        if context.is_suspended() {
            return Outcome::Skipped;
        }
        let Some(shared) = context.source(source_id) else {
            return Outcome::Invalid(format!("{} no longer exists", source_id));
        };
        let mut source = lock(&shared);
        match source.state() {
            SourceState::Paused => return Outcome::Skipped,
            SourceState::Playing => {}
            SourceState::Initial | SourceState::Stopped => return Outcome::Detached,
        }

        let outcome = render_source(input, mix, &context, &mut source);
        if matches!(outcome, Outcome::Continue { .. } | Outcome::Finished) {
            if let Err(e) = manager.add(&source.scratch) {
                return Outcome::Invalid(e.to_string());
            }
        }
        outcome
    }
}

/// Render one chunk of `source` into its scratch buffer and move its cursor.
fn render_source(input: &PassInput<'_>, mix: &mut MixState, context: &Context, source: &mut Source) -> Outcome {
    let chunk_frames = input.chunk_frames;
    let channels = input.channels;
    let gain = effective_gain(
        &source.attributes,
        &context.listener(),
        context.distance_model(),
    );
    let looping = source.attributes.looping;
    let source_id = source.id();

    let mut scratch = std::mem::take(&mut source.scratch);
    scratch.clear();
    scratch.resize(chunk_frames * channels, 0);

    let mut read = source.queue().read_index();
    let mut pos = source.soundpos();
    let mut written = 0usize;
    let mut exhausted = false;
    let mut looped = false;
    // Frames written since the cursor last wrapped; a full lap without
    // progress means the queue has nothing left to give this pass.
    let mut progress_since_wrap = 0usize;
    let mut steps_without_progress = 0usize;
    let entries = source.queue().len();

    while written < chunk_frames {
        if steps_without_progress > entries + 1 {
            break;
        }
        let Some(entry) = source.queue().get(read).copied() else {
            if looping && !source.queue().is_empty() {
                if looped && progress_since_wrap == 0 {
                    break;
                }
                read = 0;
                pos = 0;
                looped = true;
                progress_since_wrap = 0;
                continue;
            }
            exhausted = true;
            break;
        };
        let Some(buffer) = entry.buffer else {
            read += 1;
            pos = 0;
            steps_without_progress += 1;
            continue;
        };
        let Some(view) = input.buffers.view(buffer) else {
            source.scratch = scratch;
            return Outcome::Invalid(format!("{} was freed while queued", buffer));
        };

        let format = view.format();
        let src_channels = format.channels as usize;
        let wanted = chunk_frames - written;
        let produced = match view {
            BufferView::Static(_, samples) => {
                let total = (samples.len() / src_channels) as u64;
                let start = pos.min(total) as usize;
                let n = ((total - start as u64) as usize).min(wanted);
                render_frames(
                    &mut scratch,
                    channels,
                    written,
                    &samples[start * src_channels..(start + n) * src_channels],
                    src_channels,
                    n,
                    gain,
                );
                pos += n as u64;
                if pos >= total {
                    read += 1;
                    pos = 0;
                }
                n
            }
            BufferView::Streaming(_) => {
                let n = read_stream(input.buffers, mix, buffer, wanted);
                render_frames(
                    &mut scratch,
                    channels,
                    written,
                    &mix.staging,
                    src_channels,
                    n,
                    gain,
                );
                written += n;
                // Streams never end on their own; an underrun is silence.
                break;
            }
            BufferView::Callback(_, callback) => {
                // Sized in the buffer's own channel count.
                mix.staging.clear();
                mix.staging.resize(wanted * src_channels, 0);
                let fresh = pos == 0;
                let n = {
                    let mut callback = lock(&callback);
                    (&mut **callback)(source_id, buffer, &mut mix.staging[..])
                }
                .min(wanted);
                render_frames(
                    &mut scratch,
                    channels,
                    written,
                    &mix.staging,
                    src_channels,
                    n,
                    gain,
                );
                source.set_pending_callback(read, fresh && n == 0);
                pos += n as u64;
                if n < wanted {
                    read += 1;
                    pos = 0;
                }
                n
            }
        };

        written += produced;
        progress_since_wrap += produced;
        if produced == 0 {
            steps_without_progress += 1;
        } else {
            steps_without_progress = 0;
        }
    }

    source.scratch = scratch;

    if read >= entries {
        if looping && !source.queue().is_empty() {
            read = 0;
            pos = 0;
            looped = true;
        } else {
            exhausted = true;
        }
    }

    let registry = input.buffers;
    if let Some(splice) = source.take_splice() {
        source.advance(registry, splice.read_index, splice.soundpos);
        return Outcome::Continue { looped: false };
    }
    if exhausted {
        return Outcome::Finished;
    }
    source.advance(registry, read, pos);
    Outcome::Continue { looped }
}

/// Copy up to `frames` frames from the front of a stream into the staging
/// buffer and note the read for the end-of-pass advance.
fn read_stream(buffers: &BufferRegistry, mix: &mut MixState, buffer: BufferId, frames: usize) -> usize {
    mix.staging.clear();
    let n = buffers.peek_stream(buffer, frames, &mut mix.staging);
    let consumed = mix.streams.entry(buffer).or_insert(0);
    *consumed = (*consumed).max(n);
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec3;

    #[test]
    fn test_render_frames_maps_channels() {
        let mut dst = vec![0i16; 8];
        render_frames(&mut dst, 2, 1, &[10, 20], 1, 2, 1.0);
        assert_eq!(dst, vec![0, 0, 10, 10, 20, 20, 0, 0]);

        let mut dst = vec![0i16; 2];
        render_frames(&mut dst, 1, 0, &[1, 2, 3, 4], 2, 2, 1.0);
        assert_eq!(dst, vec![1, 3]);
    }

    #[test]
    fn test_render_frames_scales() {
        let mut dst = vec![0i16; 2];
        render_frames(&mut dst, 1, 0, &[1000, -1000], 1, 2, 0.5);
        assert_eq!(dst, vec![500, -500]);
    }

    #[test]
    fn test_effective_gain_defaults_to_unity() {
        let gain = effective_gain(
            &SourceAttributes::default(),
            &Listener::default(),
            DistanceModel::default(),
        );
        assert_eq!(gain, 1.0);
    }

    #[test]
    fn test_effective_gain_attenuates_with_distance() {
        let attributes = SourceAttributes {
            position: Vec3::new(4.0, 0.0, 0.0),
            ..Default::default()
        };
        let gain = effective_gain(&attributes, &Listener::default(), DistanceModel::Inverse);
        assert_relative_eq!(gain, 0.25, epsilon = 1e-6);

        // Relative sources ignore the listener position.
        let listener = Listener {
            position: Vec3::new(4.0, 0.0, 0.0),
            gain: 0.5,
        };
        let relative = SourceAttributes {
            relative: true,
            ..attributes
        };
        assert_relative_eq!(
            effective_gain(&relative, &listener, DistanceModel::Inverse),
            0.125,
            epsilon = 1e-6
        );
        assert_relative_eq!(
            effective_gain(&attributes, &listener, DistanceModel::Inverse),
            0.5,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_effective_gain_respects_bounds() {
        let attributes = SourceAttributes {
            position: Vec3::new(100.0, 0.0, 0.0),
            min_gain: 0.3,
            ..Default::default()
        };
        assert_relative_eq!(
            effective_gain(&attributes, &Listener::default(), DistanceModel::Inverse),
            0.3,
            epsilon = 1e-6
        );
    }
}
