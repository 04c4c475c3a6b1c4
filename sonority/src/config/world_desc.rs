use sonority_core::{KernelPreference, MixerDesc};
use std::path::PathBuf;

/// Where a world sends its mixed output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputDesc {
    /// The default output device of the default cpal host.
    #[default]
    Cpal,
    /// A 16-bit PCM WAV file, finalized when the world is dropped.
    Wave(PathBuf),
    /// Discard everything. Useful for headless runs.
    Null,
}

/// Configuration descriptor for a Sonority world
#[derive(Debug, Clone)]
pub struct SonorityWorldDesc {
    /// Sample rate for mixing. Buffers must be supplied at this rate.
    pub sample_rate: u32,
    /// Number of interleaved output channels (typically 2 for stereo)
    pub channels: u16,
    /// Frames mixed per pass. Also requested from the device as its buffer size.
    pub block_size: usize,
    /// Sources the engine preallocates for. More may play; storage grows.
    pub max_sources: usize,
    pub output: OutputDesc,
    /// Drive mixing from [`SonorityWorld::update`](crate::SonorityWorld::update)
    /// instead of a background thread.
    pub synchronous: bool,
    pub kernel: KernelPreference,
}

impl Default for SonorityWorldDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            block_size: 1024,
            max_sources: 64,
            output: OutputDesc::Cpal,
            synchronous: false,
            kernel: KernelPreference::Auto,
        }
    }
}

impl SonorityWorldDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn block_size(mut self, frames: usize) -> Self {
        self.block_size = frames;
        self
    }

    pub fn max_sources(mut self, max: usize) -> Self {
        self.max_sources = max;
        self
    }

    pub fn output(mut self, output: OutputDesc) -> Self {
        self.output = output;
        self
    }

    /// Shorthand for `output(OutputDesc::Wave(path))`.
    pub fn wave_file(self, path: impl Into<PathBuf>) -> Self {
        self.output(OutputDesc::Wave(path.into()))
    }

    pub fn synchronous(mut self, synchronous: bool) -> Self {
        self.synchronous = synchronous;
        self
    }

    pub fn kernel(mut self, kernel: KernelPreference) -> Self {
        self.kernel = kernel;
        self
    }

    /// The engine descriptor this world runs with.
    pub fn mixer_desc(&self) -> MixerDesc {
        MixerDesc::new()
            .sample_rate(self.sample_rate)
            .channels(self.channels)
            .chunk_frames(self.block_size)
            .max_sources(self.max_sources)
            .kernel(self.kernel)
            .synchronous(self.synchronous)
    }
}
