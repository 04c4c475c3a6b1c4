use crate::error::{Result, SonorityError};
use crate::mixfunc::MAX_MIX_SOURCES;

/// Which family of mixing kernels the engine may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelPreference {
    /// Query the CPU once at init and take the widest available family.
    #[default]
    Auto,
    /// Always use the portable scalar kernels.
    Scalar,
}

/// Configuration descriptor for a mixer engine
#[derive(Debug, Clone)]
pub struct MixerDesc {
    /// Internal mixing sample rate in Hz. Buffers must be supplied at this rate.
    pub sample_rate: u32,
    /// Number of interleaved channels in the mixed chunk (1 or 2 in practice).
    pub channels: u16,
    /// Frames mixed and written per pass. `None` derives the chunk from the
    /// device's buffer size when the mixer is configured.
    pub chunk_frames: Option<usize>,
    /// Initial Mix Pool / Mix Manager capacity. Both grow on demand.
    pub max_sources: usize,
    /// Requested size of the specialised mixing-function table.
    pub mix_arity: usize,
    /// Kernel family selection policy.
    pub kernel: KernelPreference,
    /// When true the caller drives passes with `mix_pass()`; otherwise a
    /// background thread loops them.
    pub synchronous: bool,
}

impl Default for MixerDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            chunk_frames: Some(1024),
            max_sources: 64,
            mix_arity: MAX_MIX_SOURCES,
            kernel: KernelPreference::Auto,
            synchronous: false,
        }
    }
}

impl MixerDesc {
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

    pub fn chunk_frames(mut self, frames: usize) -> Self {
        self.chunk_frames = Some(frames);
        self
    }

    /// Size each pass from the device's buffer size instead of a fixed frame count.
    pub fn chunk_from_device(mut self) -> Self {
        self.chunk_frames = None;
        self
    }

    pub fn max_sources(mut self, max: usize) -> Self {
        self.max_sources = max;
        self
    }

    pub fn mix_arity(mut self, arity: usize) -> Self {
        self.mix_arity = arity;
        self
    }

    pub fn kernel(mut self, kernel: KernelPreference) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn synchronous(mut self, synchronous: bool) -> Self {
        self.synchronous = synchronous;
        self
    }

    /// Reject descriptors the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(SonorityError::InvalidConfiguration(
                "Sample rate must be non-zero".into(),
            ));
        }
        if self.channels == 0 {
            return Err(SonorityError::InvalidConfiguration(
                "Channel count must be non-zero".into(),
            ));
        }
        if self.chunk_frames == Some(0) {
            return Err(SonorityError::InvalidConfiguration(
                "Chunk size must be non-zero".into(),
            ));
        }
        if self.mix_arity == 0 || self.mix_arity > MAX_MIX_SOURCES {
            return Err(SonorityError::InvalidConfiguration(format!(
                "Mix arity {} outside 1..={}",
                self.mix_arity, MAX_MIX_SOURCES
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_desc_is_valid() {
        assert!(MixerDesc::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_descs() {
        assert!(MixerDesc::new().sample_rate(0).validate().is_err());
        assert!(MixerDesc::new().channels(0).validate().is_err());
        assert!(MixerDesc::new().chunk_frames(0).validate().is_err());
        assert!(MixerDesc::new().mix_arity(0).validate().is_err());
        assert!(
            MixerDesc::new()
                .mix_arity(MAX_MIX_SOURCES + 1)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_builder() {
        let desc = MixerDesc::new()
            .sample_rate(22050)
            .channels(1)
            .chunk_from_device()
            .synchronous(true);
        assert_eq!(desc.sample_rate, 22050);
        assert_eq!(desc.channels, 1);
        assert_eq!(desc.chunk_frames, None);
        assert!(desc.synchronous);
    }
}
