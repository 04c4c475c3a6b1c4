//! Output devices the mixer writes to.

mod memory;
mod null;

pub use memory::MemoryBackend;
pub use null::NullBackend;

use crate::error::Result;

/// Sample layout a device accepts. Samples are always interleaved i16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

impl DeviceFormat {
    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }
}

/// A sink for mixed chunks.
///
/// `write` may block to pace the caller to the device clock. Errors from
/// `write` are reported by the mixer and do not stop it.
pub trait DeviceBackend: Send {
    fn name(&self) -> &str;

    fn format(&self) -> DeviceFormat;

    /// Preferred number of frames per write.
    fn buffer_size(&self) -> usize;

    fn write(&mut self, samples: &[i16]) -> Result<()>;

    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }
}
