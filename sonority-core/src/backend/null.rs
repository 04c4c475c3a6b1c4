use super::{DeviceBackend, DeviceFormat};
use crate::error::Result;

/// Discards everything written to it.
#[derive(Debug, Clone)]
pub struct NullBackend {
    format: DeviceFormat,
    buffer_size: usize,
    frames_written: u64,
}

impl NullBackend {
    pub fn new(format: DeviceFormat, buffer_size: usize) -> Self {
        Self {
            format,
            buffer_size,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl DeviceBackend for NullBackend {
    fn name(&self) -> &str {
        "Null Driver"
    }

    fn format(&self) -> DeviceFormat {
        self.format
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        self.frames_written += (samples.len() / self.format.channels.max(1) as usize) as u64;
        Ok(())
    }
}
