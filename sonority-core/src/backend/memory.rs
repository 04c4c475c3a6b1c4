use super::{DeviceBackend, DeviceFormat};
use crate::error::{Result, SonorityError};
use crate::sync::lock;
use std::sync::{Arc, Mutex};

/// Records every written chunk. The recording is shared so it can be read
/// after the backend has been handed to the mixer.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    format: DeviceFormat,
    buffer_size: usize,
    recorded: Arc<Mutex<Vec<i16>>>,
    writes: Arc<Mutex<usize>>,
    fail_writes: bool,
    paused: bool,
}

impl MemoryBackend {
    pub fn new(format: DeviceFormat, buffer_size: usize) -> Self {
        Self {
            format,
            buffer_size,
            recorded: Arc::new(Mutex::new(Vec::new())),
            writes: Arc::new(Mutex::new(0)),
            fail_writes: false,
            paused: false,
        }
    }

    /// A backend whose every write fails.
    pub fn failing(format: DeviceFormat, buffer_size: usize) -> Self {
        Self {
            fail_writes: true,
            ..Self::new(format, buffer_size)
        }
    }

    /// Handle to the recorded samples.
    pub fn recording(&self) -> Arc<Mutex<Vec<i16>>> {
        self.recorded.clone()
    }

    pub fn samples(&self) -> Vec<i16> {
        lock(&self.recorded).clone()
    }

    pub fn write_count(&self) -> usize {
        *lock(&self.writes)
    }

    pub fn clear(&self) {
        lock(&self.recorded).clear();
    }
}

impl DeviceBackend for MemoryBackend {
    fn name(&self) -> &str {
        "Memory"
    }

    fn format(&self) -> DeviceFormat {
        self.format
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        *lock(&self.writes) += 1;
        if self.fail_writes {
            return Err(SonorityError::AudioDevice("Memory backend write refused".into()));
        }
        if self.paused {
            return Ok(());
        }
        let mut recorded = lock(&self.recorded);
        recorded.try_reserve(samples.len())?;
        recorded.extend_from_slice(samples);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.paused = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_writes() {
        let mut backend = MemoryBackend::new(DeviceFormat::new(2, 48000), 4);
        let observer = backend.clone();
        backend.write(&[1, 2, 3, 4]).unwrap();
        backend.pause().unwrap();
        backend.write(&[9, 9]).unwrap();
        backend.resume().unwrap();
        backend.write(&[5, 6]).unwrap();
        assert_eq!(observer.samples(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(observer.write_count(), 3);
    }

    #[test]
    fn test_failing_backend() {
        let mut backend = MemoryBackend::failing(DeviceFormat::new(1, 8000), 4);
        assert!(backend.write(&[0; 4]).is_err());
        assert!(backend.samples().is_empty());
    }
}
