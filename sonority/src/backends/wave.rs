use sonority_core::{DeviceBackend, DeviceFormat, Result, SonorityError};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

fn wav_error(path: &Path, e: hound::Error) -> SonorityError {
    SonorityError::AudioDevice(format!("WAV output '{}': {}", path.display(), e))
}

/// Writes every mixed chunk to a 16-bit PCM WAV file.
///
/// Nothing paces the writes, so a background mixer produces audio as fast
/// as its pass deadline allows. The header is completed by
/// [`finalize`](Self::finalize) or on drop.
pub struct WaveBackend {
    path: PathBuf,
    name: String,
    format: DeviceFormat,
    buffer_size: usize,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    paused: bool,
}

impl WaveBackend {
    /// Create (or truncate) `path` and prepare it for `format`.
    ///
    /// # Errors
    ///
    /// Returns `AudioDevice` if the file cannot be created.
    pub fn create(path: impl AsRef<Path>, format: DeviceFormat, buffer_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&path, spec).map_err(|e| wav_error(&path, e))?;
        log::info!("Writing output to '{}'", path.display());

        Ok(Self {
            name: format!("WAV file {}", path.display()),
            path,
            format,
            buffer_size,
            writer: Some(writer),
            paused: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> u32 {
        self.writer.as_ref().map_or(0, |w| w.duration())
    }

    /// Complete the WAV header. Later writes are rejected.
    pub fn finalize(&mut self) -> Result<()> {
        match self.writer.take() {
            Some(writer) => writer.finalize().map_err(|e| wav_error(&self.path, e)),
            None => Ok(()),
        }
    }
}

impl DeviceBackend for WaveBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> DeviceFormat {
        self.format
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        if self.paused {
            return Ok(());
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(SonorityError::AudioDevice(format!(
                "WAV output '{}' is already finalized",
                self.path.display()
            )));
        };
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| wav_error(&self.path, e))?;
        }
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

impl Drop for WaveBackend {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            log::warn!("{}", e);
        }
    }
}
