//! Real-time playback through cpal.
//!
//! The mixer thread and the cpal callback never share a lock: mixed chunks go
//! through a lock-free SPSC ring. The callback drains the ring, pads any
//! underrun with silence and wakes the writer through a condvar.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use sonority_core::{DeviceBackend, DeviceFormat, Result, SonorityError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Ring capacity in device blocks.
const RING_BLOCKS: usize = 4;

type Wakeup = Arc<(Mutex<()>, Condvar)>;

/// Keeps the cpal stream alive. Dropping it stops playback.
///
/// cpal streams are not `Send` on every platform, so the stream stays with
/// whoever opened it while the [`CpalBackend`] moves to the mixer.
pub struct CpalStream {
    stream: cpal::Stream,
}

impl CpalStream {
    pub fn play(&self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| SonorityError::AudioDevice(format!("Failed to start stream: {}", e)))
    }

    pub fn pause(&self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| SonorityError::AudioDevice(format!("Failed to pause stream: {}", e)))
    }
}

/// Producer half of the playback ring.
pub struct CpalBackend {
    name: String,
    format: DeviceFormat,
    block_size: usize,
    producer: HeapProd<i16>,
    wakeup: Wakeup,
    muted: Arc<AtomicBool>,
    /// Longest a write waits for the callback to make room.
    stall_timeout: Duration,
}

impl CpalBackend {
    /// Open the default output device and start its stream.
    ///
    /// # Arguments
    ///
    /// * `sample_rate` - Rate requested from the device, in Hz
    /// * `channels` - Interleaved channel count requested from the device
    /// * `block_size` - Frames per device callback
    ///
    /// # Errors
    ///
    /// Returns `AudioDevice` if no device is available or the stream cannot be
    /// built, and `AudioFormat` for sample formats other than f32, i16 and u16.
    pub fn open_default(
        sample_rate: u32,
        channels: u16,
        block_size: usize,
    ) -> Result<(Self, CpalStream)> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            SonorityError::AudioDevice("No default output device available".into())
        })?;
        let name = device
            .name()
            .unwrap_or_else(|_| String::from("Default output"));

        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Fixed(block_size as u32),
        };
        let default_config = device.default_output_config().map_err(|e| {
            SonorityError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let block_len = block_size * channels as usize;
        let (producer, consumer) = HeapRb::<i16>::new(block_len * RING_BLOCKS).split();
        let wakeup: Wakeup = Arc::new((Mutex::new(()), Condvar::new()));
        let muted = Arc::new(AtomicBool::new(false));

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(
                &device,
                &config,
                consumer,
                wakeup.clone(),
                muted.clone(),
                block_len,
            )?,
            cpal::SampleFormat::I16 => build_stream::<i16>(
                &device,
                &config,
                consumer,
                wakeup.clone(),
                muted.clone(),
                block_len,
            )?,
            cpal::SampleFormat::U16 => build_stream::<u16>(
                &device,
                &config,
                consumer,
                wakeup.clone(),
                muted.clone(),
                block_len,
            )?,
            other => {
                return Err(SonorityError::AudioFormat(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };
        let stream = CpalStream { stream };
        stream.play()?;

        let block_time = Duration::from_secs_f64(block_size as f64 / sample_rate as f64);
        log::info!(
            "cpal output '{}': {} Hz, {} channels, {} frames per block",
            name,
            sample_rate,
            channels,
            block_size
        );

        Ok((
            Self {
                name,
                format: DeviceFormat::new(channels, sample_rate),
                block_size,
                producer,
                wakeup,
                muted,
                stall_timeout: block_time * RING_BLOCKS as u32,
            },
            stream,
        ))
    }

    /// Samples queued but not yet consumed by the device.
    pub fn queued(&self) -> usize {
        self.producer.occupied_len()
    }
}

impl DeviceBackend for CpalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> DeviceFormat {
        self.format
    }

    fn buffer_size(&self) -> usize {
        self.block_size
    }

    /// Push a chunk into the ring, blocking until the callback makes room.
    fn write(&mut self, samples: &[i16]) -> Result<()> {
        if self.muted.load(Ordering::Relaxed) {
            return Ok(());
        }

        let deadline = Instant::now() + self.stall_timeout;
        let mut written = 0;
        while written < samples.len() {
            written += self.producer.push_slice(&samples[written..]);
            if written == samples.len() {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(SonorityError::AudioDevice(format!(
                    "Output stalled, dropped {} samples",
                    samples.len() - written
                )));
            }
            let (lock, cvar) = &*self.wakeup;
            let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = cvar
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    /// Mute the device. Writes are discarded until [`resume`](Self::resume).
    fn pause(&mut self) -> Result<()> {
        self.muted.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.muted.store(false, Ordering::Relaxed);
        Ok(())
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<i16>,
    wakeup: Wakeup,
    muted: Arc<AtomicBool>,
    block_len: usize,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<i16>,
{
    let mut scratch = vec![0i16; block_len];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0);
                }
                let popped = if muted.load(Ordering::Relaxed) {
                    consumer.clear();
                    0
                } else {
                    consumer.pop_slice(&mut scratch[..data.len()])
                };
                for (out, &sample) in data.iter_mut().zip(&scratch[..popped]) {
                    *out = T::from_sample(sample);
                }
                data[popped..].fill(T::from_sample(0i16));

                let (_lock, cvar) = &*wakeup;
                cvar.notify_one();
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| SonorityError::AudioDevice(format!("Failed to build stream: {}", e)))
}
