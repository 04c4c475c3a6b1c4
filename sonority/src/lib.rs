//! # Sonority
//!
//! A 3D positional audio API backed by a software mixer.
//!
//! Applications own a [`SonorityWorld`], load 16-bit PCM into buffers, queue
//! buffers on sources and move sources and the listener around. A mixer
//! thread sums every playing source, attenuated by distance, into one output
//! stream for a cpal device or a WAV file.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sonority::*;
//!
//! let world = SonorityWorld::new(SonorityWorldDesc::default())?;
//!
//! // One second of a 440 Hz tone, mono
//! let tone: Vec<i16> = (0..48000)
//!     .map(|i| ((i as f32 * 440.0 * std::f32::consts::TAU / 48000.0).sin() * 8000.0) as i16)
//!     .collect();
//! let buffer = world.create_buffer(1, tone)?;
//!
//! let source = world.create_source()?;
//! world.queue_buffers(source, &[buffer])?;
//! world.set_source_position(source, Vec3::new(4.0, 0.0, 0.0))?;
//! world.play(source)?;
//!
//! for event in world.poll_events() {
//!     if let MixerEvent::SourceCompleted { source, .. } = event {
//!         println!("{} finished", source);
//!     }
//! }
//! # Ok::<(), SonorityError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`SonorityWorld`]**: buffers, sources, the listener and playback control
//! - **[`SonorityWorldDesc`]**: sample rate, block size, output and threading choices
//! - **[`MixerEngine`]**: the engine underneath, for multi-context use
//! - **[`MixerEvent`]**: completion, loop, release and device-failure notifications
//!
//! ## Architecture
//!
//! 1. **Caller's thread**: owns the world and edits sources and buffers
//! 2. **Mixer thread**: one pass per block, saturating 16-bit summation
//! 3. **Audio callback**: lock-free consumption from a ring buffer to the device

pub mod backends;
pub mod config;
pub mod world;

pub use backends::{CpalBackend, CpalStream, WaveBackend};
pub use config::{OutputDesc, SonorityWorldDesc};
pub use world::SonorityWorld;

pub use sonority_core::{
    BufferDeletion, BufferFormat, BufferId, BufferKind, BufferState, DeviceBackend, DeviceFormat,
    DistanceModel, KernelPreference, Listener, MemoryBackend, MixReport, MixerEngine, MixerEvent,
    NullBackend, PlayPosition, Result, SonorityError, SourceAttributes, SourceId, SourceState,
    Vec3,
};
