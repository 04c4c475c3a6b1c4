//! # Sonority Core
//!
//! A software 3D positional audio mixer. Applications create PCM buffers,
//! queue them on sources with gain and position attributes, and the
//! [`MixerEngine`] sums every playing source into a single 16-bit output
//! stream written to a [`DeviceBackend`].
//!
//! The engine runs either on a background thread or one pass at a time on
//! the caller's thread ([`MixerEngine::mix_pass`]).
//!
//! ```no_run
//! use sonority_core::{BufferFormat, MixerDesc, MixerEngine, NullBackend, DeviceFormat};
//!
//! # fn main() -> sonority_core::Result<()> {
//! let device = NullBackend::new(DeviceFormat::new(2, 48000), 1024);
//! let engine = MixerEngine::new(MixerDesc::new().synchronous(true), Box::new(device))?;
//! let context = engine.create_context()?;
//! let source = engine.create_source(context)?;
//! let buffer = engine
//!     .buffers()
//!     .create_static(BufferFormat::mono(48000), vec![0; 48000])?;
//! engine.queue_buffers(context, source, &[buffer])?;
//! engine.add_source_to_mixer(context, source)?;
//! engine.mix_pass()?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod buffer;
pub mod config;
pub mod context;
pub mod convert;
pub mod distance;
pub mod error;
pub mod events;
pub mod mix_manager;
pub mod mix_pool;
pub mod mixer;
pub mod mixfunc;
pub mod queue;
pub mod source;
mod sync;

pub use backend::{DeviceBackend, DeviceFormat, MemoryBackend, NullBackend};
pub use buffer::{
    BufferCallback, BufferDeletion, BufferDestructor, BufferFormat, BufferId, BufferKind,
    BufferRegistry, BufferState,
};
pub use config::{KernelPreference, MixerDesc};
pub use context::{Context, ContextId, Listener};
pub use convert::{ChannelConverter, FormatConverter};
pub use distance::DistanceModel;
pub use error::{Result, SonorityError};
pub use events::MixerEvent;
pub use glam::Vec3;
pub use mixer::{MixReport, MixerEngine, MixerPauseGuard, PlayPosition};
pub use mixfunc::{CpuCaps, MixFamily, MixFuncTable, MAX_MIX_SOURCES};
pub use source::{SourceAttributes, SourceId, SourceState};
