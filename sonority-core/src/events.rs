//! Events reported by the mixer

use crate::buffer::BufferId;
use crate::context::ContextId;
use crate::source::SourceId;

#[derive(Debug, Clone, PartialEq)]
pub enum MixerEvent {
    /// A non-looping source ran out of queued data and was stopped.
    SourceCompleted {
        context: ContextId,
        source: SourceId,
    },
    /// A looping source wrapped back to the start of its data.
    SourceLooped {
        context: ContextId,
        source: SourceId,
    },
    /// A scheduled source could not be resolved and was torn down.
    SourceInvalidated {
        context: ContextId,
        source: SourceId,
        reason: String,
    },
    /// A buffer was actually freed, after deletion and the last reference.
    BufferReleased {
        buffer: BufferId,
    },
    /// The output device rejected a chunk. Mixing continues.
    DeviceWriteFailed {
        error: String,
    },
    MixerStarted {
        synchronous: bool,
    },
    MixerStopped,
}

impl MixerEvent {
    pub fn source_id(&self) -> Option<SourceId> {
        match self {
            Self::SourceCompleted { source, .. }
            | Self::SourceLooped { source, .. }
            | Self::SourceInvalidated { source, .. } => Some(*source),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::SourceInvalidated { .. } | Self::DeviceWriteFailed { .. }
        )
    }
}
