//! Contexts: a listener, a distance model and a table of sources.

use crate::distance::DistanceModel;
use crate::error::{Result, SonorityError};
use crate::source::{Source, SourceId};
use crate::sync::{lock, read, write};
use glam::Vec3;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listener {
    pub position: Vec3,
    pub gain: f32,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            gain: 1.0,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<()> {
        if !self.position.is_finite() {
            return Err(SonorityError::InvalidValue(
                "Listener position must be finite".into(),
            ));
        }
        if self.gain.is_nan() || self.gain < 0.0 {
            return Err(SonorityError::InvalidValue(format!(
                "Listener gain must be non-negative, got {}",
                self.gain
            )));
        }
        Ok(())
    }
}

pub type SharedSource = Arc<Mutex<Source>>;

#[derive(Debug)]
pub struct Context {
    id: ContextId,
    sources: RwLock<HashMap<SourceId, SharedSource>>,
    distance_model: Mutex<DistanceModel>,
    listener: Mutex<Listener>,
    suspended: AtomicBool,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: ContextId::next(),
            sources: RwLock::new(HashMap::new()),
            distance_model: Mutex::new(DistanceModel::default()),
            listener: Mutex::new(Listener::default()),
            suspended: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub(crate) fn create_source(&self) -> Result<SourceId> {
        let id = SourceId::next();
        let mut sources = write(&self.sources);
        sources.try_reserve(1)?;
        sources.insert(id, Arc::new(Mutex::new(Source::new(id))));
        Ok(id)
    }

    pub(crate) fn source(&self, id: SourceId) -> Option<SharedSource> {
        read(&self.sources).get(&id).cloned()
    }

    pub(crate) fn remove_source(&self, id: SourceId) -> Option<SharedSource> {
        write(&self.sources).remove(&id)
    }

    pub(crate) fn drain_sources(&self) -> Vec<SharedSource> {
        write(&self.sources).drain().map(|(_, source)| source).collect()
    }

    pub fn has_source(&self, id: SourceId) -> bool {
        read(&self.sources).contains_key(&id)
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        let mut ids: Vec<_> = read(&self.sources).keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn source_count(&self) -> usize {
        read(&self.sources).len()
    }

    pub fn distance_model(&self) -> DistanceModel {
        *lock(&self.distance_model)
    }

    pub fn set_distance_model(&self, model: DistanceModel) {
        *lock(&self.distance_model) = model;
    }

    pub fn listener(&self) -> Listener {
        *lock(&self.listener)
    }

    pub fn set_listener(&self, listener: Listener) -> Result<()> {
        listener.validate()?;
        *lock(&self.listener) = listener;
        Ok(())
    }

    /// Stop mixing this context's sources until [`process`](Self::process).
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::Release);
    }

    pub fn process(&self) {
        self.suspended.store(false, Ordering::Release);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }
}
