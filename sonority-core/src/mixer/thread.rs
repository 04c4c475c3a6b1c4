//! Background mixing thread and the gate that lets callers pause it.

use super::EngineShared;
use crate::error::{Result, SonorityError};
use crate::sync::lock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct GateState {
    pauses: usize,
    in_pass: bool,
}

/// Serialises the mixer thread's passes against [`MixerPauseGuard`] holders.
#[derive(Debug, Default)]
pub(crate) struct PauseGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl PauseGate {
    /// Wait until no pause is held, then mark a pass in progress. Returns
    /// false if `stop` was raised while waiting.
    fn enter_pass(&self, stop: &AtomicBool) -> bool {
        let mut state = lock(&self.state);
        while state.pauses > 0 && !stop.load(Ordering::Acquire) {
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        if stop.load(Ordering::Acquire) {
            return false;
        }
        state.in_pass = true;
        true
    }

    fn leave_pass(&self) {
        lock(&self.state).in_pass = false;
        self.cond.notify_all();
    }

    /// Sleep up to `timeout`, waking early if `stop` is raised.
    fn sleep(&self, timeout: Duration, stop: &AtomicBool) {
        let state = lock(&self.state);
        let _ = self
            .cond
            .wait_timeout_while(state, timeout, |_| !stop.load(Ordering::Acquire));
    }

    /// Block until the current pass (if any) finishes and hold off new ones.
    pub(crate) fn pause(&self) {
        let mut state = lock(&self.state);
        state.pauses += 1;
        while state.in_pass {
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    pub(crate) fn resume(&self) {
        let mut state = lock(&self.state);
        state.pauses = state.pauses.saturating_sub(1);
        drop(state);
        self.cond.notify_all();
    }

    pub(crate) fn wake(&self) {
        let _state = lock(&self.state);
        self.cond.notify_all();
    }

    pub(crate) fn is_paused(&self) -> bool {
        lock(&self.state).pauses > 0
    }
}

/// Holds the background mixer between passes until dropped.
///
/// Does not block synchronous [`mix_pass`](super::MixerEngine::mix_pass) calls.
pub struct MixerPauseGuard<'a> {
    gate: &'a PauseGate,
}

impl<'a> MixerPauseGuard<'a> {
    pub(crate) fn new(gate: &'a PauseGate) -> Self {
        gate.pause();
        Self { gate }
    }
}

impl Drop for MixerPauseGuard<'_> {
    fn drop(&mut self) {
        self.gate.resume();
    }
}

pub(crate) fn spawn(shared: Arc<EngineShared>) -> Result<JoinHandle<()>> {
    shared.stop_thread.store(false, Ordering::Release);
    std::thread::Builder::new()
        .name("sonority-mixer".into())
        .spawn(move || run(shared))
        .map_err(|e| SonorityError::Engine(format!("Failed to spawn mixer thread: {}", e)))
}

fn run(shared: Arc<EngineShared>) {
    log::info!("Mixer thread started");
    let mut deadline = Instant::now();
    loop {
        if !shared.gate.enter_pass(&shared.stop_thread) {
            break;
        }
        if let Err(e) = shared.mix_pass() {
            log::warn!("Mix pass failed: {}", e);
        }
        shared.gate.leave_pass();

        deadline += shared.chunk_duration();
        let now = Instant::now();
        if deadline > now {
            shared.gate.sleep(deadline - now, &shared.stop_thread);
        } else {
            // Behind schedule, restart it from now.
            deadline = now;
        }
        if shared.stop_thread.load(Ordering::Acquire) {
            break;
        }
    }
    log::info!("Mixer thread stopped");
}
