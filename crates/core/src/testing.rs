//! Deterministic stand-ins for the audio output used by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use quartet_transport::{AudioArc, Clock, InstanceId, Output, OutputError};

pub fn audio_secs(secs: f64) -> AudioArc {
    let rate = 100;
    AudioArc::new(vec![0.1; (secs * rate as f64) as usize], rate, 1)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start { id: InstanceId, position: f64 },
    Stop(InstanceId),
}

#[derive(Default)]
struct State {
    now: f64,
    refuse_starts: bool,
    next_id: u64,
    live: HashMap<InstanceId, f64>,
    ended: Vec<InstanceId>,
    events: Vec<Event>,
}

/// Records every start and stop and lets tests drive the clock and natural ends.
#[derive(Clone, Default)]
pub struct FakeOutput {
    state: Arc<Mutex<State>>,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn set_now(&self, now: f64) {
        self.state().now = now;
    }

    /// Make every following `start` fail as if the command queue were full.
    pub fn refuse_starts(&self, refuse: bool) {
        self.state().refuse_starts = refuse;
    }

    pub fn advance(&self, secs: f64) {
        self.state().now += secs;
    }

    /// Simulate `id` reaching the end of its buffer.
    pub fn end_naturally(&self, id: InstanceId) {
        let mut state = self.state();
        state.live.remove(&id);
        state.ended.push(id);
    }

    /// Queue an end notification without touching the live set, as happens
    /// when a voice finishes just before its stop command arrives.
    pub fn push_ended(&self, id: InstanceId) {
        self.state().ended.push(id);
    }

    pub fn position_of(&self, id: InstanceId) -> Option<f64> {
        self.state().events.iter().find_map(|e| match e {
            Event::Start { id: started, position } if *started == id => Some(*position),
            _ => None,
        })
    }

    pub fn live(&self) -> Vec<InstanceId> {
        self.state().live.keys().copied().collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }
}

impl Clock for FakeOutput {
    fn now(&self) -> f64 {
        self.state().now
    }
}

impl Output for FakeOutput {
    fn start(&self, _audio: &AudioArc, position_secs: f64) -> Result<InstanceId, OutputError> {
        let mut state = self.state();
        if state.refuse_starts {
            return Err(OutputError::QueueFull);
        }
        state.next_id += 1;
        let id = InstanceId(state.next_id);
        state.live.insert(id, position_secs);
        state.events.push(Event::Start {
            id,
            position: position_secs,
        });
        Ok(id)
    }

    fn stop(&self, instance: InstanceId) {
        let mut state = self.state();
        state.live.remove(&instance);
        state.events.push(Event::Stop(instance));
    }

    fn drain_ended(&self) -> Vec<InstanceId> {
        std::mem::take(&mut self.state().ended)
    }
}
