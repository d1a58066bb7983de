use std::{cell::RefCell, rc::Rc};

use serde::Serialize;

use crate::host::SoundBroadcaster;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SoundEvent {
    pub sound: String,
    pub distance_threshold: f32,
    pub volume: f32,
}

#[derive(Clone, Default)]
pub struct RecordingSoundBroadcaster {
    events: Rc<RefCell<Vec<SoundEvent>>>,
}

impl RecordingSoundBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SoundEvent> {
        self.events.borrow().clone()
    }
}

impl SoundBroadcaster for RecordingSoundBroadcaster {
    fn play_within_distance(&self, sound: &str, distance_threshold: f32, volume: f32) {
        self.events.borrow_mut().push(SoundEvent {
            sound: sound.to_string(),
            distance_threshold,
            volume,
        });
    }
}

/// Forwards every broadcast to each sink in order.
#[derive(Clone, Default)]
pub struct BroadcastFanout {
    sinks: Vec<Rc<dyn SoundBroadcaster>>,
}

impl BroadcastFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Rc<dyn SoundBroadcaster>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl SoundBroadcaster for BroadcastFanout {
    fn play_within_distance(&self, sound: &str, distance_threshold: f32, volume: f32) {
        for sink in &self.sinks {
            sink.play_within_distance(sound, distance_threshold, volume);
        }
    }
}
