use std::sync::{
    mpsc::{self, Receiver, Sender},
    Mutex,
};

use crate::HacsEvent;

/// Trait for consuming events.
///
/// Each frontend provides its own implementation.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: HacsEvent);
}

/// Channel-based event sink.
///
/// The receiver end can be drained by any consumer.
pub struct ChannelSink {
    sender: Sender<HacsEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<HacsEvent>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                sender,
            },
            receiver,
        )
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: HacsEvent) {
        let _ = self.sender.send(event);
    }
}

/// No-op event sink for tests or headless operation.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: HacsEvent) {}
}

/// Stores every event for later inspection.
#[derive(Default)]
pub struct CollectorSink {
    events: Mutex<Vec<HacsEvent>>,
}

impl CollectorSink {
    pub fn events(&self) -> Vec<HacsEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventSink for CollectorSink {
    fn emit(&self, event: HacsEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
