//! Delivery event bus: trait for emitting impressions and clicks.
//!
//! The serving path accepts an `Arc<dyn EventSink>` and emits a
//! [`DeliveryEvent`] per served ad. Aggregation into impressions, clicks, and
//! CTR happens downstream; sinks only hand events off.

use crate::types::{ClickRecord, DeliveryEvent, SelectionRecord};
use std::sync::{Arc, Mutex};

/// Trait for emitting delivery events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DeliveryEvent);
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<DeliveryEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<DeliveryEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn impressions(&self) -> Vec<SelectionRecord> {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter_map(|e| match e {
                DeliveryEvent::Impression(r) => Some(r.clone()),
                DeliveryEvent::Click(_) => None,
            })
            .collect()
    }

    pub fn clicks(&self) -> Vec<ClickRecord> {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter_map(|e| match e {
                DeliveryEvent::Click(c) => Some(c.clone()),
                DeliveryEvent::Impression(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().expect("event bus mutex poisoned").clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: DeliveryEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::signals::SignalContext;
    use chrono::Utc;
    use uuid::Uuid;

    fn impression(campaign_id: Uuid) -> DeliveryEvent {
        DeliveryEvent::Impression(SelectionRecord {
            event_id: Uuid::new_v4(),
            campaign_id,
            variant_id: Uuid::new_v4(),
            matched_rule_id: None,
            timestamp: Utc::now(),
            signals: SignalContext::new(),
        })
    }

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        let campaign = Uuid::new_v4();
        sink.emit(impression(campaign));
        sink.emit(DeliveryEvent::Click(ClickRecord {
            event_id: Uuid::new_v4(),
            campaign_id: campaign,
            variant_id: Uuid::new_v4(),
            url: Some("https://shop.example".into()),
            timestamp: Utc::now(),
        }));

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.impressions().len(), 1);
        assert_eq!(sink.clicks().len(), 1);
        assert_eq!(sink.events()[0].campaign_id(), campaign);

        sink.clear();
        assert_eq!(sink.count(), 0);
    }
}
