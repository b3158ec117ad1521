//! Delivery-event logging: a non-blocking [`EventSink`](dco_core::event_bus::EventSink)
//! that batches impressions and clicks and hands them downstream as JSON lines.

pub mod logger;

pub use logger::AnalyticsLogger;
