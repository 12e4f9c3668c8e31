//! [`DeliverySink`](events::DeliverySink) implementations.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Each sink adapts the delivery port to one destination.
//! Retry decisions come from [`DeliveryError::retry_policy`](events::DeliveryError::retry_policy);
//! sinks never interpret notification content.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`log`] | `LogSink`: one structured `tracing` event per notification |
//! | [`http`] | `HttpSink`: JSON POST with bounded retries |

pub mod http;
pub mod log;

pub use http::{HttpSink, HttpSinkConfig};
pub use log::LogSink;
