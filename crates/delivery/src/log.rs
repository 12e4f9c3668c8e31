//! Sink that writes notifications to the log.

use async_trait::async_trait;
use events::{DeliveryError, DeliverySink, OutboundMessage};
use tracing::info;

/// Emits each notification as a structured `tracing` event.
///
/// Useful for local runs and as the default when no destination is
/// configured. Suppressed notifications are logged too, without text.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    room: Option<String>,
}

impl LogSink {
    pub fn new(room: Option<String>) -> Self {
        Self { room }
    }
}

#[async_trait]
impl DeliverySink for LogSink {
    async fn deliver(&self, message: OutboundMessage) -> Result<(), DeliveryError> {
        let deliveries: Vec<&str> = message.delivery_ids.iter().map(|d| d.as_str()).collect();
        info!(
            target: "hookrelay::notification",
            notification_id = %message.id,
            room = self.room.as_deref().unwrap_or("-"),
            event_type = %message.event_type,
            template = %message.template_id,
            suppressed = message.suppressed,
            deliveries = ?deliveries,
            text = message.text.as_deref().unwrap_or(""),
            "Notification"
        );
        Ok(())
    }
}
