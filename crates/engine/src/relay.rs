//! The relay pipeline: normalize → aggregate → dispatch → render → deliver.

use std::sync::Arc;

use dispatch::{RenderDispatch, Renderable};
use events::{
    normalize, Action, Composition, DeliveryError, DeliveryId, DeliverySink, EventType,
    NormalizeError, NormalizedEvent, NotificationId, OutboundMessage, RelayError, RelaySettings,
    Renderer, Timestamp,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::window::{Outcome, WindowManager};

/// What happened to one inbound delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    /// The event type is not one this relay knows; dropped silently.
    Ignored,
    /// Held for aggregation; a later flush will publish it.
    Buffered,
    /// Its bucket flushed and nets out to nothing; no notification.
    Cancelled,
    /// A notification was handed to the sink.
    Delivered(Delivered),
}

/// Receipt for a notification handed to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivered {
    pub notification_id: NotificationId,
    pub suppressed: bool,
}

/// Renders and delivers; shared by inbound handling and the flush consumer.
struct Publisher {
    dispatch: RenderDispatch,
    renderer: Arc<dyn Renderer>,
    sink: Arc<dyn DeliverySink>,
}

impl Publisher {
    async fn publish(&self, item: Renderable<'_>) -> Result<Delivered, DeliveryError> {
        let decision = self.dispatch.dispatch(item);
        let suppressed = decision.is_suppressed();
        let notification = decision.into_notification();

        let text = if suppressed {
            None
        } else {
            match self
                .renderer
                .render(&notification.template_id, &notification.context)
            {
                Ok(text) => Some(text),
                Err(err) => {
                    warn!(
                        template = %notification.template_id,
                        error = %err,
                        "Render failed; using fallback text"
                    );
                    Some(format!("{} event occurred", notification.event_type))
                }
            }
        };

        let message = OutboundMessage {
            id: NotificationId::new_random(),
            template_id: notification.template_id,
            context: notification.context,
            suppressed,
            text,
            event_type: notification.event_type,
            delivery_ids: notification.delivery_ids,
        };
        let notification_id = message.id;
        let template = message.template_id.clone();
        let deliveries = message.delivery_ids.len();

        self.sink.deliver(message).await?;
        info!(
            notification_id = %notification_id,
            template = %template,
            suppressed,
            deliveries,
            "Notification delivered"
        );
        Ok(Delivered {
            notification_id,
            suppressed,
        })
    }

    async fn publish_flush(&self, composition: Composition) {
        match composition {
            Composition::Built(composite) => {
                if let Err(err) = self.publish(Renderable::Composite(&composite)).await {
                    error!(bucket = %composite.key, error = %err, "Flushed composite not delivered");
                }
            }
            Composition::Suppressed { key, delivery_ids } => {
                debug!(bucket = %key, deliveries = delivery_ids.len(), "Flush nets to nothing");
            }
        }
    }
}

/// The relay core.
///
/// Owns the window manager and a background task consuming timer-driven
/// flushes. Create it inside a Tokio runtime and call
/// [`shutdown`](Self::shutdown) before exit so open buckets are delivered.
pub struct Relay {
    windows: WindowManager,
    publisher: Arc<Publisher>,
    cancel: CancellationToken,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl Relay {
    pub fn new(
        settings: &RelaySettings,
        renderer: Arc<dyn Renderer>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        let (windows, flushes) = WindowManager::new(settings.window);
        let publisher = Arc::new(Publisher {
            dispatch: RenderDispatch::new(settings),
            renderer,
            sink,
        });
        let cancel = CancellationToken::new();
        let consumer = tokio::spawn(consume_flushes(
            Arc::clone(&publisher),
            flushes,
            cancel.clone(),
        ));
        Self {
            windows,
            publisher,
            cancel,
            consumer: Mutex::new(Some(consumer)),
        }
    }

    /// Processes one inbound webhook delivery.
    ///
    /// # Errors
    ///
    /// [`RelayError::Normalize`] for a malformed payload (the event is
    /// dropped) and [`RelayError::Delivery`] when the sink rejects an
    /// immediately-rendered notification. Unknown event types are not errors.
    #[instrument(skip(self, delivery_id, payload), fields(delivery_id = %delivery_id))]
    pub async fn handle(
        &self,
        event_type: &str,
        delivery_id: DeliveryId,
        payload: Value,
    ) -> Result<Handled, RelayError> {
        let event = match normalize(event_type, delivery_id, Timestamp::now(), payload) {
            Ok(event) => event,
            Err(NormalizeError::UnknownEventType { .. }) => {
                debug!("Ignoring unknown event type");
                return Ok(Handled::Ignored);
            }
            Err(err) => {
                warn!(error = %err, "Dropping malformed payload");
                return Err(err.into());
            }
        };
        log_lifecycle(&event);

        let delivered = match self.windows.submit(event) {
            Outcome::RenderNow(event) => self.publisher.publish(Renderable::Raw(&event)).await,
            Outcome::Flushed(composite) => {
                self.publisher
                    .publish(Renderable::Composite(&composite))
                    .await
            }
            Outcome::Buffered => return Ok(Handled::Buffered),
            Outcome::Suppressed => return Ok(Handled::Cancelled),
        };
        match delivered {
            Ok(receipt) => Ok(Handled::Delivered(receipt)),
            Err(err) => {
                error!(error = %err, "Notification not delivered");
                Err(err.into())
            }
        }
    }

    /// Flushes every open bucket and waits until the flushes are delivered.
    ///
    /// Later calls to [`handle`](Self::handle) still work but never buffer.
    pub async fn shutdown(&self) {
        let drained = self.windows.drain();
        self.cancel.cancel();
        let consumer = self.consumer.lock().take();
        if let Some(consumer) = consumer {
            if let Err(err) = consumer.await {
                error!(error = %err, "Flush consumer ended abnormally");
            }
        }
        info!(drained, "Relay shut down");
    }

    pub fn windows(&self) -> &WindowManager {
        &self.windows
    }
}

async fn consume_flushes(
    publisher: Arc<Publisher>,
    mut flushes: mpsc::UnboundedReceiver<Composition>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            Some(composition) = flushes.recv() => publisher.publish_flush(composition).await,
            _ = cancel.cancelled() => {
                while let Ok(composition) = flushes.try_recv() {
                    publisher.publish_flush(composition).await;
                }
                break;
            }
        }
    }
    debug!("Flush consumer stopped");
}

/// Webhook and repository lifecycle signals worth an operator's attention.
fn log_lifecycle(event: &NormalizedEvent) {
    match (event.event_type, event.action.as_ref()) {
        (EventType::Ping, _) => info!(repository = %event.repo_id, "Webhook ping received"),
        (EventType::Meta, Some(Action::Deleted)) => {
            warn!(repository = %event.repo_id, "Webhook deleted at the provider")
        }
        (
            EventType::Repository,
            Some(action @ (Action::Renamed | Action::Transferred | Action::Deleted)),
        ) => info!(
            repository = %event.repo_id,
            action = %action,
            "Repository lifecycle change; subscriptions may need updating"
        ),
        _ => {}
    }
}
