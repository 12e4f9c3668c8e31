//! Port traits for the relay's external collaborators.
//!
//! The template engine and the chat client live outside this workspace's
//! core. They are reached only through [`Renderer`] and [`DeliverySink`];
//! infrastructure crates provide the implementations.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{DeliveryError, DeliveryId, EventType, NotificationId, RenderError, TemplateId};

/// Variables handed to a template.
pub type RenderContext = Map<String, Value>;

/// Turns a template id and its context into marked-up text.
pub trait Renderer: Send + Sync {
    /// Renders `template` with `context`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] when the template is unknown or references a
    /// variable the context lacks.
    fn render(&self, template: &TemplateId, context: &RenderContext) -> Result<String, RenderError>;
}

/// One logical notification as handed to the [`DeliverySink`].
///
/// The relay makes at most one `deliver` call per composite flush and at most
/// one per immediately-rendered event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    /// Unique id of this notification.
    pub id: NotificationId,

    /// Template selected by render dispatch.
    pub template_id: TemplateId,

    /// Variables the template was (or would have been) rendered with.
    pub context: RenderContext,

    /// `true` when dispatch decided this notification is intentionally silent.
    ///
    /// Distinct from `text == Some("")`, which means the template rendered
    /// to nothing.
    pub suppressed: bool,

    /// Rendered text; `None` exactly when `suppressed` is `true`.
    pub text: Option<String>,

    /// Event type the notification describes.
    pub event_type: EventType,

    /// Provider deliveries summarised by this notification.
    pub delivery_ids: Vec<DeliveryId>,
}

/// Posts finished notifications to their destination.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Delivers one notification.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] when the destination rejects the message or
    /// cannot be reached.
    async fn deliver(&self, message: OutboundMessage) -> Result<(), DeliveryError>;
}
