//! Template selection and suppression.

use events::{
    Action, CompositeEvent, DeliveryId, EventType, NormalizedEvent, RelaySettings, RenderContext,
    TemplateId, TemplateSettings,
};
use serde_json::Value;

use crate::context;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Something render dispatch can turn into a notification.
#[derive(Debug, Clone, Copy)]
pub enum Renderable<'a> {
    /// An event that was never buffered.
    Raw(&'a NormalizedEvent),
    /// The result of a bucket flush.
    Composite(&'a CompositeEvent),
}

impl<'a> Renderable<'a> {
    /// The event whose entities the notification describes.
    pub fn primary(&self) -> &'a NormalizedEvent {
        match self {
            Self::Raw(event) => event,
            Self::Composite(composite) => &composite.primary,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.primary().event_type
    }

    /// Synthetic action for label and milestone composites, otherwise the
    /// primary event's action.
    pub fn action(&self) -> Option<Action> {
        match self {
            Self::Raw(event) => event.action.clone(),
            Self::Composite(composite) => composite.action(),
        }
    }

    pub fn delivery_ids(&self) -> Vec<DeliveryId> {
        match self {
            Self::Raw(event) => vec![event.delivery_id.clone()],
            Self::Composite(composite) => composite.delivery_ids.clone(),
        }
    }

    pub fn aggregation_fields(&self) -> Option<Value> {
        match self {
            Self::Raw(_) => None,
            Self::Composite(composite) => composite.aggregation_fields(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A notification ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub template_id: TemplateId,
    pub context: RenderContext,
    pub event_type: EventType,
    pub delivery_ids: Vec<DeliveryId>,
}

/// The dispatch decision for one renderable.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Render the notification and deliver the text.
    Render(Notification),
    /// Deliver as intentionally silent; never rendered.
    Suppress(Notification),
}

impl Dispatch {
    pub fn notification(&self) -> &Notification {
        match self {
            Self::Render(n) | Self::Suppress(n) => n,
        }
    }

    pub fn into_notification(self) -> Notification {
        match self {
            Self::Render(n) | Self::Suppress(n) => n,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppress(_))
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Maps raw and composite events to templates and render contexts.
#[derive(Debug, Clone)]
pub struct RenderDispatch {
    templates: TemplateSettings,
    aggregation_enabled: bool,
}

impl RenderDispatch {
    pub fn new(settings: &RelaySettings) -> Self {
        Self {
            templates: settings.templates.clone(),
            aggregation_enabled: settings.window.is_enabled(),
        }
    }

    /// Chooses the template for `item`, builds its context, and decides
    /// whether the notification is suppressed.
    pub fn dispatch(&self, item: Renderable<'_>) -> Dispatch {
        let event_type = item.event_type();
        let action = item.action();

        let template_id = self
            .templates
            .resolve(default_template(event_type, action.as_ref()));
        let notification = Notification {
            context: context::build(&item, &template_id),
            template_id,
            event_type,
            delivery_ids: item.delivery_ids(),
        };

        if self.suppresses(&item, event_type, action.as_ref()) {
            Dispatch::Suppress(notification)
        } else {
            Dispatch::Render(notification)
        }
    }

    fn suppresses(&self, item: &Renderable<'_>, event_type: EventType, action: Option<&Action>) -> bool {
        if matches!(event_type, EventType::Ping | EventType::Meta) {
            return true;
        }
        if self.templates.is_disabled(event_type) {
            return true;
        }
        let superseded = matches!(
            action,
            Some(Action::Labeled | Action::Unlabeled | Action::Milestoned | Action::Demilestoned)
        );
        if self.aggregation_enabled
            && superseded
            && matches!(item, Renderable::Raw(_))
            && matches!(event_type, EventType::Issues | EventType::PullRequest)
        {
            return true;
        }
        event_type == EventType::Star && action == Some(&Action::Deleted)
    }
}

/// Default template id before configured overrides are applied.
///
/// Action-less event types use their own name; a known action uses
/// `"<type>/<action>"`; anything else falls back to the generic template.
pub fn default_template(event_type: EventType, action: Option<&Action>) -> TemplateId {
    match action {
        None => TemplateId::for_event(event_type, None),
        Some(action) if has_template(event_type, action) => {
            TemplateId::for_event(event_type, Some(action))
        }
        Some(_) => TemplateId::generic(),
    }
}

/// Returns `true` when a dedicated template exists for the pair.
fn has_template(event_type: EventType, action: &Action) -> bool {
    use Action::*;

    match event_type {
        EventType::CommitComment => matches!(action, Created),
        EventType::IssueComment | EventType::PullRequestReviewComment | EventType::Label => {
            matches!(action, Created | Edited | Deleted)
        }
        EventType::Issues => matches!(
            action,
            Opened
                | Edited
                | Deleted
                | Closed
                | Reopened
                | Assigned
                | Unassigned
                | Labeled
                | Unlabeled
                | Milestoned
                | Demilestoned
                | Locked
                | Unlocked
                | Pinned
                | Unpinned
                | Transferred
                | LabelAggregate
                | MilestoneChanged
        ),
        EventType::PullRequest => matches!(
            action,
            Opened
                | Edited
                | Closed
                | Reopened
                | Assigned
                | Unassigned
                | Labeled
                | Unlabeled
                | Milestoned
                | Demilestoned
                | Synchronize
                | ReadyForReview
                | ConvertedToDraft
                | ReviewRequested
                | ReviewRequestRemoved
                | Locked
                | Unlocked
                | LabelAggregate
                | MilestoneChanged
        ),
        EventType::PullRequestReview => matches!(action, Submitted | Edited | Dismissed),
        EventType::Member => matches!(action, Added | Removed | Edited),
        EventType::Meta => matches!(action, Deleted),
        EventType::Milestone => matches!(action, Created | Edited | Deleted | Opened | Closed),
        EventType::Release => matches!(
            action,
            Published | Unpublished | Created | Edited | Deleted | Prereleased | Released
        ),
        EventType::Repository => matches!(
            action,
            Created
                | Deleted
                | Archived
                | Unarchived
                | Edited
                | Renamed
                | Transferred
                | Publicized
                | Privatized
        ),
        EventType::Star => matches!(action, Created | Deleted),
        EventType::Watch => matches!(action, Started),
        EventType::Create
        | EventType::Delete
        | EventType::Fork
        | EventType::Gollum
        | EventType::Ping
        | EventType::Public
        | EventType::Push => false,
    }
}
