//! Composite event builder and bucket admission rules.
//!
//! [`build`] turns the buffered run of one bucket into a single
//! [`CompositeEvent`], or reports that the run nets out to nothing.
//! [`admit`] decides how an incoming event interacts with an open bucket.
//! Both are pure; the window manager owns all state.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::{
    Action, AggregationClass, BucketKey, DeliveryId, EventType, Label, Milestone,
    NormalizedEvent,
};

// ---------------------------------------------------------------------------
// Composite events
// ---------------------------------------------------------------------------

/// Derived fields of a composite, by aggregation class.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeKind {
    /// Net label changes over the window. Both lists sorted by name.
    LabelAggregate {
        added: Vec<Label>,
        removed: Vec<Label>,
    },
    /// Milestone before the first and after the last buffered event.
    MilestoneChanged {
        from: Option<Milestone>,
        to: Option<Milestone>,
    },
    /// A comment, and whether its author closed or reopened the issue
    /// around it.
    CommentState { closed: bool, reopened: bool },
    /// A newly-opened subject, with `labeled` events it absorbed.
    Opened { absorbed_labels: Vec<Label> },
    /// A single buffered event that found nothing to combine with.
    Passthrough,
}

/// A synthetic event summarising one flushed bucket.
///
/// Built once at flush time, consumed once by render dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeEvent {
    /// The bucket this was built from.
    pub key: BucketKey,

    /// The event whose entities (issue, comment, repository, sender) the
    /// notification describes.
    pub primary: NormalizedEvent,

    /// Class-specific derived fields.
    pub kind: CompositeKind,

    /// Every delivery summarised, in arrival order.
    pub delivery_ids: Vec<DeliveryId>,
}

impl CompositeEvent {
    /// The action the notification renders: synthetic for label and
    /// milestone aggregates, otherwise the primary event's own action.
    pub fn action(&self) -> Option<Action> {
        match self.kind {
            CompositeKind::LabelAggregate { .. } => Some(Action::LabelAggregate),
            CompositeKind::MilestoneChanged { .. } => Some(Action::MilestoneChanged),
            _ => self.primary.action.clone(),
        }
    }

    /// Event type of the primary event.
    pub fn event_type(&self) -> EventType {
        self.primary.event_type
    }

    /// The derived fields as a render-context value, or `None` for
    /// [`CompositeKind::Passthrough`].
    pub fn aggregation_fields(&self) -> Option<Value> {
        match &self.kind {
            CompositeKind::LabelAggregate { added, removed } => Some(json!({
                "added_labels": added,
                "removed_labels": removed,
            })),
            CompositeKind::MilestoneChanged { from, to } => Some(json!({
                "from": from,
                "to": to,
            })),
            CompositeKind::CommentState { closed, reopened } => Some(json!({
                "closed": closed,
                "reopened": reopened,
            })),
            CompositeKind::Opened { absorbed_labels } => Some(json!({
                "absorbed_labels": absorbed_labels,
            })),
            CompositeKind::Passthrough => None,
        }
    }
}

/// Result of building a flushed bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum Composition {
    /// A notification should be produced.
    Built(CompositeEvent),
    /// The run nets out to nothing; no message is produced.
    Suppressed {
        key: BucketKey,
        delivery_ids: Vec<DeliveryId>,
    },
}

impl Composition {
    /// The bucket this composition was built from.
    pub fn key(&self) -> &BucketKey {
        match self {
            Self::Built(composite) => &composite.key,
            Self::Suppressed { key, .. } => key,
        }
    }
}

/// Builds the composite for one bucket's buffered run.
///
/// `events` must be in arrival order; later events overwrite earlier derived
/// state (e.g. the milestone `to` value).
pub fn build(key: BucketKey, events: &[NormalizedEvent]) -> Composition {
    let delivery_ids: Vec<DeliveryId> = events.iter().map(|e| e.delivery_id.clone()).collect();
    let (Some(first), Some(last)) = (events.first(), events.last()) else {
        return Composition::Suppressed { key, delivery_ids };
    };

    let (primary, kind) = match key.class {
        AggregationClass::Label => {
            let (added, removed) = net_label_changes(events);
            if added.is_empty() && removed.is_empty() {
                return Composition::Suppressed { key, delivery_ids };
            }
            (last, CompositeKind::LabelAggregate { added, removed })
        }
        AggregationClass::Milestone => {
            let from = milestone_before(first);
            let to = milestone_after(last);
            if Milestone::same(from.as_ref(), to.as_ref()) {
                return Composition::Suppressed { key, delivery_ids };
            }
            (last, CompositeKind::MilestoneChanged { from, to })
        }
        AggregationClass::IssueCommentState => {
            let comment = events.iter().find(|e| e.event_type == EventType::IssueComment);
            let state = events.iter().find(|e| e.event_type == EventType::Issues);
            match comment {
                Some(comment) => (
                    comment,
                    CompositeKind::CommentState {
                        closed: state.is_some_and(|s| s.is(&Action::Closed)),
                        reopened: state.is_some_and(|s| s.is(&Action::Reopened)),
                    },
                ),
                None => (first, CompositeKind::Passthrough),
            }
        }
        AggregationClass::Opened => {
            let absorbed_labels = events
                .iter()
                .skip(1)
                .filter_map(|e| e.facts.label.clone())
                .collect();
            (first, CompositeKind::Opened { absorbed_labels })
        }
        AggregationClass::None => (first, CompositeKind::Passthrough),
    };

    Composition::Built(CompositeEvent {
        key,
        primary: primary.clone(),
        kind,
        delivery_ids,
    })
}

/// Replays the run over the label set present before the window.
///
/// The initial set is taken from the first event's subject labels with that
/// event's own change undone. Returns `(added, removed)` as the set
/// differences between the final and initial sets.
fn net_label_changes(events: &[NormalizedEvent]) -> (Vec<Label>, Vec<Label>) {
    let mut initial: BTreeMap<String, Label> = BTreeMap::new();
    if let Some(first) = events.first() {
        initial.extend(
            first
                .facts
                .subject_labels
                .iter()
                .map(|l| (l.name.clone(), l.clone())),
        );
        if let Some(label) = &first.facts.label {
            if first.is(&Action::Labeled) {
                initial.remove(&label.name);
            } else if first.is(&Action::Unlabeled) {
                initial.insert(label.name.clone(), label.clone());
            }
        }
    }

    let mut current = initial.clone();
    for event in events {
        let Some(label) = &event.facts.label else {
            continue;
        };
        if event.is(&Action::Labeled) {
            current.insert(label.name.clone(), label.clone());
        } else if event.is(&Action::Unlabeled) {
            current.remove(&label.name);
        }
    }

    let added = current
        .iter()
        .filter(|(name, _)| !initial.contains_key(*name))
        .map(|(_, l)| l.clone())
        .collect();
    let removed = initial
        .iter()
        .filter(|(name, _)| !current.contains_key(*name))
        .map(|(_, l)| l.clone())
        .collect();
    (added, removed)
}

fn milestone_before(event: &NormalizedEvent) -> Option<Milestone> {
    if event.is(&Action::Demilestoned) {
        event.facts.milestone.clone()
    } else {
        None
    }
}

fn milestone_after(event: &NormalizedEvent) -> Option<Milestone> {
    if event.is(&Action::Milestoned) {
        event.facts.milestone.clone()
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// How an incoming event joins an open, not-yet-expired bucket of its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Append and keep waiting for the deadline.
    Append,
    /// Append; the bucket can take nothing further and flushes now.
    Complete,
    /// The bucket is closed by this event: flush it as-is now and open a
    /// fresh bucket for the incoming event.
    Terminate,
}

/// Decides how `incoming` joins a bucket of `class` already holding `buffered`.
pub fn admit(
    class: AggregationClass,
    buffered: &[NormalizedEvent],
    incoming: &NormalizedEvent,
) -> Admission {
    match class {
        AggregationClass::Label | AggregationClass::Milestone => Admission::Append,
        AggregationClass::IssueCommentState => {
            let is_comment = |e: &NormalizedEvent| e.event_type == EventType::IssueComment;
            let same_kind = buffered.iter().any(|e| is_comment(e) == is_comment(incoming));
            if same_kind {
                Admission::Terminate
            } else {
                Admission::Complete
            }
        }
        AggregationClass::Opened | AggregationClass::None => Admission::Terminate,
    }
}

/// Returns `true` if `incoming` is a `labeled` event for a label the subject
/// of the open `opened` bucket was created with.
pub fn absorbs_label(opened: &[NormalizedEvent], incoming: &NormalizedEvent) -> bool {
    let (Some(origin), Some(label)) = (opened.first(), &incoming.facts.label) else {
        return false;
    };
    incoming.is(&Action::Labeled)
        && origin
            .facts
            .subject_labels
            .iter()
            .any(|l| l.name == label.name)
}
