//! The internal event model.
//!
//! [`EventType`] and [`Action`] are closed tagged variants so that every
//! mapping over them (aggregation rules, template selection) is checked for
//! exhaustiveness by the compiler. Actions the provider adds later are kept
//! verbatim in [`Action::Other`] rather than rejected.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    CommentId, DeliveryId, IssueNumber, Label, Milestone, NormalizeError, RepositoryName,
    SubjectKey, Timestamp, UserId,
};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// The webhook event types this system handles (`X-GitHub-Event`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CommitComment,
    Create,
    Delete,
    Fork,
    /// Wiki page edits.
    Gollum,
    IssueComment,
    Issues,
    Label,
    Member,
    /// Webhook lifecycle notifications (e.g. the hook itself was deleted).
    Meta,
    Milestone,
    /// Sent once when a webhook is created.
    Ping,
    Public,
    PullRequest,
    PullRequestReview,
    PullRequestReviewComment,
    Push,
    Release,
    /// Repository metadata changes (renamed, transferred, archived, ...).
    Repository,
    Star,
    Watch,
}

impl EventType {
    /// Every handled event type, in wire-name order.
    pub const ALL: [EventType; 21] = [
        Self::CommitComment,
        Self::Create,
        Self::Delete,
        Self::Fork,
        Self::Gollum,
        Self::IssueComment,
        Self::Issues,
        Self::Label,
        Self::Member,
        Self::Meta,
        Self::Milestone,
        Self::Ping,
        Self::Public,
        Self::PullRequest,
        Self::PullRequestReview,
        Self::PullRequestReviewComment,
        Self::Push,
        Self::Release,
        Self::Repository,
        Self::Star,
        Self::Watch,
    ];

    /// Returns the wire name, e.g. `"issue_comment"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CommitComment => "commit_comment",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Fork => "fork",
            Self::Gollum => "gollum",
            Self::IssueComment => "issue_comment",
            Self::Issues => "issues",
            Self::Label => "label",
            Self::Member => "member",
            Self::Meta => "meta",
            Self::Milestone => "milestone",
            Self::Ping => "ping",
            Self::Public => "public",
            Self::PullRequest => "pull_request",
            Self::PullRequestReview => "pull_request_review",
            Self::PullRequestReviewComment => "pull_request_review_comment",
            Self::Push => "push",
            Self::Release => "release",
            Self::Repository => "repository",
            Self::Star => "star",
            Self::Watch => "watch",
        }
    }

    /// Returns `true` for event types whose subject is an issue or pull request.
    pub fn has_issue_subject(self) -> bool {
        matches!(
            self,
            Self::Issues
                | Self::IssueComment
                | Self::PullRequest
                | Self::PullRequestReview
                | Self::PullRequestReviewComment
        )
    }
}

impl FromStr for EventType {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| NormalizeError::UnknownEventType {
                event_type: s.to_string(),
            })
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// The `action` of an event: one variant per raw provider action, plus one per
/// synthetic action produced by aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Added,
    Archived,
    Assigned,
    Closed,
    ConvertedToDraft,
    Created,
    Deleted,
    Demilestoned,
    Dismissed,
    Edited,
    Labeled,
    Locked,
    Merged,
    Milestoned,
    Opened,
    Pinned,
    Prereleased,
    Privatized,
    Publicized,
    Published,
    ReadyForReview,
    Released,
    Removed,
    Renamed,
    Reopened,
    ReviewRequestRemoved,
    ReviewRequested,
    Started,
    Submitted,
    Synchronize,
    Transferred,
    Unarchived,
    Unassigned,
    Unlabeled,
    Unlocked,
    Unpinned,
    Unpublished,

    /// Synthetic: a run of `labeled`/`unlabeled` events collapsed into one.
    LabelAggregate,
    /// Synthetic: a `demilestoned`/`milestoned` run collapsed into one change.
    MilestoneChanged,

    /// An action string this system does not know (yet).
    Other(String),
}

impl Action {
    const KNOWN: [Action; 39] = [
        Self::Added,
        Self::Archived,
        Self::Assigned,
        Self::Closed,
        Self::ConvertedToDraft,
        Self::Created,
        Self::Deleted,
        Self::Demilestoned,
        Self::Dismissed,
        Self::Edited,
        Self::Labeled,
        Self::Locked,
        Self::Merged,
        Self::Milestoned,
        Self::Opened,
        Self::Pinned,
        Self::Prereleased,
        Self::Privatized,
        Self::Publicized,
        Self::Published,
        Self::ReadyForReview,
        Self::Released,
        Self::Removed,
        Self::Renamed,
        Self::Reopened,
        Self::ReviewRequestRemoved,
        Self::ReviewRequested,
        Self::Started,
        Self::Submitted,
        Self::Synchronize,
        Self::Transferred,
        Self::Unarchived,
        Self::Unassigned,
        Self::Unlabeled,
        Self::Unlocked,
        Self::Unpinned,
        Self::Unpublished,
        Self::LabelAggregate,
        Self::MilestoneChanged,
    ];

    /// Parses a provider action string. Never fails: unknown strings become
    /// [`Action::Other`].
    pub fn parse(s: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|a| a.as_str() == s)
            .cloned()
            .unwrap_or_else(|| Self::Other(s.to_string()))
    }

    /// Returns the wire name, e.g. `"review_requested"`.
    ///
    /// Synthetic actions carry an `x_` prefix so they can never collide with
    /// a provider action.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Added => "added",
            Self::Archived => "archived",
            Self::Assigned => "assigned",
            Self::Closed => "closed",
            Self::ConvertedToDraft => "converted_to_draft",
            Self::Created => "created",
            Self::Deleted => "deleted",
            Self::Demilestoned => "demilestoned",
            Self::Dismissed => "dismissed",
            Self::Edited => "edited",
            Self::Labeled => "labeled",
            Self::Locked => "locked",
            Self::Merged => "merged",
            Self::Milestoned => "milestoned",
            Self::Opened => "opened",
            Self::Pinned => "pinned",
            Self::Prereleased => "prereleased",
            Self::Privatized => "privatized",
            Self::Publicized => "publicized",
            Self::Published => "published",
            Self::ReadyForReview => "ready_for_review",
            Self::Released => "released",
            Self::Removed => "removed",
            Self::Renamed => "renamed",
            Self::Reopened => "reopened",
            Self::ReviewRequestRemoved => "review_request_removed",
            Self::ReviewRequested => "review_requested",
            Self::Started => "started",
            Self::Submitted => "submitted",
            Self::Synchronize => "synchronize",
            Self::Transferred => "transferred",
            Self::Unarchived => "unarchived",
            Self::Unassigned => "unassigned",
            Self::Unlabeled => "unlabeled",
            Self::Unlocked => "unlocked",
            Self::Unpinned => "unpinned",
            Self::Unpublished => "unpublished",
            Self::LabelAggregate => "x_label_aggregate",
            Self::MilestoneChanged => "x_milestone_changed",
            Self::Other(s) => s,
        }
    }

    /// Returns `true` for actions produced by aggregation rather than the provider.
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::LabelAggregate | Self::MilestoneChanged)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Normalized event
// ---------------------------------------------------------------------------

/// Typed facts extracted from the payload during normalisation.
///
/// Only what aggregation needs is extracted; everything else stays in
/// [`NormalizedEvent::raw`] for rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFacts {
    /// Issue or pull-request number, for events whose subject is one.
    pub issue_number: Option<IssueNumber>,

    /// The label a `labeled`/`unlabeled` event is about.
    pub label: Option<Label>,

    /// The milestone a `milestoned`/`demilestoned` event is about.
    pub milestone: Option<Milestone>,

    /// Labels on the issue or pull request as reported in this payload.
    pub subject_labels: Vec<Label>,

    /// The comment an `issue_comment` event is about.
    pub comment_id: Option<CommentId>,
}

/// One inbound webhook event in provider-independent form.
///
/// Immutable once created; aggregation only ever moves or clones it.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    /// What kind of event this is.
    pub event_type: EventType,

    /// The event's action, for event types that carry one.
    pub action: Option<Action>,

    /// The identity related events share (e.g. `"owner/repo#42"`).
    pub subject_key: SubjectKey,

    /// Repository the event belongs to.
    pub repo_id: RepositoryName,

    /// When the event was received.
    pub occurred_at: Timestamp,

    /// Account that triggered the event. Absent only for `ping`.
    pub sender_id: Option<UserId>,

    /// Provider delivery id; the idempotency key within a bucket.
    pub delivery_id: DeliveryId,

    /// Typed facts used by aggregation.
    pub facts: EventFacts,

    /// The provider payload (with computed fallbacks applied).
    pub raw: Value,
}

impl NormalizedEvent {
    /// Returns `true` if this event has the given action.
    pub fn is(&self, action: &Action) -> bool {
        self.action.as_ref() == Some(action)
    }

    /// Returns the action's wire name, or `""` for action-less event types.
    pub fn action_str(&self) -> &str {
        self.action.as_ref().map_or("", Action::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trips_through_wire_name() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
    }

    #[test]
    fn unknown_event_type_is_reported_not_panicked() {
        let err = "sponsorship".parse::<EventType>().unwrap_err();
        assert!(matches!(err, NormalizeError::UnknownEventType { .. }));
    }

    #[test]
    fn unknown_action_is_preserved() {
        let action = Action::parse("auto_merge_enabled");
        assert_eq!(action, Action::Other("auto_merge_enabled".into()));
        assert_eq!(action.as_str(), "auto_merge_enabled");
    }

    #[test]
    fn known_actions_parse_to_their_variant() {
        assert_eq!(Action::parse("review_requested"), Action::ReviewRequested);
        assert_eq!(Action::parse("labeled"), Action::Labeled);
        assert!(Action::parse("x_label_aggregate").is_synthetic());
    }

    #[test]
    fn serde_name_matches_wire_name() {
        let json = serde_json::to_value(EventType::PullRequestReviewComment).unwrap();
        assert_eq!(json, "pull_request_review_comment");
    }
}
