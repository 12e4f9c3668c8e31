//! Aggregation key resolver.
//!
//! Maps a [`NormalizedEvent`] to the bucket it may share with related events.
//! Pure and stateless; it never looks at the bucket index.

use serde::{Deserialize, Serialize};

use crate::{Action, EventType, NormalizedEvent, SubjectKey};

/// Which raw actions combine with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationClass {
    /// Render immediately; never buffered.
    None,
    /// `labeled`/`unlabeled` on one issue or pull request.
    Label,
    /// `milestoned`/`demilestoned` on one issue or pull request.
    Milestone,
    /// A comment and a close/reopen by the same account on one issue.
    IssueCommentState,
    /// A newly-opened issue or pull request, absorbing `labeled` events for
    /// labels it was opened with.
    Opened,
}

impl AggregationClass {
    /// Returns `true` unless events of this class render immediately.
    pub fn is_combinable(self) -> bool {
        self != Self::None
    }

    /// Short lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Label => "label",
            Self::Milestone => "milestone",
            Self::IssueCommentState => "issue_comment_state",
            Self::Opened => "opened",
        }
    }
}

impl std::fmt::Display for AggregationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------

/// Index key of an aggregation bucket.
///
/// At most one open bucket exists per key at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    /// Shared subject of the buffered events.
    pub subject_key: SubjectKey,
    /// Combination rules that apply.
    pub class: AggregationClass,
}

impl BucketKey {
    /// Creates a bucket key.
    pub fn new(subject_key: SubjectKey, class: AggregationClass) -> Self {
        Self { subject_key, class }
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.subject_key, self.class)
    }
}

// ---------------------------------------------------------------------------

/// Computes the bucket key for `event`.
///
/// Rules by event type and action:
///
/// | Event | Class | Subject |
/// |-------|-------|---------|
/// | issue/PR `labeled`, `unlabeled` | [`Label`](AggregationClass::Label) | `repo#number` |
/// | issue/PR `milestoned`, `demilestoned` | [`Milestone`](AggregationClass::Milestone) | `repo#number` |
/// | `issue_comment` `created`, `issues` `closed`/`reopened` | [`IssueCommentState`](AggregationClass::IssueCommentState) | `repo#number~sender` |
/// | issue/PR `opened` | [`Opened`](AggregationClass::Opened) | `repo#number` |
/// | anything else | [`None`](AggregationClass::None) | the event's own subject |
///
/// The comment/state subject includes the sender because only one account's
/// comment and close/reopen belong together; the comment id cannot be part of
/// it since the close/reopen event does not carry one.
pub fn resolve(event: &NormalizedEvent) -> BucketKey {
    let class = classify(event);
    let subject_key = match (class, event.sender_id) {
        (AggregationClass::IssueCommentState, Some(sender)) => {
            SubjectKey::new(format!("{}~{sender}", event.subject_key))
                .unwrap_or_else(|| event.subject_key.clone())
        }
        _ => event.subject_key.clone(),
    };
    BucketKey::new(subject_key, class)
}

fn classify(event: &NormalizedEvent) -> AggregationClass {
    let Some(action) = &event.action else {
        return AggregationClass::None;
    };
    match (event.event_type, action) {
        (EventType::Issues | EventType::PullRequest, Action::Labeled | Action::Unlabeled) => {
            AggregationClass::Label
        }
        (
            EventType::Issues | EventType::PullRequest,
            Action::Milestoned | Action::Demilestoned,
        ) => AggregationClass::Milestone,
        (EventType::Issues | EventType::PullRequest, Action::Opened) => AggregationClass::Opened,
        (EventType::IssueComment, Action::Created)
        | (EventType::Issues, Action::Closed | Action::Reopened)
            if event.sender_id.is_some() =>
        {
            AggregationClass::IssueCommentState
        }
        _ => AggregationClass::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeliveryId, EventFacts, RepositoryName, Timestamp, UserId};

    fn event(event_type: EventType, action: Option<Action>) -> NormalizedEvent {
        NormalizedEvent {
            event_type,
            action,
            subject_key: SubjectKey::new("octo/widgets#5").unwrap(),
            repo_id: RepositoryName::new("octo/widgets").unwrap(),
            occurred_at: Timestamp::now(),
            sender_id: Some(UserId::new(3)),
            delivery_id: DeliveryId::new("d").unwrap(),
            facts: EventFacts::default(),
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn label_actions_share_the_issue_subject() {
        let key = resolve(&event(EventType::Issues, Some(Action::Unlabeled)));
        assert_eq!(key.class, AggregationClass::Label);
        assert_eq!(key.subject_key.as_str(), "octo/widgets#5");
        let pr = resolve(&event(EventType::PullRequest, Some(Action::Labeled)));
        assert_eq!(pr.class, AggregationClass::Label);
    }

    #[test]
    fn milestone_actions_resolve_to_milestone_class() {
        let key = resolve(&event(EventType::Issues, Some(Action::Demilestoned)));
        assert_eq!(key.class, AggregationClass::Milestone);
    }

    #[test]
    fn comment_and_close_share_a_sender_scoped_subject() {
        let comment = resolve(&event(EventType::IssueComment, Some(Action::Created)));
        let close = resolve(&event(EventType::Issues, Some(Action::Closed)));
        assert_eq!(comment, close);
        assert_eq!(comment.class, AggregationClass::IssueCommentState);
        assert_eq!(comment.subject_key.as_str(), "octo/widgets#5~3");
    }

    #[test]
    fn other_actions_render_immediately() {
        assert_eq!(
            resolve(&event(EventType::Issues, Some(Action::Assigned))).class,
            AggregationClass::None
        );
        assert_eq!(resolve(&event(EventType::Push, None)).class, AggregationClass::None);
        assert_eq!(
            resolve(&event(EventType::IssueComment, Some(Action::Edited))).class,
            AggregationClass::None
        );
    }

    #[test]
    fn pull_request_close_is_not_merged_with_comments() {
        let key = resolve(&event(EventType::PullRequest, Some(Action::Closed)));
        assert_eq!(key.class, AggregationClass::None);
    }
}
