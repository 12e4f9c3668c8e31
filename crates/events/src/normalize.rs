//! Event normaliser: provider payload + event-type tag → [`NormalizedEvent`].
//!
//! Pure transform. Unknown payload fields are ignored; unknown event types are
//! reported as [`NormalizeError::UnknownEventType`] so the caller can drop
//! them silently.

use serde::Deserialize;
use serde_json::Value;

use crate::{
    Action, CommentId, DeliveryId, EventFacts, EventType, IssueNumber, Label, Milestone,
    NormalizeError, NormalizedEvent, RepositoryName, SubjectKey, Timestamp, UserId,
};

// ---------------------------------------------------------------------------
// Payload view
// ---------------------------------------------------------------------------

/// The subset of a webhook payload normalisation reads.
///
/// Everything is optional here; which fields are *required* depends on the
/// event type and is checked in [`normalize`].
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    action: Option<String>,
    repository: Option<RepositoryRef>,
    sender: Option<AccountRef>,
    issue: Option<IssueRef>,
    pull_request: Option<IssueRef>,
    comment: Option<CommentRef>,
    label: Option<Label>,
    milestone: Option<Milestone>,
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    release: Option<ReleaseRef>,
    hook_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RepositoryRef {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct AccountRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct IssueRef {
    number: u64,
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct CommentRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct ReleaseRef {
    id: u64,
}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// Converts one inbound webhook into a [`NormalizedEvent`].
///
/// `received_at` becomes [`NormalizedEvent::occurred_at`]; webhook payloads do
/// not carry a uniform event timestamp.
///
/// # Errors
///
/// - [`NormalizeError::UnknownEventType`] for event types without handling.
/// - [`NormalizeError::MalformedPayload`] when a field required by the claimed
///   event type is missing or has the wrong shape.
pub fn normalize(
    event_type: &str,
    delivery_id: DeliveryId,
    received_at: Timestamp,
    mut payload: Value,
) -> Result<NormalizedEvent, NormalizeError> {
    let event_type: EventType = event_type.parse()?;
    let malformed = |reason: String| NormalizeError::MalformedPayload { event_type, reason };

    if !payload.is_object() {
        return Err(malformed("payload is not a JSON object".to_string()));
    }
    let envelope =
        Envelope::deserialize(&payload).map_err(|e| malformed(format!("unexpected shape: {e}")))?;

    let action = match (&envelope.action, requires_action(event_type)) {
        (Some(action), _) => Some(Action::parse(action)),
        (None, true) => return Err(malformed("missing 'action'".to_string())),
        (None, false) => None,
    };

    let sender_id = match (&envelope.sender, event_type) {
        (Some(sender), _) => Some(UserId::new(sender.id)),
        (None, EventType::Ping) => None,
        (None, _) => return Err(malformed("missing 'sender'".to_string())),
    };

    let repo_id = match (&envelope.repository, envelope.hook_id, event_type) {
        (Some(repo), _, _) => RepositoryName::new(repo.full_name.clone())
            .ok_or_else(|| malformed("empty 'repository.full_name'".to_string()))?,
        (None, Some(hook_id), EventType::Ping) => {
            RepositoryName::new(format!("hook:{hook_id}")).ok_or_else(|| malformed(String::new()))?
        }
        (None, None, EventType::Ping) => {
            return Err(malformed("ping without 'repository' or 'hook_id'".to_string()))
        }
        (None, _, _) => return Err(malformed("missing 'repository'".to_string())),
    };

    let facts = extract_facts(event_type, action.as_ref(), &envelope).map_err(malformed)?;
    let subject_key = subject_key(event_type, &repo_id, &facts, &envelope).map_err(malformed)?;

    if event_type == EventType::Push {
        fill_push_sizes(&mut payload);
    }

    Ok(NormalizedEvent {
        event_type,
        action,
        subject_key,
        repo_id,
        occurred_at: received_at,
        sender_id,
        delivery_id,
        facts,
        raw: payload,
    })
}

/// Event types whose payloads always carry an `action`.
fn requires_action(event_type: EventType) -> bool {
    !matches!(
        event_type,
        EventType::Push
            | EventType::Create
            | EventType::Delete
            | EventType::Fork
            | EventType::Gollum
            | EventType::Public
            | EventType::Ping
    )
}

fn extract_facts(
    event_type: EventType,
    action: Option<&Action>,
    envelope: &Envelope,
) -> Result<EventFacts, String> {
    let mut facts = EventFacts::default();

    if event_type.has_issue_subject() {
        // issue_comment on a pull request still carries `issue`.
        let subject = match event_type {
            EventType::Issues | EventType::IssueComment => envelope.issue.as_ref(),
            _ => envelope.pull_request.as_ref(),
        }
        .ok_or_else(|| "missing issue or pull request subject".to_string())?;
        facts.issue_number = Some(IssueNumber::new(subject.number));
        facts.subject_labels = subject.labels.clone();
    }

    match action {
        Some(Action::Labeled | Action::Unlabeled) if event_type.has_issue_subject() => {
            facts.label = Some(
                envelope
                    .label
                    .clone()
                    .ok_or_else(|| "label event without 'label'".to_string())?,
            );
        }
        Some(Action::Milestoned | Action::Demilestoned) => {
            facts.milestone = Some(
                envelope
                    .milestone
                    .clone()
                    .ok_or_else(|| "milestone event without 'milestone'".to_string())?,
            );
        }
        _ => {}
    }

    if event_type == EventType::IssueComment {
        let comment = envelope
            .comment
            .as_ref()
            .ok_or_else(|| "missing 'comment'".to_string())?;
        facts.comment_id = Some(CommentId::new(comment.id));
    }

    Ok(facts)
}

fn subject_key(
    event_type: EventType,
    repo: &RepositoryName,
    facts: &EventFacts,
    envelope: &Envelope,
) -> Result<SubjectKey, String> {
    let key = match (event_type, facts.issue_number) {
        (_, Some(number)) => format!("{repo}#{number}"),
        (EventType::Push, None) => {
            let git_ref = envelope
                .git_ref
                .as_deref()
                .ok_or_else(|| "push without 'ref'".to_string())?;
            format!("{repo}@{git_ref}")
        }
        (EventType::Create | EventType::Delete, None) => match envelope.git_ref.as_deref() {
            Some(git_ref) => format!("{repo}@{git_ref}"),
            None => repo.to_string(),
        },
        (EventType::Release, None) => match &envelope.release {
            Some(release) => format!("{repo}/releases/{}", release.id),
            None => repo.to_string(),
        },
        (EventType::Gollum, None) => format!("{repo}/wiki"),
        _ => repo.to_string(),
    };
    SubjectKey::new(key).ok_or_else(|| "empty subject key".to_string())
}

/// Pushes sometimes arrive without `size`/`distinct_size`; derive them from
/// `commits` so renderers can rely on both.
fn fill_push_sizes(payload: &mut Value) {
    let Some(obj) = payload.as_object_mut() else {
        return;
    };
    let missing = |key: &str| obj.get(key).map_or(true, Value::is_null);
    if !missing("size") && !missing("distinct_size") {
        return;
    }
    let commits = obj
        .get("commits")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let size = commits.len();
    let distinct = commits
        .iter()
        .filter(|c| c.get("distinct").and_then(Value::as_bool).unwrap_or(false))
        .count();
    obj.insert("size".to_string(), Value::from(size));
    obj.insert("distinct_size".to_string(), Value::from(distinct));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delivery() -> DeliveryId {
        DeliveryId::new("d-1").unwrap()
    }

    fn issue_payload(action: &str) -> Value {
        json!({
            "action": action,
            "issue": {"number": 42, "title": "Crash", "labels": [{"name": "bug", "color": "d73a4a"}]},
            "label": {"name": "bug", "color": "d73a4a"},
            "repository": {"full_name": "octo/widgets", "private": false},
            "sender": {"id": 9, "login": "mona"},
            "installation": {"id": 1}
        })
    }

    #[test]
    fn labeled_issue_is_normalised_with_facts() {
        let evt = normalize("issues", delivery(), Timestamp::now(), issue_payload("labeled")).unwrap();
        assert_eq!(evt.event_type, EventType::Issues);
        assert_eq!(evt.action, Some(Action::Labeled));
        assert_eq!(evt.subject_key.as_str(), "octo/widgets#42");
        assert_eq!(evt.repo_id.as_str(), "octo/widgets");
        assert_eq!(evt.sender_id, Some(UserId::new(9)));
        assert_eq!(evt.facts.label.as_ref().map(|l| l.name.as_str()), Some("bug"));
        assert_eq!(evt.facts.subject_labels.len(), 1);
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let err = normalize("sponsorship", delivery(), Timestamp::now(), json!({})).unwrap_err();
        assert!(matches!(err, NormalizeError::UnknownEventType { .. }));
    }

    #[test]
    fn missing_sender_is_malformed() {
        let mut payload = issue_payload("opened");
        payload.as_object_mut().unwrap().remove("sender");
        let err = normalize("issues", delivery(), Timestamp::now(), payload).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedPayload { .. }));
    }

    #[test]
    fn label_event_without_label_is_malformed() {
        let mut payload = issue_payload("unlabeled");
        payload.as_object_mut().unwrap().remove("label");
        let err = normalize("issues", delivery(), Timestamp::now(), payload).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedPayload { .. }));
    }

    #[test]
    fn non_object_payload_is_malformed() {
        let err = normalize("push", delivery(), Timestamp::now(), json!([1, 2])).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedPayload { .. }));
    }

    #[test]
    fn push_sizes_are_computed_when_absent() {
        let payload = json!({
            "ref": "refs/heads/main",
            "commits": [{"id": "a", "distinct": true}, {"id": "b", "distinct": false}],
            "repository": {"full_name": "octo/widgets"},
            "sender": {"id": 9}
        });
        let evt = normalize("push", delivery(), Timestamp::now(), payload).unwrap();
        assert_eq!(evt.subject_key.as_str(), "octo/widgets@refs/heads/main");
        assert_eq!(evt.action, None);
        assert_eq!(evt.raw["size"], 2);
        assert_eq!(evt.raw["distinct_size"], 1);
    }

    #[test]
    fn push_sizes_are_kept_when_present() {
        let payload = json!({
            "ref": "refs/heads/main",
            "size": 30, "distinct_size": 25,
            "commits": [],
            "repository": {"full_name": "octo/widgets"},
            "sender": {"id": 9}
        });
        let evt = normalize("push", delivery(), Timestamp::now(), payload).unwrap();
        assert_eq!(evt.raw["size"], 30);
    }

    #[test]
    fn ping_without_repository_uses_hook_id() {
        let payload = json!({"zen": "Keep it logically awesome.", "hook_id": 77});
        let evt = normalize("ping", delivery(), Timestamp::now(), payload).unwrap();
        assert_eq!(evt.repo_id.as_str(), "hook:77");
        assert_eq!(evt.sender_id, None);
    }

    #[test]
    fn comment_on_pull_request_uses_issue_subject() {
        let payload = json!({
            "action": "created",
            "issue": {"number": 7, "pull_request": {"url": "x"}},
            "comment": {"id": 1001, "body": "LGTM"},
            "repository": {"full_name": "octo/widgets"},
            "sender": {"id": 9}
        });
        let evt = normalize("issue_comment", delivery(), Timestamp::now(), payload).unwrap();
        assert_eq!(evt.subject_key.as_str(), "octo/widgets#7");
        assert_eq!(evt.facts.comment_id, Some(CommentId::new(1001)));
    }

    #[test]
    fn unknown_action_on_known_type_is_kept() {
        let evt = normalize(
            "issues",
            delivery(),
            Timestamp::now(),
            issue_payload("typed"),
        )
        .unwrap();
        assert_eq!(evt.action, Some(Action::Other("typed".into())));
    }
}
