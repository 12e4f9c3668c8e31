//! Newtype domain identifiers.
//!
//! Every concept with an identity is a distinct newtype wrapping a primitive.
//! This prevents accidentally interchanging, for example, an [`IssueNumber`]
//! with a [`CommentId`] even though both are `u64` under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Action, EventType};

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for u64-wrapped newtypes (provider-assigned integers).
// Generates: struct (Copy), new(), as_u64(), Display.
// ---------------------------------------------------------------------------
macro_rules! u64_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new identifier from a raw integer.
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the underlying integer value.
            pub fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: provider-integer-backed
// ---------------------------------------------------------------------------

u64_id! {
    /// Identifies the account that triggered a webhook event (`sender.id`).
    UserId
}

u64_id! {
    /// The per-repository number of an issue or pull request.
    ///
    /// Issues and pull requests share one number space, so a single type
    /// covers both.
    IssueNumber
}

u64_id! {
    /// Identifies a single issue or pull-request comment.
    CommentId
}

u64_id! {
    /// Identifies one aggregation bucket for its whole lifetime.
    ///
    /// Allocated by the window manager from a monotonic counter; never reused,
    /// so a deadline timer can tell whether the bucket it was scheduled for is
    /// still the one in the index.
    BucketId
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies one outbound notification handed to the delivery sink.
///
/// Generated fresh for every dispatch; logged alongside the provider delivery
/// ids so a chat message can be traced back to the webhooks it summarises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(Uuid);

impl NotificationId {
    /// Generates a new random notification identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies a repository in `"owner/repo"` format.
    RepositoryName
}

string_id! {
    /// The provider-assigned id of one webhook delivery (`X-GitHub-Delivery`).
    ///
    /// Redeliveries of the same event reuse the id, which makes it the
    /// idempotency key inside an aggregation bucket.
    DeliveryId
}

string_id! {
    /// The identity that related events share, e.g. `"owner/repo#42"`.
    ///
    /// Scopes an aggregation bucket together with its
    /// [`AggregationClass`](crate::AggregationClass).
    SubjectKey
}

string_id! {
    /// Identifies a template known to the external renderer,
    /// e.g. `"issues/x_label_aggregate"`.
    TemplateId
}

impl TemplateId {
    /// The template used when no dedicated one exists for an event.
    pub fn generic() -> Self {
        Self("generic".to_string())
    }

    /// Default id for an event: `"push"` or `"issues/opened"`.
    pub fn for_event(event_type: EventType, action: Option<&Action>) -> Self {
        match action {
            Some(action) => Self(format!("{event_type}/{action}")),
            None => Self(event_type.as_str().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_ids_are_rejected() {
        assert!(DeliveryId::new("").is_none());
        assert!(SubjectKey::new(String::new()).is_none());
    }

    #[test]
    fn string_ids_display_their_value() {
        let repo = RepositoryName::new("octo/widgets").unwrap();
        assert_eq!(repo.to_string(), "octo/widgets");
        assert_eq!(repo.as_str(), "octo/widgets");
    }

    #[test]
    fn template_ids_follow_event_and_action() {
        assert_eq!(TemplateId::for_event(EventType::Push, None).as_str(), "push");
        assert_eq!(
            TemplateId::for_event(EventType::Issues, Some(&Action::LabelAggregate)).as_str(),
            "issues/x_label_aggregate"
        );
    }

    #[test]
    fn notification_ids_are_unique() {
        assert_ne!(NotificationId::new_random(), NotificationId::new_random());
    }
}
