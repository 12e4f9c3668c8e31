//! Shared value types for the notification domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (e.g. an aggregation window is either
//! disabled or a non-negative duration) and participate in domain computations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Subject entities
// ---------------------------------------------------------------------------

/// An issue or pull-request label as carried in webhook payloads.
///
/// Label names are unique within a repository, so aggregation compares labels
/// by [`Label::name`]. Unknown payload fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Display name, e.g. `"bug"`.
    pub name: String,

    /// Background colour as a six-digit hex string without `#`.
    #[serde(default)]
    pub color: String,

    /// Provider-assigned id, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl Label {
    /// Creates a label with the given name and colour and no provider id.
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            id: None,
        }
    }
}

// ---------------------------------------------------------------------------

/// A milestone as carried in webhook payloads.
///
/// Two milestones are the same milestone when their per-repository
/// [`Milestone::number`] matches; titles may be edited independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// Per-repository milestone number.
    pub number: u64,

    /// Display title.
    #[serde(default)]
    pub title: String,

    /// Browser URL, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

impl Milestone {
    /// Returns `true` if both values refer to the same milestone (or both are absent).
    pub fn same(a: Option<&Milestone>, b: Option<&Milestone>) -> bool {
        a.map(|m| m.number) == b.map(|m| m.number)
    }
}

// ---------------------------------------------------------------------------
// Aggregation window
// ---------------------------------------------------------------------------

/// How long related events are buffered before one combined notification is
/// produced.
///
/// The window is fixed from the first event of a bucket; later events never
/// extend it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationWindow {
    /// Aggregation is turned off; every event renders immediately.
    Disabled,
    /// Events are buffered for this long after the first event of a bucket.
    Fixed(Duration),
}

impl AggregationWindow {
    /// Interprets a configured timeout in whole seconds.
    ///
    /// Any negative value (conventionally `-1`) disables aggregation.
    pub fn from_secs(secs: i64) -> Self {
        match u64::try_from(secs) {
            Ok(secs) => Self::Fixed(Duration::from_secs(secs)),
            Err(_) => Self::Disabled,
        }
    }

    /// Returns the buffering delay, or `None` when aggregation is disabled.
    pub fn delay(self) -> Option<Duration> {
        match self {
            Self::Disabled => None,
            Self::Fixed(delay) => Some(delay),
        }
    }

    /// Returns `true` unless aggregation is disabled.
    pub fn is_enabled(self) -> bool {
        matches!(self, Self::Fixed(_))
    }
}

impl Default for AggregationWindow {
    fn default() -> Self {
        Self::Fixed(Duration::from_secs(1))
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_timeout_disables_aggregation() {
        assert_eq!(AggregationWindow::from_secs(-1), AggregationWindow::Disabled);
        assert_eq!(AggregationWindow::from_secs(-30), AggregationWindow::Disabled);
        assert!(!AggregationWindow::Disabled.is_enabled());
        assert_eq!(AggregationWindow::Disabled.delay(), None);
    }

    #[test]
    fn non_negative_timeout_is_a_fixed_window() {
        assert_eq!(
            AggregationWindow::from_secs(1).delay(),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            AggregationWindow::from_secs(0),
            AggregationWindow::Fixed(Duration::ZERO)
        );
    }

    #[test]
    fn milestones_compare_by_number() {
        let a = Milestone {
            number: 3,
            title: "v1".into(),
            html_url: None,
        };
        let renamed = Milestone {
            title: "v1.0".into(),
            ..a.clone()
        };
        assert!(Milestone::same(Some(&a), Some(&renamed)));
        assert!(Milestone::same(None, None));
        assert!(!Milestone::same(Some(&a), None));
    }

    #[test]
    fn label_deserialises_with_unknown_fields() {
        let label: Label = serde_json::from_value(serde_json::json!({
            "id": 7, "name": "bug", "color": "d73a4a", "default": true, "node_id": "x"
        }))
        .unwrap();
        assert_eq!(label.name, "bug");
        assert_eq!(label.id, Some(7));
    }
}
