//! Error and retry-policy types for the notification domain.
//!
//! Nothing here is fatal to the process. The worst outcome for a single
//! event is that it is dropped ([`NormalizeError`]) or rendered generically
//! ([`RenderError`]); other subjects' buckets are never affected.
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EventType, TemplateId};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by infrastructure error types to let the caller decide whether to
/// re-invoke an operation.
///
/// - `Retryable` errors: transport failures, rate-limit responses, server errors.
/// - `NonRetryable` errors: rejected requests, unencodable payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from a `Retry-After` response header).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Ingestion errors
// ---------------------------------------------------------------------------

/// Why an inbound webhook could not be turned into a
/// [`NormalizedEvent`](crate::NormalizedEvent).
///
/// Either way the event is dropped before it reaches the bucket index.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    /// The provider sent an event type this system has no handling for.
    ///
    /// Dropped silently: providers introduce new event types over time.
    #[error("Unknown event type: {event_type}")]
    UnknownEventType {
        /// The raw event-type tag as received.
        event_type: String,
    },

    /// The payload lacks a field required for its claimed event type.
    #[error("Malformed '{event_type}' payload: {reason}")]
    MalformedPayload {
        /// The event type the payload claimed to be.
        event_type: EventType,
        /// Which requirement was violated.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Rendering errors
// ---------------------------------------------------------------------------

/// A template/context mismatch reported by a [`Renderer`](crate::Renderer).
///
/// The relay answers these with a generic fallback notification.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    /// The renderer has no template with this id.
    #[error("Template not found: {template}")]
    TemplateNotFound {
        /// The requested template.
        template: TemplateId,
    },

    /// The context lacks a variable the template references.
    #[error("Template '{template}' references missing variable '{variable}'")]
    MissingVariable {
        /// The template being rendered.
        template: TemplateId,
        /// Dotted path of the missing variable, e.g. `"issue.number"`.
        variable: String,
    },
}

// ---------------------------------------------------------------------------
// Delivery errors
// ---------------------------------------------------------------------------

/// Failure reported by a [`DeliverySink`](crate::DeliverySink).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeliveryError {
    /// The destination answered with a non-success HTTP status.
    #[error("Delivery endpoint returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Parsed `Retry-After` header, when present.
        retry_after: Option<Duration>,
    },

    /// The request never produced a response (connect, TLS, timeout).
    #[error("Delivery transport failed: {message}")]
    Transport {
        /// Transport-level description.
        message: String,
    },

    /// The notification could not be encoded for the destination.
    #[error("Notification could not be encoded: {message}")]
    Encoding {
        /// Encoder description.
        message: String,
    },
}

impl DeliveryError {
    /// Classifies this failure for retry decisions.
    ///
    /// Rate limiting (429) and server errors (5xx) are retryable, as are
    /// transport failures. Other statuses and encoding failures are not.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Status {
                status,
                retry_after,
            } if *status == 429 || *status >= 500 => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::Status { .. } | Self::Encoding { .. } => RetryPolicy::NonRetryable,
            Self::Transport { .. } => RetryPolicy::Retryable { after: None },
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// The runtime configuration is invalid.
///
/// Produced at load time; the relay never starts with an invalid config.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Cannot read configuration '{path}': {message}")]
    Unreadable {
        /// Path that was read.
        path: String,
        /// I/O error description.
        message: String,
    },

    /// The configuration file is not valid TOML for the expected schema.
    #[error("Cannot parse configuration: {message}")]
    Parse {
        /// Parser description.
        message: String,
    },

    /// A value is present but not acceptable.
    #[error("Invalid configuration value '{field}': {message}")]
    Invalid {
        /// Dotted key of the offending value, e.g. `"delivery.url"`.
        field: String,
        /// Why the value was rejected.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Relay-level errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the relay to its transport (e.g. the HTTP receiver).
#[derive(Debug, Error)]
pub enum RelayError {
    /// The inbound event was dropped during normalisation.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// A notification could not be delivered after all attempts.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_rate_limits_are_retryable() {
        let limited = DeliveryError::Status {
            status: 429,
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(
            limited.retry_policy(),
            RetryPolicy::Retryable {
                after: Some(Duration::from_secs(2))
            }
        );
        let unavailable = DeliveryError::Status {
            status: 503,
            retry_after: None,
        };
        assert_eq!(
            unavailable.retry_policy(),
            RetryPolicy::Retryable { after: None }
        );
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let rejected = DeliveryError::Status {
            status: 400,
            retry_after: None,
        };
        assert_eq!(rejected.retry_policy(), RetryPolicy::NonRetryable);
        let encoding = DeliveryError::Encoding {
            message: "bad".into(),
        };
        assert_eq!(encoding.retry_policy(), RetryPolicy::NonRetryable);
    }

    #[test]
    fn unknown_event_type_names_the_tag() {
        let err = NormalizeError::UnknownEventType {
            event_type: "sponsorship".into(),
        };
        assert_eq!(err.to_string(), "Unknown event type: sponsorship");
    }
}
