//! Core domain for hookrelay.
//!
//! This crate contains every domain concept of the webhook-to-chat relay:
//! newtype identifiers, the normalised event model, the aggregation rules that
//! decide which events combine, the composite builder, and the port traits for
//! rendering and delivery. Infrastructure crates implement the traits defined
//! here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`SubjectKey`, `DeliveryId`, etc.) |
//! | [`types`] | Value types (`Label`, `Milestone`, `AggregationWindow`, `Timestamp`) |
//! | [`errors`] | Error taxonomy and retry policy |
//! | [`event`] | `EventType`, `Action`, `NormalizedEvent` |
//! | [`normalize`] | Provider payload → `NormalizedEvent` |
//! | [`resolve`] | `NormalizedEvent` → bucket key and aggregation class |
//! | [`composite`] | Buffered run → `CompositeEvent`, bucket admission rules |
//! | [`config`] | Validated runtime settings |
//! | [`ports`] | `Renderer` and `DeliverySink` traits |

pub mod composite;
pub mod config;
pub mod errors;
pub mod event;
pub mod identifiers;
pub mod normalize;
pub mod ports;
pub mod resolve;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use composite::{
    absorbs_label, admit, build, Admission, CompositeEvent, CompositeKind, Composition,
};
pub use config::{RelaySettings, TemplateSettings};
pub use errors::{ConfigError, DeliveryError, NormalizeError, RelayError, RenderError, RetryPolicy};
pub use event::{Action, EventFacts, EventType, NormalizedEvent};
pub use identifiers::{
    BucketId, CommentId, DeliveryId, IssueNumber, NotificationId, RepositoryName, SubjectKey,
    TemplateId, UserId,
};
pub use normalize::normalize;
pub use ports::{DeliverySink, OutboundMessage, RenderContext, Renderer};
pub use resolve::{resolve, AggregationClass, BucketKey};
pub use types::{AggregationWindow, Label, Milestone, Timestamp};
