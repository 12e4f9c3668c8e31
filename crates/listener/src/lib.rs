//! hookrelay webhook receiver.
//!
//! Binds an HTTP server that accepts GitHub-style webhook deliveries and feeds
//! them to the [`engine::Relay`]:
//!
//! - `POST /webhook` reads `X-GitHub-Event` and `X-GitHub-Delivery`, checks
//!   `X-Hub-Signature-256` (HMAC-SHA256 of the raw body) when a secret is
//!   configured, and hands the JSON body to the relay.
//! - `GET /health` answers `200 OK` while the process is up.
//!
//! ## Responses
//!
//! | Situation | Status |
//! |-----------|--------|
//! | Event accepted (buffered, delivered, or netted out) | `200` |
//! | Event type unknown to the relay | `202` |
//! | Missing header, empty or non-JSON body, malformed payload | `400` |
//! | Signature missing or wrong | `401` |
//! | Immediate notification could not be delivered | `502` |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Transport details live here. The relay only ever sees
//! `(event_type, delivery_id, payload)`.

pub mod errors;
pub mod router;
pub mod signature;

pub use errors::ListenerError;
pub use router::{build_router, serve, AppState};
pub use signature::{sign, verify_signature};
