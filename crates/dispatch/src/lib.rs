//! Render dispatch for hookrelay.
//!
//! Turns a raw event or a flushed composite into a [`Dispatch`]: the template
//! id, the variable context handed to the renderer, and whether the
//! notification is intentionally silent.
//!
//! ## Architectural Layer
//!
//! **Business logic.** Pure functions over the `events` model. No I/O.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | `dispatch` | `RenderDispatch`, `Renderable`, `Dispatch`, `Notification` |
//! | `context` | Render-context construction and enrichment |
//! | [`summary`] | `SummaryRenderer`, the built-in one-line renderer |
//! | [`util`] | Template helpers (ref parsing, commit summaries, label colours) |

mod context;
mod dispatch;
pub mod summary;
pub mod util;

pub use dispatch::{default_template, Dispatch, Notification, RenderDispatch, Renderable};
pub use summary::SummaryRenderer;
