//! hookrelay aggregation engine and relay pipeline.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Sequences the pure `events` and `dispatch` logic
//! with the stateful aggregation windows and the [`DeliverySink`] port. It
//! contains no domain rules of its own.
//!
//! [`DeliverySink`]: events::DeliverySink
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`window`] | `WindowManager`: buckets, deadline timers, drain |
//! | [`relay`] | `Relay`: inbound handling, flush consumer, shutdown |

pub mod relay;
pub mod window;

pub use relay::{Delivered, Handled, Relay};
pub use window::{Outcome, WindowManager};
