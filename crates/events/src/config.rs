//! Runtime settings consumed by the relay.
//!
//! These are already-validated values. Parsing the configuration file is the
//! composition root's job; this crate only defines what the core needs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{AggregationWindow, EventType, TemplateId};

/// Per-event-type template overrides and enable flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateSettings {
    /// Event types whose notifications are always suppressed.
    #[serde(default)]
    pub disabled: BTreeSet<EventType>,

    /// Replacement template ids, keyed by the default id they replace.
    #[serde(default)]
    pub overrides: BTreeMap<TemplateId, TemplateId>,
}

impl TemplateSettings {
    /// Returns `true` if notifications for `event_type` are turned off.
    pub fn is_disabled(&self, event_type: EventType) -> bool {
        self.disabled.contains(&event_type)
    }

    /// Applies a configured override to a default template id.
    pub fn resolve(&self, default: TemplateId) -> TemplateId {
        self.overrides.get(&default).cloned().unwrap_or(default)
    }
}

/// Everything the relay core needs to know at construction time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Aggregation buffering delay.
    pub window: AggregationWindow,

    /// Template overrides and enable flags.
    pub templates: TemplateSettings,
}
