//! Render-context construction.
//!
//! The context starts as the primary event's full payload (so templates can
//! reach any provider field) and is overlaid with the dispatch metadata,
//! aggregation-derived fields, and values the templates would otherwise have
//! to compute themselves.

use events::{RenderContext, TemplateId};
use serde_json::{json, Value};

use crate::util::{contrast_fg, cut_message, ref_is_personal, ref_name, ref_type};
use crate::Renderable;

/// Maximum length of a one-line commit summary.
const COMMIT_SUMMARY_LEN: usize = 72;

/// Builds the variable context for `item` rendered with `template`.
pub(crate) fn build(item: &Renderable<'_>, template: &TemplateId) -> RenderContext {
    let primary = item.primary();
    let mut ctx = primary.raw.as_object().cloned().unwrap_or_default();

    ctx.insert("event_type".into(), json!(primary.event_type.as_str()));
    ctx.insert(
        "action".into(),
        item.action().map_or(Value::Null, |a| json!(a.as_str())),
    );
    ctx.insert("template".into(), json!(template.as_str()));
    ctx.insert("delivery_ids".into(), json!(item.delivery_ids()));
    ctx.insert(
        "aggregation".into(),
        item.aggregation_fields().unwrap_or(Value::Null),
    );

    if let Some(git_ref) = ctx.get("ref").and_then(Value::as_str).map(str::to_owned) {
        if git_ref.starts_with("refs/") {
            ctx.insert(
                "ref_info".into(),
                json!({
                    "type": ref_type(&git_ref),
                    "name": ref_name(&git_ref),
                    "personal": ref_is_personal(&git_ref),
                }),
            );
        }
    }

    if let Some(commits) = ctx.get_mut("commits").and_then(Value::as_array_mut) {
        for commit in commits.iter_mut().filter_map(Value::as_object_mut) {
            let summary = commit
                .get("message")
                .and_then(Value::as_str)
                .map(|m| cut_message(m, COMMIT_SUMMARY_LEN));
            if let Some(summary) = summary {
                commit.insert("summary".into(), json!(summary));
            }
        }
    }

    decorate_label(ctx.get_mut("label"));
    for subject in ["issue", "pull_request"] {
        decorate_labels(ctx.get_mut(subject).and_then(|s| s.get_mut("labels")));
    }
    if let Some(aggregation) = ctx.get_mut("aggregation") {
        for field in ["added_labels", "removed_labels", "absorbed_labels"] {
            decorate_labels(aggregation.get_mut(field));
        }
    }

    ctx
}

fn decorate_labels(labels: Option<&mut Value>) {
    if let Some(labels) = labels.and_then(Value::as_array_mut) {
        for label in labels {
            decorate_label(Some(label));
        }
    }
}

/// Adds `text_color` (readable foreground for the label's colour).
fn decorate_label(label: Option<&mut Value>) {
    let Some(label) = label.and_then(Value::as_object_mut) else {
        return;
    };
    let fg = label
        .get("color")
        .and_then(Value::as_str)
        .map(contrast_fg);
    if let Some(fg) = fg {
        label.insert("text_color".into(), json!(fg));
    }
}
