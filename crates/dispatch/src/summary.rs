//! Built-in one-line renderer.
//!
//! Deployments normally plug a real template engine in behind
//! [`Renderer`]. This renderer covers every default template id so the relay
//! produces readable text out of the box; ids it does not know (for example a
//! configured override) yield [`RenderError::TemplateNotFound`].

use events::{RenderContext, RenderError, Renderer, TemplateId};
use serde_json::Value;

use crate::util::join_human_list;

/// Renders default template ids as plain one-line summaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryRenderer;

impl Renderer for SummaryRenderer {
    fn render(&self, template: &TemplateId, context: &RenderContext) -> Result<String, RenderError> {
        let ctx = Ctx { template, context };
        let (family, action) = match template.as_str().split_once('/') {
            Some((family, action)) => (family, Some(action)),
            None => (template.as_str(), None),
        };

        match (family, action) {
            ("generic", None) => {
                let action = ctx.opt_str("action").unwrap_or("triggered");
                Ok(format!(
                    "{} {} {} event in {}",
                    ctx.str("sender.login")?,
                    action.replace('_', " "),
                    ctx.str("event_type")?,
                    ctx.str("repository.full_name")?,
                ))
            }
            ("push", None) => {
                let size = ctx.get("size")?.as_u64().unwrap_or(0);
                let noun = if size == 1 { "commit" } else { "commits" };
                let branch = ctx
                    .opt_str("ref_info.name")
                    .map_or_else(|| ctx.str("ref"), Ok)?;
                Ok(format!(
                    "{} pushed {size} {noun} to {branch} in {}",
                    ctx.str("sender.login")?,
                    ctx.str("repository.full_name")?,
                ))
            }
            ("create" | "delete", None) => Ok(format!(
                "{} {}d {} {} in {}",
                ctx.str("sender.login")?,
                family,
                ctx.str("ref_type")?,
                ctx.str("ref")?,
                ctx.str("repository.full_name")?,
            )),
            ("fork", None) => Ok(format!(
                "{} forked {} to {}",
                ctx.str("sender.login")?,
                ctx.str("repository.full_name")?,
                ctx.str("forkee.full_name")?,
            )),
            ("gollum", None) => {
                let titles: Vec<&str> = ctx
                    .get("pages")?
                    .as_array()
                    .map(|pages| {
                        pages
                            .iter()
                            .filter_map(|p| p.get("title").and_then(Value::as_str))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(format!(
                    "{} updated the wiki of {}: {}",
                    ctx.str("sender.login")?,
                    ctx.str("repository.full_name")?,
                    join_human_list(&titles, ", ", " and "),
                ))
            }
            ("public", None) => Ok(format!(
                "{} made {} public",
                ctx.str("sender.login")?,
                ctx.str("repository.full_name")?,
            )),
            ("issues", Some(action)) => subject_line(&ctx, "issue", action),
            ("pull_request", Some(action)) => subject_line(&ctx, "pull request", action),
            ("issue_comment", Some(action)) => {
                let mut line = format!(
                    "{} {} a comment on #{} {}",
                    ctx.str("sender.login")?,
                    past_tense(action),
                    ctx.num("issue.number")?,
                    ctx.str("issue.title")?,
                );
                if ctx.opt_bool("aggregation.closed") {
                    line.push_str(" and closed it");
                } else if ctx.opt_bool("aggregation.reopened") {
                    line.push_str(" and reopened it");
                }
                Ok(line)
            }
            ("commit_comment", Some(action)) => Ok(format!(
                "{} {} a comment on commit {} in {}",
                ctx.str("sender.login")?,
                past_tense(action),
                short_sha(ctx.str("comment.commit_id")?),
                ctx.str("repository.full_name")?,
            )),
            ("pull_request_review", Some(action)) => Ok(format!(
                "{} {} a review on pull request #{} {}",
                ctx.str("sender.login")?,
                past_tense(action),
                ctx.num("pull_request.number")?,
                ctx.str("pull_request.title")?,
            )),
            ("pull_request_review_comment", Some(action)) => Ok(format!(
                "{} {} a review comment on pull request #{} {}",
                ctx.str("sender.login")?,
                past_tense(action),
                ctx.num("pull_request.number")?,
                ctx.str("pull_request.title")?,
            )),
            ("release", Some(action)) => Ok(format!(
                "{} {} release {} in {}",
                ctx.str("sender.login")?,
                past_tense(action),
                ctx.str("release.tag_name")?,
                ctx.str("repository.full_name")?,
            )),
            ("label", Some(action)) => Ok(format!(
                "{} {} label {} in {}",
                ctx.str("sender.login")?,
                past_tense(action),
                ctx.str("label.name")?,
                ctx.str("repository.full_name")?,
            )),
            ("milestone", Some(action)) => Ok(format!(
                "{} {} milestone {} in {}",
                ctx.str("sender.login")?,
                past_tense(action),
                ctx.str("milestone.title")?,
                ctx.str("repository.full_name")?,
            )),
            ("member", Some(action)) => Ok(format!(
                "{} {} {} as a collaborator of {}",
                ctx.str("sender.login")?,
                past_tense(action),
                ctx.str("member.login")?,
                ctx.str("repository.full_name")?,
            )),
            ("repository", Some(action)) => Ok(format!(
                "{} {} repository {}",
                ctx.str("sender.login")?,
                past_tense(action),
                ctx.str("repository.full_name")?,
            )),
            ("star", Some(_)) => Ok(format!(
                "{} starred {}",
                ctx.str("sender.login")?,
                ctx.str("repository.full_name")?,
            )),
            ("watch", Some(_)) => Ok(format!(
                "{} started watching {}",
                ctx.str("sender.login")?,
                ctx.str("repository.full_name")?,
            )),
            _ => Err(RenderError::TemplateNotFound {
                template: template.clone(),
            }),
        }
    }
}

fn subject_line(ctx: &Ctx<'_>, noun: &str, action: &str) -> Result<String, RenderError> {
    let subject = if noun == "issue" { "issue" } else { "pull_request" };
    let who = ctx.str("sender.login")?;
    let number = ctx.num(&format!("{subject}.number"))?;
    let title = ctx.str(&format!("{subject}.title"))?;

    let what = match action {
        "x_label_aggregate" => {
            let mut parts = Vec::new();
            let added = label_names(ctx.get("aggregation.added_labels")?);
            let removed = label_names(ctx.get("aggregation.removed_labels")?);
            if !added.is_empty() {
                parts.push(format!("added {}", join_human_list(&added, ", ", " and ")));
            }
            if !removed.is_empty() {
                parts.push(format!("removed {}", join_human_list(&removed, ", ", " and ")));
            }
            format!("{} on {noun}", parts.join(" and "))
        }
        "x_milestone_changed" => {
            let title_of = |path: &str| {
                ctx.get(path)
                    .ok()
                    .and_then(|m| m.get("title"))
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            };
            match (title_of("aggregation.from"), title_of("aggregation.to")) {
                (Some(from), Some(to)) => format!("moved {noun} from {from} to {to}:"),
                (None, Some(to)) => format!("added {noun} to {to}:"),
                (Some(from), None) => format!("removed {noun} from {from}:"),
                (None, None) => format!("changed the milestone of {noun}"),
            }
        }
        "closed" if ctx.opt_bool("pull_request.merged") => format!("merged {noun}"),
        "labeled" => format!("added {} to {noun}", ctx.str("label.name")?),
        "unlabeled" => format!("removed {} from {noun}", ctx.str("label.name")?),
        "milestoned" => format!("added {noun} to {}:", ctx.str(&format!("{subject}.milestone.title"))?),
        "demilestoned" => format!("removed {noun} from its milestone:"),
        "synchronize" => format!("pushed to {noun}"),
        other => format!("{} {noun}", past_tense(other)),
    };

    let mut line = format!("{who} {what} #{number} {title}");
    if let Some(absorbed) = ctx.get("aggregation.absorbed_labels").ok().map(label_names) {
        if !absorbed.is_empty() {
            line.push_str(&format!(" [{}]", absorbed.join(", ")));
        }
    }
    Ok(line)
}

fn label_names(value: &Value) -> Vec<&str> {
    value
        .as_array()
        .map(|labels| {
            labels
                .iter()
                .filter_map(|l| l.get("name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// Most provider actions are already past participles; the rest read as verbs.
fn past_tense(action: &str) -> String {
    match action {
        "submitted" | "created" | "edited" | "deleted" | "published" | "opened" | "closed"
        | "reopened" | "assigned" | "unassigned" | "added" | "removed" | "dismissed" => {
            action.to_string()
        }
        "ready_for_review" => "marked as ready for review".to_string(),
        "converted_to_draft" => "converted to draft".to_string(),
        other => other.replace('_', " "),
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

/// Dotted-path lookups that report the missing variable.
struct Ctx<'a> {
    template: &'a TemplateId,
    context: &'a RenderContext,
}

impl<'a> Ctx<'a> {
    fn get(&self, path: &str) -> Result<&'a Value, RenderError> {
        let mut parts = path.split('.');
        let mut value = parts.next().and_then(|head| self.context.get(head));
        for part in parts {
            value = value.and_then(|v| v.get(part));
        }
        value
            .filter(|v| !v.is_null())
            .ok_or_else(|| RenderError::MissingVariable {
                template: self.template.clone(),
                variable: path.to_string(),
            })
    }

    fn str(&self, path: &str) -> Result<&'a str, RenderError> {
        self.get(path)?
            .as_str()
            .ok_or_else(|| RenderError::MissingVariable {
                template: self.template.clone(),
                variable: path.to_string(),
            })
    }

    fn num(&self, path: &str) -> Result<u64, RenderError> {
        self.get(path)?
            .as_u64()
            .ok_or_else(|| RenderError::MissingVariable {
                template: self.template.clone(),
                variable: path.to_string(),
            })
    }

    fn opt_str(&self, path: &str) -> Option<&'a str> {
        self.get(path).ok().and_then(Value::as_str)
    }

    fn opt_bool(&self, path: &str) -> bool {
        self.get(path).ok().and_then(Value::as_bool).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> RenderContext {
        value.as_object().cloned().unwrap()
    }

    fn tpl(id: &str) -> TemplateId {
        TemplateId::new(id).unwrap()
    }

    #[test]
    fn renders_label_aggregate() {
        let context = ctx(json!({
            "sender": {"login": "mona"},
            "issue": {"number": 7, "title": "Crash on start"},
            "aggregation": {
                "added_labels": [{"name": "bug"}, {"name": "urgent"}],
                "removed_labels": [{"name": "triage"}],
            },
        }));
        let text = SummaryRenderer
            .render(&tpl("issues/x_label_aggregate"), &context)
            .unwrap();
        assert_eq!(
            text,
            "mona added bug and urgent and removed triage on issue #7 Crash on start"
        );
    }

    #[test]
    fn renders_milestone_change() {
        let context = ctx(json!({
            "sender": {"login": "mona"},
            "pull_request": {"number": 3, "title": "Faster"},
            "aggregation": {"from": {"title": "v1"}, "to": {"title": "v2"}},
        }));
        let text = SummaryRenderer
            .render(&tpl("pull_request/x_milestone_changed"), &context)
            .unwrap();
        assert_eq!(text, "mona moved pull request from v1 to v2: #3 Faster");
    }

    #[test]
    fn comment_with_state_change_mentions_it() {
        let context = ctx(json!({
            "sender": {"login": "mona"},
            "issue": {"number": 9, "title": "Typo"},
            "aggregation": {"closed": true, "reopened": false},
        }));
        let text = SummaryRenderer
            .render(&tpl("issue_comment/created"), &context)
            .unwrap();
        assert_eq!(text, "mona created a comment on #9 Typo and closed it");
    }

    #[test]
    fn push_uses_branch_name() {
        let context = ctx(json!({
            "sender": {"login": "mona"},
            "repository": {"full_name": "octo/widgets"},
            "ref": "refs/heads/main",
            "ref_info": {"name": "main"},
            "size": 2,
        }));
        let text = SummaryRenderer.render(&tpl("push"), &context).unwrap();
        assert_eq!(text, "mona pushed 2 commits to main in octo/widgets");
    }

    #[test]
    fn unknown_template_is_an_error() {
        let err = SummaryRenderer
            .render(&tpl("push_compact"), &RenderContext::new())
            .unwrap_err();
        assert!(matches!(err, RenderError::TemplateNotFound { .. }));
    }

    #[test]
    fn missing_variable_names_the_path() {
        let context = ctx(json!({"sender": {"login": "mona"}}));
        let err = SummaryRenderer
            .render(&tpl("issues/closed"), &context)
            .unwrap_err();
        match err {
            RenderError::MissingVariable { variable, .. } => assert_eq!(variable, "issue.number"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
