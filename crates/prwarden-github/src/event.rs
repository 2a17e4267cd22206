//! Webhook payload parsing.
//!
//! Turns a GitHub event (name + JSON payload, as exposed to workflow runs
//! through `GITHUB_EVENT_NAME` / `GITHUB_EVENT_PATH`) into a [`Trigger`].

use prwarden_core::{EventKind, SubjectRef, Trigger, WardenError};
use serde_json::Value;

const PULL_REQUEST_ACTIONS: &[&str] = &["opened", "reopened", "synchronize", "ready_for_review"];

/// Parse an event payload into a trigger.
///
/// Returns `Ok(None)` for events and actions that never produce a run
/// (pushes, comment edits, closed pull requests, ...). A payload without a
/// usable subject number still yields a trigger with `subject: None`; the
/// pipeline decides whether that is fatal once the text has been classified.
/// `fallback_repo` (`owner/repo`) is used when the payload has no
/// `repository.full_name`; `run_id` becomes the delivery id when the event
/// is not a comment.
///
/// # Errors
///
/// Returns [`WardenError::Input`] if no repository can be determined.
///
/// # Examples
///
/// ```
/// use prwarden_core::EventKind;
/// use prwarden_github::event::trigger_from_event;
///
/// let payload = serde_json::json!({
///     "action": "created",
///     "repository": { "full_name": "octo/app" },
///     "issue": { "number": 7 },
///     "comment": { "id": 99, "body": "@claude review", "user": { "login": "dev" } },
///     "sender": { "login": "dev" }
/// });
/// let trigger = trigger_from_event("issue_comment", &payload, None, None)
///     .unwrap()
///     .unwrap();
/// assert_eq!(trigger.event_kind, EventKind::IssueComment);
/// assert_eq!(trigger.subject.unwrap().number, 7);
/// ```
pub fn trigger_from_event(
    event_name: &str,
    payload: &Value,
    fallback_repo: Option<&str>,
    run_id: Option<&str>,
) -> Result<Option<Trigger>, WardenError> {
    let action = payload.get("action").and_then(Value::as_str).unwrap_or("");

    let (event_kind, subject_key, text, actor, delivery_id) = match event_name {
        "issue_comment" | "pull_request_review_comment" => {
            if action != "created" {
                return Ok(None);
            }
            let comment = payload.get("comment");
            let kind = if event_name == "issue_comment" {
                EventKind::IssueComment
            } else {
                EventKind::ReviewComment
            };
            let subject_key = if event_name == "issue_comment" {
                "issue"
            } else {
                "pull_request"
            };
            (
                kind,
                subject_key,
                comment.and_then(|c| str_at(c, &["body"])),
                comment
                    .and_then(|c| str_at(c, &["user", "login"]))
                    .or_else(|| str_at(payload, &["sender", "login"])),
                comment
                    .and_then(|c| c.get("id"))
                    .and_then(Value::as_u64)
                    .map(|id| id.to_string()),
            )
        }
        "pull_request" | "pull_request_target" => {
            if !PULL_REQUEST_ACTIONS.contains(&action) {
                return Ok(None);
            }
            (
                EventKind::PullRequestOpened,
                "pull_request",
                payload
                    .get("pull_request")
                    .and_then(|p| str_at(p, &["body"])),
                str_at(payload, &["sender", "login"]),
                run_id.map(str::to_string),
            )
        }
        "issues" => {
            if action != "opened" {
                return Ok(None);
            }
            (
                EventKind::IssueOpened,
                "issue",
                payload.get("issue").and_then(|i| str_at(i, &["body"])),
                str_at(payload, &["sender", "login"]),
                run_id.map(str::to_string),
            )
        }
        other => {
            tracing::debug!(event = other, "ignoring unsupported event");
            return Ok(None);
        }
    };

    let full_name = str_at(payload, &["repository", "full_name"])
        .or_else(|| fallback_repo.map(str::to_string))
        .ok_or_else(|| {
            WardenError::Input("cannot determine repository; set GITHUB_REPOSITORY".into())
        })?;
    let (owner, repo) = split_repo(&full_name)?;

    let subject = payload
        .get(subject_key)
        .and_then(|s| s.get("number"))
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .map(|number| SubjectRef::new(owner.clone(), repo.clone(), number));

    Ok(Some(Trigger {
        event_kind,
        raw_text: text,
        actor: actor.unwrap_or_default(),
        subject,
        delivery_id,
    }))
}

/// Split `owner/repo` into its parts.
///
/// # Errors
///
/// Returns [`WardenError::Input`] if the value is not of the form `owner/repo`.
///
/// # Examples
///
/// ```
/// use prwarden_github::event::split_repo;
///
/// let (owner, repo) = split_repo("rust-lang/rust").unwrap();
/// assert_eq!(owner, "rust-lang");
/// assert_eq!(repo, "rust");
/// assert!(split_repo("rust").is_err());
/// ```
pub fn split_repo(full_name: &str) -> Result<(String, String), WardenError> {
    match full_name.trim().split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(WardenError::Input(format!(
            "invalid repository '{full_name}', expected owner/repo"
        ))),
    }
}

fn str_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn issue_comment_on_pull_request() {
        let payload = json!({
            "action": "created",
            "repository": { "full_name": "octo/app" },
            "issue": { "number": 12, "pull_request": { "url": "..." } },
            "comment": { "id": 5, "body": "@claude fix it", "user": { "login": "alice" } },
            "sender": { "login": "alice" }
        });
        let trigger = trigger_from_event("issue_comment", &payload, None, Some("777"))
            .unwrap()
            .unwrap();
        assert_eq!(trigger.event_kind, EventKind::IssueComment);
        assert_eq!(trigger.raw_text.as_deref(), Some("@claude fix it"));
        assert_eq!(trigger.actor, "alice");
        assert_eq!(trigger.delivery_id.as_deref(), Some("5"));
        assert_eq!(trigger.subject, Some(SubjectRef::new("octo", "app", 12)));
    }

    #[test]
    fn edited_comment_is_ignored() {
        let payload = json!({
            "action": "edited",
            "repository": { "full_name": "octo/app" },
            "issue": { "number": 12 },
            "comment": { "id": 5, "body": "@claude fix it", "user": { "login": "alice" } }
        });
        assert!(trigger_from_event("issue_comment", &payload, None, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn review_comment_targets_pull_request() {
        let payload = json!({
            "action": "created",
            "repository": { "full_name": "octo/app" },
            "pull_request": { "number": 3 },
            "comment": { "id": 8, "body": "@claude check this", "user": { "login": "bob" } }
        });
        let trigger = trigger_from_event("pull_request_review_comment", &payload, None, None)
            .unwrap()
            .unwrap();
        assert_eq!(trigger.event_kind, EventKind::ReviewComment);
        assert_eq!(trigger.subject.unwrap().number, 3);
    }

    #[test]
    fn pull_request_opened_uses_run_id() {
        let payload = json!({
            "action": "opened",
            "pull_request": { "number": 4, "body": null },
            "sender": { "login": "carol" }
        });
        let trigger = trigger_from_event("pull_request", &payload, Some("octo/app"), Some("42"))
            .unwrap()
            .unwrap();
        assert_eq!(trigger.event_kind, EventKind::PullRequestOpened);
        assert!(trigger.raw_text.is_none());
        assert_eq!(trigger.delivery_id.as_deref(), Some("42"));
        assert_eq!(trigger.subject, Some(SubjectRef::new("octo", "app", 4)));
    }

    #[test]
    fn closed_pull_request_is_ignored() {
        let payload = json!({ "action": "closed", "pull_request": { "number": 4 } });
        assert!(
            trigger_from_event("pull_request", &payload, Some("octo/app"), None)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn missing_number_leaves_subject_empty() {
        let payload = json!({
            "action": "created",
            "repository": { "full_name": "octo/app" },
            "issue": {},
            "comment": { "id": 1, "body": "@claude review", "user": { "login": "dave" } }
        });
        let trigger = trigger_from_event("issue_comment", &payload, None, None)
            .unwrap()
            .unwrap();
        assert!(trigger.subject.is_none());
    }

    #[test]
    fn missing_repository_is_an_input_error() {
        let payload = json!({
            "action": "opened",
            "issue": { "number": 1, "body": "@claude plan" }
        });
        let err = trigger_from_event("issues", &payload, None, None).unwrap_err();
        assert!(matches!(err, WardenError::Input(_)));
    }

    #[test]
    fn unsupported_event_is_ignored() {
        let payload = json!({ "ref": "refs/heads/main" });
        assert!(trigger_from_event("push", &payload, Some("octo/app"), None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn split_repo_rejects_extra_segments() {
        assert!(split_repo("a/b/c").is_err());
        assert!(split_repo("/b").is_err());
    }
}
