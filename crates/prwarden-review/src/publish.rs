use prwarden_core::{Instruction, Mode, SubjectKind, SubjectRef, Trigger, WardenError};
use prwarden_github::{IssueComment, Platform, PostedComment};
use sha2::{Digest, Sha256};

use crate::analysis::AnalysisOutcome;
use crate::remediation::RemediationOutcome;

/// Prefix of the hidden marker appended to every published comment.
pub const RUN_MARKER_PREFIX: &str = "<!-- prwarden-run:";

/// Narrative posted for a pull request with nothing reviewable.
pub const NO_FILES_NARRATIVE: &str =
    "No files to review: the pull request has no added or modified files.";

/// Stable key for a trigger: repeated delivery of the same event yields the
/// same key.
///
/// # Examples
///
/// ```
/// use prwarden_core::{EventKind, Instruction, Mode, SubjectRef, Trigger};
/// use prwarden_review::publish::idempotency_key;
///
/// let trigger = Trigger {
///     event_kind: EventKind::IssueComment,
///     raw_text: Some("@claude review".into()),
///     actor: "dev".into(),
///     subject: None,
///     delivery_id: Some("42".into()),
/// };
/// let subject = SubjectRef::new("octo", "app", 7);
/// let instruction = Instruction { command: "review".into(), mode: Mode::Review };
/// let key = idempotency_key(&trigger, &subject, &instruction);
/// assert_eq!(key.len(), 16);
/// assert_eq!(key, idempotency_key(&trigger, &subject, &instruction));
/// ```
pub fn idempotency_key(trigger: &Trigger, subject: &SubjectRef, instruction: &Instruction) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject.to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(trigger.event_kind.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(trigger.delivery_id.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"\0");
    hasher.update(instruction.command.as_bytes());
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// The hidden marker for a key.
pub fn run_marker(key: &str) -> String {
    format!("{RUN_MARKER_PREFIX}{key} -->")
}

/// Returns the first comment already carrying the marker for `key`.
pub fn find_published<'c>(comments: &'c [IssueComment], key: &str) -> Option<&'c IssueComment> {
    let marker = run_marker(key);
    comments.iter().find(|c| c.body.contains(&marker))
}

/// Everything the single published comment reports.
pub struct Publication<'a> {
    pub instruction: &'a Instruction,
    pub subject_kind: SubjectKind,
    pub analysis: &'a AnalysisOutcome,
    pub remediation: &'a RemediationOutcome,
    /// Mention phrase, quoted in escalation hints.
    pub phrase: &'a str,
    pub key: &'a str,
}

/// Compose the comment body: narrative, mode footer, hidden marker.
///
/// # Examples
///
/// ```
/// use prwarden_core::{AnalysisResult, Instruction, Mode, SubjectKind};
/// use prwarden_review::analysis::AnalysisOutcome;
/// use prwarden_review::publish::{compose_comment, Publication};
/// use prwarden_review::remediation::RemediationOutcome;
///
/// let instruction = Instruction { command: "plan the rollout".into(), mode: Mode::Plan };
/// let analysis = AnalysisOutcome::Completed(AnalysisResult::narrative_only("Step 1: ..."));
/// let body = compose_comment(&Publication {
///     instruction: &instruction,
///     subject_kind: SubjectKind::Issue,
///     analysis: &analysis,
///     remediation: &RemediationOutcome::NotAttempted,
///     phrase: "@claude",
///     key: "0123456789abcdef",
/// });
/// assert!(body.contains("Step 1: ..."));
/// assert!(body.contains("No changes were applied"));
/// assert!(body.ends_with("<!-- prwarden-run:0123456789abcdef -->"));
/// ```
pub fn compose_comment(publication: &Publication<'_>) -> String {
    let mode = publication.instruction.mode;
    let title = match mode {
        Mode::Review => "Review",
        Mode::Plan => "Plan",
        Mode::Fix => "Fix",
    };
    let mut body = format!("## 🤖 {title}\n\n");

    match publication.analysis {
        AnalysisOutcome::Failed { reason } => {
            body.push_str(&format!(
                "⚠️ **Analysis failed.** The reasoning service could not complete the request \
                 `{}`: {reason}\n\nNo changes were made. Comment again to retry.",
                publication.instruction.command
            ));
        }
        AnalysisOutcome::Completed(result) => {
            body.push_str(result.narrative.trim());
            body.push_str("\n\n---\n\n");
            body.push_str(&footer(publication));
        }
    }

    body.push_str("\n\n");
    body.push_str(&run_marker(publication.key));
    body
}

fn footer(publication: &Publication<'_>) -> String {
    let phrase = publication.phrase;
    match publication.instruction.mode {
        Mode::Review => format!(
            "💡 To have changes implemented, comment `{phrase} fix <what to change>`. \
             To discuss an approach first, comment `{phrase} plan <topic>`."
        ),
        Mode::Plan => format!(
            "📋 Planning only. No changes were applied to the {}. \
             When you are ready, comment `{phrase} implement <the plan>` to request changes.",
            publication.subject_kind
        ),
        Mode::Fix => match publication.remediation {
            RemediationOutcome::Opened {
                branch,
                pull_request,
            } => format!(
                "🔧 Changes were committed to `{}` and proposed in #{} ({}).\n\n\
                 **Human review required:** nothing has been merged.",
                branch.name, pull_request.number, pull_request.html_url
            ),
            RemediationOutcome::NotCreated { step, reason } => format!(
                "⚠️ **Remediation branch not created.** The {step} step failed: {reason}\n\n\
                 The analysis above still stands; apply the changes manually or comment again."
            ),
            RemediationOutcome::Disabled => "Automatic remediation is disabled for this \
                 repository. The proposed changes were not applied."
                .to_string(),
            RemediationOutcome::NotAttempted => {
                "No file changes were proposed, so no remediation branch was created.".to_string()
            }
        },
    }
}

/// Posts the composed comment. Exactly one attempt per run.
pub struct ResultPublisher<'a> {
    platform: &'a dyn Platform,
}

impl<'a> ResultPublisher<'a> {
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self { platform }
    }

    /// # Errors
    ///
    /// Returns [`WardenError::Platform`] if the comment cannot be posted.
    pub async fn publish(&self, subject: &SubjectRef, body: &str) -> Result<PostedComment, WardenError> {
        let posted = self.platform.post_comment(subject, body).await.map_err(|e| {
            tracing::error!(subject = %subject, error = %e, "failed to publish result");
            WardenError::from(e)
        })?;
        tracing::info!(subject = %subject, url = %posted.html_url, "result published");
        Ok(posted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remediation::RemediationStep;
    use prwarden_core::{AnalysisResult, EventKind, RemediationBranch, RemediationPr};

    fn instruction(mode: Mode) -> Instruction {
        Instruction {
            command: "do the thing".into(),
            mode,
        }
    }

    fn compose(mode: Mode, analysis: AnalysisOutcome, remediation: RemediationOutcome) -> String {
        let instruction = instruction(mode);
        compose_comment(&Publication {
            instruction: &instruction,
            subject_kind: SubjectKind::PullRequest,
            analysis: &analysis,
            remediation: &remediation,
            phrase: "@claude",
            key: "feedfacecafebeef",
        })
    }

    fn done(text: &str) -> AnalysisOutcome {
        AnalysisOutcome::Completed(AnalysisResult::narrative_only(text))
    }

    #[test]
    fn review_footer_explains_escalation() {
        let body = compose(Mode::Review, done("Found a bug."), RemediationOutcome::NotAttempted);
        assert!(body.starts_with("## 🤖 Review"));
        assert!(body.contains("Found a bug."));
        assert!(body.contains("`@claude fix <what to change>`"));
        assert!(body.contains("`@claude plan <topic>`"));
    }

    #[test]
    fn plan_footer_says_nothing_applied() {
        let body = compose(Mode::Plan, done("1. ..."), RemediationOutcome::NotAttempted);
        assert!(body.contains("No changes were applied to the pull request"));
        assert!(body.contains("`@claude implement"));
    }

    #[test]
    fn fix_footer_links_remediation() {
        let opened = RemediationOutcome::Opened {
            branch: RemediationBranch {
                name: "feature-fix-1".into(),
                base_ref: "feature".into(),
                commit_sha: "c0ffee".into(),
            },
            pull_request: RemediationPr {
                number: 8,
                html_url: "https://github.com/octo/app/pull/8".into(),
            },
        };
        let body = compose(Mode::Fix, done("Fixed."), opened);
        assert!(body.contains("#8 (https://github.com/octo/app/pull/8)"));
        assert!(body.contains("`feature-fix-1`"));
        assert!(body.contains("Human review required"));
    }

    #[test]
    fn fix_footer_reports_failure() {
        let failed = RemediationOutcome::NotCreated {
            step: RemediationStep::Push,
            reason: "HTTP 403: forbidden".into(),
        };
        let body = compose(Mode::Fix, done("Fixed."), failed);
        assert!(body.contains("Remediation branch not created"));
        assert!(body.contains("push step failed: HTTP 403: forbidden"));
        assert!(!body.contains("Human review required"));
    }

    #[test]
    fn fix_footer_disabled_and_without_edits() {
        let body = compose(Mode::Fix, done("Fixed."), RemediationOutcome::Disabled);
        assert!(body.contains("remediation is disabled"));
        let body = compose(Mode::Fix, done("Nothing to do."), RemediationOutcome::NotAttempted);
        assert!(body.contains("no remediation branch was created"));
    }

    #[test]
    fn failed_analysis_comment() {
        let failed = AnalysisOutcome::Failed {
            reason: "request timed out".into(),
        };
        let body = compose(Mode::Fix, failed, RemediationOutcome::NotAttempted);
        assert!(body.contains("Analysis failed"));
        assert!(body.contains("request timed out"));
        assert!(body.contains("`do the thing`"));
        assert!(body.ends_with(&run_marker("feedfacecafebeef")));
    }

    #[test]
    fn key_depends_on_delivery() {
        let subject = SubjectRef::new("octo", "app", 1);
        let instruction = instruction(Mode::Review);
        let mut trigger = Trigger {
            event_kind: EventKind::IssueComment,
            raw_text: None,
            actor: "dev".into(),
            subject: None,
            delivery_id: Some("1".into()),
        };
        let first = idempotency_key(&trigger, &subject, &instruction);
        trigger.delivery_id = Some("2".into());
        assert_ne!(first, idempotency_key(&trigger, &subject, &instruction));
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn find_published_matches_marker() {
        let comments = vec![
            IssueComment {
                id: 1,
                author: "dev".into(),
                body: "@claude review".into(),
                created_at: String::new(),
            },
            IssueComment {
                id: 2,
                author: "github-actions[bot]".into(),
                body: format!("done\n\n{}", run_marker("abc")),
                created_at: String::new(),
            },
        ];
        assert_eq!(find_published(&comments, "abc").map(|c| c.id), Some(2));
        assert!(find_published(&comments, "abd").is_none());
    }
}
