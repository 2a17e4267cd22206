//! Remediation: turn validated edits into a branch and a pull request.
//!
//! ```text
//! Idle → BranchCreated → Committed → Pushed → RemediationOpened
//!   ↘          ↘             ↘          ↘
//!                    Failed(step)
//! ```
//!
//! Writes are never retried. A failure at any step is terminal and is
//! reported in the published comment; nothing is rolled back, so a failed
//! run may leave an orphaned branch behind.

use std::fmt;

use chrono::{DateTime, Utc};
use prwarden_core::{
    FileEdit, Instruction, RemediationBranch, RemediationConfig, RemediationPr, SubjectKind,
    SubjectMetadata, SubjectRef,
};
use prwarden_github::{with_read_retry, Platform, PullRequestSpec, RetryPolicy};
use serde::Serialize;

/// Step whose failure stopped a remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStep {
    CreateBranch,
    Commit,
    Push,
    OpenPullRequest,
}

impl fmt::Display for RemediationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemediationStep::CreateBranch => write!(f, "branch creation"),
            RemediationStep::Commit => write!(f, "commit"),
            RemediationStep::Push => write!(f, "push"),
            RemediationStep::OpenPullRequest => write!(f, "pull request creation"),
        }
    }
}

/// Remediation state. `RemediationOpened` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationState {
    Idle,
    BranchCreated {
        branch: String,
        base_sha: String,
    },
    Committed {
        branch: String,
        commit_sha: String,
    },
    Pushed(RemediationBranch),
    RemediationOpened {
        branch: RemediationBranch,
        pull_request: RemediationPr,
    },
    Failed {
        step: RemediationStep,
        reason: String,
    },
}

impl RemediationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemediationState::RemediationOpened { .. } | RemediationState::Failed { .. }
        )
    }

    fn name(&self) -> &'static str {
        match self {
            RemediationState::Idle => "idle",
            RemediationState::BranchCreated { .. } => "branch_created",
            RemediationState::Committed { .. } => "committed",
            RemediationState::Pushed(_) => "pushed",
            RemediationState::RemediationOpened { .. } => "remediation_opened",
            RemediationState::Failed { .. } => "failed",
        }
    }
}

/// What the published comment reports about remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RemediationOutcome {
    /// Not fix mode, or no edits.
    NotAttempted,
    /// Fix mode with edits, but remediation is turned off.
    Disabled,
    Opened {
        branch: RemediationBranch,
        pull_request: RemediationPr,
    },
    NotCreated {
        step: RemediationStep,
        reason: String,
    },
}

impl RemediationOutcome {
    pub fn pull_request(&self) -> Option<&RemediationPr> {
        match self {
            RemediationOutcome::Opened { pull_request, .. } => Some(pull_request),
            _ => None,
        }
    }
}

impl From<RemediationState> for RemediationOutcome {
    fn from(state: RemediationState) -> Self {
        match state {
            RemediationState::RemediationOpened {
                branch,
                pull_request,
            } => RemediationOutcome::Opened {
                branch,
                pull_request,
            },
            RemediationState::Failed { step, reason } => {
                RemediationOutcome::NotCreated { step, reason }
            }
            _ => RemediationOutcome::NotAttempted,
        }
    }
}

/// Inputs for one remediation.
pub struct RemediationRequest<'a> {
    pub subject: &'a SubjectRef,
    pub metadata: &'a SubjectMetadata,
    pub instruction: &'a Instruction,
    pub actor: &'a str,
    pub edits: &'a [FileEdit],
    pub started_at: DateTime<Utc>,
}

/// Name of the remediation branch: `{source}-fix-{timestamp}`.
///
/// Millisecond resolution keeps names unique across runs on one subject.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use prwarden_review::remediation::branch_name;
///
/// let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
/// assert_eq!(branch_name("feature/parser", at), "feature/parser-fix-20260301123005000");
/// ```
pub fn branch_name(source_ref: &str, at: DateTime<Utc>) -> String {
    format!("{source_ref}-fix-{}", at.format("%Y%m%d%H%M%S%3f"))
}

/// Drives the remediation state machine against a [`Platform`].
pub struct Remediator<'a> {
    platform: &'a dyn Platform,
    config: &'a RemediationConfig,
    retry: RetryPolicy,
}

impl<'a> Remediator<'a> {
    pub fn new(platform: &'a dyn Platform, config: &'a RemediationConfig, retry: RetryPolicy) -> Self {
        Self {
            platform,
            config,
            retry,
        }
    }

    /// Run from `Idle` to a terminal state.
    ///
    /// Returns `Idle` unchanged when there is nothing to apply.
    pub async fn run(&self, request: &RemediationRequest<'_>) -> RemediationState {
        if request.edits.is_empty() {
            return RemediationState::Idle;
        }
        let branch = branch_name(&request.metadata.source_ref, request.started_at);
        let mut state = RemediationState::Idle;
        while !state.is_terminal() {
            let next = self.advance(state, &branch, request).await;
            tracing::info!(state = next.name(), branch = %branch, "remediation step");
            state = next;
        }
        if let RemediationState::Failed { step, reason } = &state {
            tracing::error!(%step, %reason, branch = %branch, "remediation failed");
        }
        state
    }

    async fn advance(
        &self,
        state: RemediationState,
        branch: &str,
        request: &RemediationRequest<'_>,
    ) -> RemediationState {
        let subject = request.subject;
        let source = &request.metadata.source_ref;
        match state {
            RemediationState::Idle => {
                let tip = match with_read_retry("resolve branch tip", self.retry, || {
                    self.platform.branch_tip(subject, source)
                })
                .await
                {
                    Ok(sha) => sha,
                    Err(e) => return failed(RemediationStep::CreateBranch, e),
                };
                match self.platform.create_branch(subject, branch, &tip).await {
                    Ok(()) => RemediationState::BranchCreated {
                        branch: branch.to_string(),
                        base_sha: tip,
                    },
                    Err(e) => failed(RemediationStep::CreateBranch, e),
                }
            }
            RemediationState::BranchCreated { branch, base_sha } => {
                let message = commit_message(request);
                match self
                    .platform
                    .commit_files(subject, &base_sha, request.edits, &message)
                    .await
                {
                    Ok(commit_sha) => RemediationState::Committed { branch, commit_sha },
                    Err(e) => failed(RemediationStep::Commit, e),
                }
            }
            RemediationState::Committed { branch, commit_sha } => {
                match self.platform.update_branch(subject, &branch, &commit_sha).await {
                    Ok(()) => RemediationState::Pushed(RemediationBranch {
                        name: branch,
                        base_ref: source.clone(),
                        commit_sha,
                    }),
                    Err(e) => failed(RemediationStep::Push, e),
                }
            }
            RemediationState::Pushed(branch) => {
                let spec = PullRequestSpec {
                    title: format!("Automated fixes for #{}", subject.number),
                    head: branch.name.clone(),
                    base: branch.base_ref.clone(),
                    body: pull_request_body(request),
                    draft: false,
                };
                match self.platform.open_pull_request(subject, &spec).await {
                    Ok(pull_request) => {
                        self.label(subject, pull_request.number).await;
                        RemediationState::RemediationOpened {
                            branch,
                            pull_request,
                        }
                    }
                    Err(e) => failed(RemediationStep::OpenPullRequest, e),
                }
            }
            terminal => terminal,
        }
    }

    async fn label(&self, subject: &SubjectRef, number: u64) {
        if self.config.labels.is_empty() {
            return;
        }
        if let Err(e) = self
            .platform
            .add_labels(subject, number, &self.config.labels)
            .await
        {
            tracing::warn!(pr = number, error = %e, "could not label remediation pull request");
        }
    }
}

fn failed(step: RemediationStep, error: impl fmt::Display) -> RemediationState {
    RemediationState::Failed {
        step,
        reason: error.to_string(),
    }
}

fn commit_message(request: &RemediationRequest<'_>) -> String {
    let mut message = format!(
        "Automated fixes for #{}\n\nRequested by @{}: {}\n",
        request.subject.number, request.actor, request.instruction.command
    );
    for edit in request.edits {
        match &edit.description {
            Some(d) => message.push_str(&format!("\n- {}: {d}", edit.path)),
            None => message.push_str(&format!("\n- {}", edit.path)),
        }
    }
    message
}

fn pull_request_body(request: &RemediationRequest<'_>) -> String {
    let kind = match request.metadata.kind {
        SubjectKind::PullRequest => "pull request",
        SubjectKind::Issue => "issue",
    };
    let mut body = format!(
        "Automated fixes for {kind} #{}, requested by @{}.\n\n\
         **Request:** {}\n\n### Changed files\n",
        request.subject.number, request.actor, request.instruction.command
    );
    for edit in request.edits {
        match &edit.description {
            Some(d) => body.push_str(&format!("\n- `{}`: {d}", edit.path)),
            None => body.push_str(&format!("\n- `{}`", edit.path)),
        }
    }
    body.push_str(
        "\n\n---\n⚠️ These changes were generated automatically and require human review \
         before merging.",
    );
    body
}
