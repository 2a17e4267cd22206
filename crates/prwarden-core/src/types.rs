use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of inbound event that produced a [`Trigger`].
///
/// # Examples
///
/// ```
/// use prwarden_core::EventKind;
///
/// assert!(EventKind::IssueComment.is_comment());
/// assert!(!EventKind::PullRequestOpened.is_comment());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A comment on an issue or on a pull request's conversation tab.
    IssueComment,
    /// An inline comment on a pull request diff.
    ReviewComment,
    /// A pull request was opened, reopened, or received new commits.
    PullRequestOpened,
    /// An issue was opened.
    IssueOpened,
    /// A trigger assembled by hand on the command line.
    Manual,
}

impl EventKind {
    /// Returns `true` for events whose text must carry the mention marker.
    pub fn is_comment(self) -> bool {
        matches!(
            self,
            EventKind::IssueComment | EventKind::ReviewComment | EventKind::Manual
        )
    }

    /// Stable identifier, used in logs and the idempotency key.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::IssueComment => "issue_comment",
            EventKind::ReviewComment => "review_comment",
            EventKind::PullRequestOpened => "pull_request",
            EventKind::IssueOpened => "issues",
            EventKind::Manual => "manual",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "issue_comment" | "comment" => Ok(EventKind::IssueComment),
            "review_comment" | "pull_request_review_comment" => Ok(EventKind::ReviewComment),
            "pull_request" | "pull_request_target" => Ok(EventKind::PullRequestOpened),
            "issues" | "issue" => Ok(EventKind::IssueOpened),
            "manual" => Ok(EventKind::Manual),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

/// Repository-qualified identifier of a pull request or issue.
///
/// # Examples
///
/// ```
/// use prwarden_core::SubjectRef;
///
/// let subject = SubjectRef::new("octocat", "hello-world", 42);
/// assert_eq!(subject.to_string(), "octocat/hello-world#42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    /// Repository owner (user or organization).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Pull request or issue number.
    pub number: u64,
}

impl SubjectRef {
    /// Build a subject reference.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// An inbound event that may carry an instruction.
///
/// Created once per run and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// What kind of event this is.
    pub event_kind: EventKind,
    /// Comment or description text; absent for bare open/update events.
    pub raw_text: Option<String>,
    /// Login of the account that caused the event.
    pub actor: String,
    /// Target pull request or issue, if it could be determined.
    pub subject: Option<SubjectRef>,
    /// Platform identifier of this delivery (comment id or workflow run id).
    pub delivery_id: Option<String>,
}

/// Operating mode for a run.
///
/// `fix` is the canonical name for the remediation mode; `implement` is
/// accepted as an alias when parsing.
///
/// # Examples
///
/// ```
/// use prwarden_core::Mode;
///
/// let m: Mode = serde_json::from_str("\"implement\"").unwrap();
/// assert_eq!(m, Mode::Fix);
/// assert_eq!(Mode::Plan.to_string(), "plan");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Analysis only.
    Review,
    /// Discussion without code; no files are sent.
    Plan,
    /// Analysis plus optional remediation branch and pull request.
    #[serde(alias = "implement")]
    Fix,
}

impl Mode {
    /// Whether this mode may produce file edits.
    pub fn allows_edits(self) -> bool {
        self == Mode::Fix
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Review => write!(f, "review"),
            Mode::Plan => write!(f, "plan"),
            Mode::Fix => write!(f, "fix"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "review" => Ok(Mode::Review),
            "plan" => Ok(Mode::Plan),
            "fix" | "implement" => Ok(Mode::Fix),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Normalized command plus the mode derived from it.
///
/// Exactly one is derived per classified [`Trigger`]; the mode never changes
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// The command text with the mention marker stripped and whitespace collapsed.
    pub command: String,
    /// Operating mode.
    pub mode: Mode,
}

/// Whether the subject is a pull request or a plain issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    PullRequest,
    Issue,
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKind::PullRequest => write!(f, "pull request"),
            SubjectKind::Issue => write!(f, "issue"),
        }
    }
}

/// Metadata describing the subject of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMetadata {
    /// Subject number.
    pub number: u64,
    /// Pull request or issue.
    pub kind: SubjectKind,
    /// Title.
    pub title: String,
    /// Description body, if any.
    pub body: Option<String>,
    /// Author login.
    pub author: String,
    /// Prior state (`open`, `closed`, `merged`).
    pub state: String,
    /// Source branch. For issues this is the repository default branch.
    pub source_ref: String,
    /// Base branch. For issues this is the repository default branch.
    pub base_ref: String,
    /// Head commit of the source branch, when known.
    pub head_sha: Option<String>,
    /// Browser URL.
    pub html_url: Option<String>,
}

/// A changed file with its diff and (when available) full content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedFile {
    /// Path relative to the repository root.
    pub path: String,
    /// Platform change status (`added`, `modified`, `renamed`, ...).
    pub status: String,
    /// Lines added.
    pub additions: u64,
    /// Lines deleted.
    pub deletions: u64,
    /// Unified diff for the file, if the platform provided one.
    pub patch: Option<String>,
    /// File content at the head commit. `None` when it could not be read.
    pub content: Option<String>,
}

impl ChangedFile {
    /// Bytes this file contributes to the assembled context.
    pub fn size(&self) -> usize {
        self.patch.as_ref().map_or(0, String::len) + self.content.as_ref().map_or(0, String::len)
    }
}

/// Why a changed file was left out of the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum OmitReason {
    /// Dependency lock file.
    LockFile,
    /// Matched a configured skip pattern.
    Pattern(String),
    /// The file alone exceeds the per-file size bound.
    TooLarge(usize),
    /// The total context budget was already spent.
    BudgetExhausted,
}

impl fmt::Display for OmitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OmitReason::LockFile => write!(f, "lock file"),
            OmitReason::Pattern(p) => write!(f, "matches skip pattern `{p}`"),
            OmitReason::TooLarge(bytes) => write!(f, "too large ({bytes} bytes)"),
            OmitReason::BudgetExhausted => write!(f, "context size limit reached"),
        }
    }
}

/// A changed file that was not sent to the reasoning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OmittedFile {
    pub path: String,
    pub reason: OmitReason,
}

/// An earlier mention command found on the subject's discussion thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorCommand {
    pub author: String,
    pub command: String,
}

/// Everything the reasoning service gets to see for one run.
///
/// `files` is always empty in [`Mode::Plan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewContext {
    /// Subject metadata.
    pub subject: SubjectMetadata,
    /// Changed files in platform order.
    pub files: Vec<ChangedFile>,
    /// Files left out, with the reason.
    pub omitted: Vec<OmittedFile>,
    /// Free-form notes about degraded context (e.g. unreadable content).
    pub notes: Vec<String>,
    /// Earlier mention commands, oldest first.
    pub history: Vec<PriorCommand>,
    /// Mode the context was assembled for.
    pub mode: Mode,
}

/// A complete replacement of one file's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    /// Path relative to the repository root.
    pub path: String,
    /// The full new content.
    pub content: String,
    /// Short description of the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Interpreted output of the reasoning service.
///
/// Whether there are changes is derived from `edits` only; the narrative is
/// never inspected for that purpose.
///
/// # Examples
///
/// ```
/// use prwarden_core::AnalysisResult;
///
/// let result = AnalysisResult::narrative_only("I have fixed the bug.");
/// assert!(!result.has_changes());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Human-readable analysis.
    pub narrative: String,
    /// Structured edits, only ever non-empty in fix mode.
    pub edits: Vec<FileEdit>,
}

impl AnalysisResult {
    /// A result without edits.
    pub fn narrative_only(narrative: impl Into<String>) -> Self {
        Self {
            narrative: narrative.into(),
            edits: Vec::new(),
        }
    }

    /// `true` iff concrete edits are present.
    pub fn has_changes(&self) -> bool {
        !self.edits.is_empty()
    }
}

/// A branch created to carry proposed edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationBranch {
    /// Branch name, `{source}-fix-{timestamp}`.
    pub name: String,
    /// Branch the remediation was cut from and targets.
    pub base_ref: String,
    /// Commit carrying the edits.
    pub commit_sha: String,
}

/// A pull request opened for a remediation branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationPr {
    pub number: u64,
    pub html_url: String,
}

/// Output format for CLI subcommands.
///
/// # Examples
///
/// ```
/// use prwarden_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
