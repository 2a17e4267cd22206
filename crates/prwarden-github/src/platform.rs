use async_trait::async_trait;
use prwarden_core::{FileEdit, RemediationPr, SubjectMetadata, SubjectRef};
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// One entry of a pull request's changed-file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    /// `added`, `modified`, `removed`, `renamed`, ...
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
    /// Unified diff; absent for binary or very large files.
    pub patch: Option<String>,
}

/// A comment on a subject's discussion thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub author: String,
    pub body: String,
    /// RFC 3339 creation time, as reported by the platform.
    pub created_at: String,
}

/// Result of posting a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedComment {
    pub id: u64,
    pub html_url: String,
}

/// A pull request to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestSpec {
    pub title: String,
    /// Branch carrying the changes.
    pub head: String,
    /// Branch the changes should land on.
    pub base: String,
    pub body: String,
    pub draft: bool,
}

/// Operations the orchestration core needs from the hosting platform.
///
/// Every method is a single attempt. Callers wrap idempotent reads in
/// [`with_read_retry`](crate::retry::with_read_retry); writes are never
/// retried so that a failure cannot turn into a duplicate side effect.
/// Repository-level operations use the owner and repository of `subject`.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Fetch title, references, state and head commit of a subject.
    async fn subject(&self, subject: &SubjectRef) -> Result<SubjectMetadata, PlatformError>;

    /// List the files changed by a pull request, in platform order.
    async fn changed_files(&self, subject: &SubjectRef) -> Result<Vec<FileEntry>, PlatformError>;

    /// Read a file's content at `git_ref`.
    async fn file_content(
        &self,
        subject: &SubjectRef,
        path: &str,
        git_ref: &str,
    ) -> Result<String, PlatformError>;

    /// List the discussion comments of a subject, oldest first.
    async fn comments(&self, subject: &SubjectRef) -> Result<Vec<IssueComment>, PlatformError>;

    /// Post a discussion comment.
    async fn post_comment(
        &self,
        subject: &SubjectRef,
        body: &str,
    ) -> Result<PostedComment, PlatformError>;

    /// Current commit of `branch`.
    async fn branch_tip(&self, subject: &SubjectRef, branch: &str)
        -> Result<String, PlatformError>;

    /// Create `branch` pointing at `sha`.
    async fn create_branch(
        &self,
        subject: &SubjectRef,
        branch: &str,
        sha: &str,
    ) -> Result<(), PlatformError>;

    /// Create one commit on top of `parent_sha` replacing the given files.
    /// Returns the new commit SHA; no branch is moved.
    async fn commit_files(
        &self,
        subject: &SubjectRef,
        parent_sha: &str,
        edits: &[FileEdit],
        message: &str,
    ) -> Result<String, PlatformError>;

    /// Fast-forward `branch` to `sha`.
    async fn update_branch(
        &self,
        subject: &SubjectRef,
        branch: &str,
        sha: &str,
    ) -> Result<(), PlatformError>;

    /// Open a pull request.
    async fn open_pull_request(
        &self,
        subject: &SubjectRef,
        spec: &PullRequestSpec,
    ) -> Result<RemediationPr, PlatformError>;

    /// Add labels to a pull request or issue.
    async fn add_labels(
        &self,
        subject: &SubjectRef,
        number: u64,
        labels: &[String],
    ) -> Result<(), PlatformError>;
}
