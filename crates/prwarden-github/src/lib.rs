//! Hosting-platform boundary for prwarden.
//!
//! Defines the [`Platform`](platform::Platform) trait the orchestration core
//! talks to, a GitHub implementation backed by `octocrab`, bounded retries for
//! idempotent reads, and webhook payload parsing into a
//! [`Trigger`](prwarden_core::Trigger).

pub mod client;
pub mod error;
pub mod event;
pub mod platform;
pub mod retry;

pub use client::GitHubClient;
pub use error::PlatformError;
pub use platform::{FileEntry, IssueComment, Platform, PostedComment, PullRequestSpec};
pub use retry::{with_read_retry, RetryPolicy};
