use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use prwarden_core::{
    FileEdit, GitHubConfig, RemediationPr, SubjectKind, SubjectMetadata, SubjectRef, WardenError,
};
use serde::Deserialize;

use crate::error::PlatformError;
use crate::platform::{FileEntry, IssueComment, Platform, PostedComment, PullRequestSpec};

const PAGE_SIZE: usize = 100;
// The files endpoint stops at 3000 entries.
const MAX_PAGES: usize = 30;

/// GitHub REST client implementing [`Platform`].
///
/// JSON endpoints go through `octocrab`; raw file content is fetched with a
/// plain `reqwest` client so the raw media type can be requested. Every
/// request is bounded by the configured timeout and attempted exactly once.
///
/// # Examples
///
/// ```no_run
/// use prwarden_core::GitHubConfig;
/// use prwarden_github::GitHubClient;
///
/// let config = GitHubConfig {
///     token: Some("ghp_xxxx".into()),
///     ..GitHubConfig::default()
/// };
/// let client = GitHubClient::new(&config).unwrap();
/// ```
pub struct GitHubClient {
    octocrab: octocrab::Octocrab,
    http: reqwest::Client,
    token: String,
    api_base: String,
    timeout: Duration,
}

impl GitHubClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Config`] if no token is configured or the API
    /// base is not a valid URI, or [`WardenError::Platform`] if a client
    /// cannot be built.
    pub fn new(config: &GitHubConfig) -> Result<Self, WardenError> {
        let token = config.token.clone().ok_or_else(|| {
            WardenError::Config(
                "GITHUB_TOKEN not set. Set GITHUB_TOKEN or github.token in .prwarden.toml".into(),
            )
        })?;
        let api_base = config.api_base.trim_end_matches('/').to_string();

        let octocrab = octocrab::Octocrab::builder()
            .personal_token(token.clone())
            .add_retry_config(octocrab::service::middleware::retry::RetryConfig::None)
            .base_uri(api_base.as_str())
            .map_err(|e| WardenError::Config(format!("invalid github.api_base '{api_base}': {e}")))?
            .build()
            .map_err(|e| WardenError::Platform(format!("failed to create GitHub client: {e}")))?;

        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WardenError::Platform(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            octocrab,
            http,
            token,
            api_base,
            timeout,
        })
    }

    async fn bounded<T, Fut>(&self, operation: &str, request: Fut) -> Result<T, PlatformError>
    where
        Fut: Future<Output = Result<T, octocrab::Error>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(from_octocrab(operation, e)),
            Err(_) => Err(PlatformError::Timeout(operation.to_string())),
        }
    }

    async fn get_json<T>(&self, operation: &str, route: String) -> Result<T, PlatformError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.bounded(operation, self.octocrab.get(route, None::<&()>))
            .await
    }

    async fn post_json<T>(
        &self,
        operation: &str,
        route: String,
        body: &serde_json::Value,
    ) -> Result<T, PlatformError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.bounded(operation, self.octocrab.post(route, Some(body)))
            .await
    }

    async fn default_branch(&self, subject: &SubjectRef) -> Result<String, PlatformError> {
        let repo: RepoDto = self
            .get_json(
                "fetch repository",
                format!("/repos/{}/{}", subject.owner, subject.repo),
            )
            .await?;
        Ok(repo.default_branch)
    }

    fn contents_url(
        &self,
        subject: &SubjectRef,
        path: &str,
        git_ref: &str,
    ) -> Result<reqwest::Url, PlatformError> {
        let mut url = reqwest::Url::parse(&self.api_base)
            .map_err(|e| PlatformError::Decode(format!("invalid API base: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| PlatformError::Decode("API base cannot be a base URL".into()))?;
            segments
                .pop_if_empty()
                .extend(["repos", subject.owner.as_str(), subject.repo.as_str(), "contents"])
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url.query_pairs_mut().append_pair("ref", git_ref);
        Ok(url)
    }
}

fn from_octocrab(operation: &str, err: octocrab::Error) -> PlatformError {
    match err {
        octocrab::Error::GitHub { source, .. } => PlatformError::Http {
            status: source.status_code.as_u16(),
            message: format!("{operation}: {}", source.message),
        },
        other => PlatformError::Transport(format!("{operation}: {other}")),
    }
}

fn from_reqwest(operation: &str, err: reqwest::Error) -> PlatformError {
    if err.is_timeout() {
        PlatformError::Timeout(operation.to_string())
    } else {
        PlatformError::Transport(format!("{operation}: {err}"))
    }
}

#[derive(Deserialize)]
struct UserDto {
    login: String,
}

#[derive(Deserialize)]
struct IssueDto {
    number: u64,
    title: String,
    body: Option<String>,
    user: UserDto,
    state: String,
    html_url: Option<String>,
    pull_request: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct BranchDto {
    #[serde(rename = "ref")]
    name: String,
    sha: String,
}

#[derive(Deserialize)]
struct PullDto {
    number: u64,
    title: String,
    body: Option<String>,
    user: UserDto,
    state: String,
    #[serde(default)]
    merged: bool,
    html_url: Option<String>,
    head: BranchDto,
    base: BranchDto,
}

#[derive(Deserialize)]
struct RepoDto {
    default_branch: String,
}

#[derive(Deserialize)]
struct FileDto {
    filename: String,
    status: String,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    patch: Option<String>,
}

#[derive(Deserialize)]
struct CommentDto {
    id: u64,
    body: Option<String>,
    user: UserDto,
    created_at: String,
}

#[derive(Deserialize)]
struct CreatedCommentDto {
    id: u64,
    html_url: String,
}

#[derive(Deserialize)]
struct ShaDto {
    sha: String,
}

#[derive(Deserialize)]
struct RefDto {
    object: ShaDto,
}

#[derive(Deserialize)]
struct CommitDto {
    tree: ShaDto,
}

#[derive(Deserialize)]
struct CreatedPullDto {
    number: u64,
    html_url: String,
}

#[async_trait]
impl Platform for GitHubClient {
    async fn subject(&self, subject: &SubjectRef) -> Result<SubjectMetadata, PlatformError> {
        let issue: IssueDto = self
            .get_json(
                "fetch issue",
                format!(
                    "/repos/{}/{}/issues/{}",
                    subject.owner, subject.repo, subject.number
                ),
            )
            .await?;

        if issue.pull_request.is_none() {
            let default_branch = self.default_branch(subject).await?;
            return Ok(SubjectMetadata {
                number: issue.number,
                kind: SubjectKind::Issue,
                title: issue.title,
                body: issue.body,
                author: issue.user.login,
                state: issue.state,
                source_ref: default_branch.clone(),
                base_ref: default_branch,
                head_sha: None,
                html_url: issue.html_url,
            });
        }

        let pull: PullDto = self
            .get_json(
                "fetch pull request",
                format!(
                    "/repos/{}/{}/pulls/{}",
                    subject.owner, subject.repo, subject.number
                ),
            )
            .await?;
        let state = if pull.merged {
            "merged".to_string()
        } else {
            pull.state
        };
        Ok(SubjectMetadata {
            number: pull.number,
            kind: SubjectKind::PullRequest,
            title: pull.title,
            body: pull.body,
            author: pull.user.login,
            state,
            source_ref: pull.head.name,
            base_ref: pull.base.name,
            head_sha: Some(pull.head.sha),
            html_url: pull.html_url,
        })
    }

    async fn changed_files(&self, subject: &SubjectRef) -> Result<Vec<FileEntry>, PlatformError> {
        let mut entries = Vec::new();
        for page in 1..=MAX_PAGES {
            let batch: Vec<FileDto> = self
                .get_json(
                    "list changed files",
                    format!(
                        "/repos/{}/{}/pulls/{}/files?per_page={PAGE_SIZE}&page={page}",
                        subject.owner, subject.repo, subject.number
                    ),
                )
                .await?;
            let last = batch.len() < PAGE_SIZE;
            entries.extend(batch.into_iter().map(|f| FileEntry {
                path: f.filename,
                status: f.status,
                additions: f.additions,
                deletions: f.deletions,
                patch: f.patch,
            }));
            if last {
                break;
            }
        }
        Ok(entries)
    }

    async fn file_content(
        &self,
        subject: &SubjectRef,
        path: &str,
        git_ref: &str,
    ) -> Result<String, PlatformError> {
        let operation = "fetch file content";
        let url = self.contents_url(subject, path, git_ref)?;
        let response = self
            .http
            .get(url)
            .header("Accept", "application/vnd.github.raw+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", "prwarden")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await
            .map_err(|e| from_reqwest(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Http {
                status: status.as_u16(),
                message: format!("{operation} {path}: {body}"),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| from_reqwest(operation, e))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| PlatformError::Decode(format!("{path} is not valid UTF-8")))
    }

    async fn comments(&self, subject: &SubjectRef) -> Result<Vec<IssueComment>, PlatformError> {
        let mut comments = Vec::new();
        for page in 1..=MAX_PAGES {
            let batch: Vec<CommentDto> = self
                .get_json(
                    "list comments",
                    format!(
                        "/repos/{}/{}/issues/{}/comments?per_page={PAGE_SIZE}&page={page}",
                        subject.owner, subject.repo, subject.number
                    ),
                )
                .await?;
            let last = batch.len() < PAGE_SIZE;
            comments.extend(batch.into_iter().map(|c| IssueComment {
                id: c.id,
                author: c.user.login,
                body: c.body.unwrap_or_default(),
                created_at: c.created_at,
            }));
            if last {
                break;
            }
        }
        Ok(comments)
    }

    async fn post_comment(
        &self,
        subject: &SubjectRef,
        body: &str,
    ) -> Result<PostedComment, PlatformError> {
        let created: CreatedCommentDto = self
            .post_json(
                "post comment",
                format!(
                    "/repos/{}/{}/issues/{}/comments",
                    subject.owner, subject.repo, subject.number
                ),
                &serde_json::json!({ "body": body }),
            )
            .await?;
        Ok(PostedComment {
            id: created.id,
            html_url: created.html_url,
        })
    }

    async fn branch_tip(
        &self,
        subject: &SubjectRef,
        branch: &str,
    ) -> Result<String, PlatformError> {
        let reference: RefDto = self
            .get_json(
                "resolve branch",
                format!(
                    "/repos/{}/{}/git/ref/heads/{branch}",
                    subject.owner, subject.repo
                ),
            )
            .await?;
        Ok(reference.object.sha)
    }

    async fn create_branch(
        &self,
        subject: &SubjectRef,
        branch: &str,
        sha: &str,
    ) -> Result<(), PlatformError> {
        let _created: serde_json::Value = self
            .post_json(
                "create branch",
                format!("/repos/{}/{}/git/refs", subject.owner, subject.repo),
                &serde_json::json!({ "ref": format!("refs/heads/{branch}"), "sha": sha }),
            )
            .await?;
        Ok(())
    }

    async fn commit_files(
        &self,
        subject: &SubjectRef,
        parent_sha: &str,
        edits: &[FileEdit],
        message: &str,
    ) -> Result<String, PlatformError> {
        let parent: CommitDto = self
            .get_json(
                "fetch parent commit",
                format!(
                    "/repos/{}/{}/git/commits/{parent_sha}",
                    subject.owner, subject.repo
                ),
            )
            .await?;

        let entries: Vec<serde_json::Value> = edits
            .iter()
            .map(|edit| {
                serde_json::json!({
                    "path": edit.path,
                    "mode": "100644",
                    "type": "blob",
                    "content": edit.content,
                })
            })
            .collect();
        let tree: ShaDto = self
            .post_json(
                "create tree",
                format!("/repos/{}/{}/git/trees", subject.owner, subject.repo),
                &serde_json::json!({ "base_tree": parent.tree.sha, "tree": entries }),
            )
            .await?;

        let commit: ShaDto = self
            .post_json(
                "create commit",
                format!("/repos/{}/{}/git/commits", subject.owner, subject.repo),
                &serde_json::json!({
                    "message": message,
                    "tree": tree.sha,
                    "parents": [parent_sha],
                }),
            )
            .await?;
        Ok(commit.sha)
    }

    async fn update_branch(
        &self,
        subject: &SubjectRef,
        branch: &str,
        sha: &str,
    ) -> Result<(), PlatformError> {
        let route = format!(
            "/repos/{}/{}/git/refs/heads/{branch}",
            subject.owner, subject.repo
        );
        let body = serde_json::json!({ "sha": sha, "force": false });
        let _updated: serde_json::Value = self
            .bounded("push branch", self.octocrab.patch(route, Some(&body)))
            .await?;
        Ok(())
    }

    async fn open_pull_request(
        &self,
        subject: &SubjectRef,
        spec: &PullRequestSpec,
    ) -> Result<RemediationPr, PlatformError> {
        let created: CreatedPullDto = self
            .post_json(
                "open pull request",
                format!("/repos/{}/{}/pulls", subject.owner, subject.repo),
                &serde_json::json!({
                    "title": spec.title,
                    "head": spec.head,
                    "base": spec.base,
                    "body": spec.body,
                    "draft": spec.draft,
                    "maintainer_can_modify": true,
                }),
            )
            .await?;
        Ok(RemediationPr {
            number: created.number,
            html_url: created.html_url,
        })
    }

    async fn add_labels(
        &self,
        subject: &SubjectRef,
        number: u64,
        labels: &[String],
    ) -> Result<(), PlatformError> {
        let _labels: serde_json::Value = self
            .post_json(
                "add labels",
                format!(
                    "/repos/{}/{}/issues/{number}/labels",
                    subject.owner, subject.repo
                ),
                &serde_json::json!({ "labels": labels }),
            )
            .await?;
        Ok(())
    }
}
