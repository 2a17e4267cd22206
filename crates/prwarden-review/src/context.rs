use std::path::Path;

use glob::Pattern;
use prwarden_core::{
    ChangedFile, ContextConfig, Instruction, Mode, OmitReason, OmittedFile, PriorCommand,
    ReviewContext, SubjectKind, SubjectRef, WardenError,
};
use prwarden_github::{with_read_retry, FileEntry, Platform, RetryPolicy};

use crate::classifier::Classifier;
use crate::publish::RUN_MARKER_PREFIX;

const LOCK_FILES: &[&str] = &[
    "Cargo.lock",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "Gemfile.lock",
    "poetry.lock",
    "Pipfile.lock",
    "uv.lock",
    "composer.lock",
    "go.sum",
    "flake.lock",
];

/// Returns `true` for dependency lock files, by file name.
///
/// # Examples
///
/// ```
/// use prwarden_review::context::is_lock_file;
///
/// assert!(is_lock_file("Cargo.lock"));
/// assert!(is_lock_file("web/package-lock.json"));
/// assert!(!is_lock_file("src/lock.rs"));
/// ```
pub fn is_lock_file(path: &str) -> bool {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| LOCK_FILES.contains(&name))
}

/// Gathers the material an analysis needs: subject metadata, changed files
/// within size bounds, and (in fix mode) earlier requests on the thread.
pub struct ContextAssembler<'a> {
    platform: &'a dyn Platform,
    config: &'a ContextConfig,
    retry: RetryPolicy,
    classifier: &'a Classifier,
    skip: Vec<Pattern>,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(
        platform: &'a dyn Platform,
        config: &'a ContextConfig,
        retry: RetryPolicy,
        classifier: &'a Classifier,
    ) -> Self {
        let skip = config
            .skip_patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!(pattern = %p, error = %e, "ignoring invalid skip pattern");
                    None
                }
            })
            .collect();
        Self {
            platform,
            config,
            retry,
            classifier,
            skip,
        }
    }

    /// Assemble the context for `instruction` on `subject`.
    ///
    /// `trigger_comment` is the delivery id of the comment that started the
    /// run; it is left out of the history.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Platform`] if the subject metadata or the
    /// changed-file listing cannot be read after retries. A file whose
    /// content cannot be read degrades to its patch alone.
    pub async fn assemble(
        &self,
        subject: &SubjectRef,
        instruction: &Instruction,
        trigger_comment: Option<&str>,
    ) -> Result<ReviewContext, WardenError> {
        let metadata = with_read_retry("fetch subject", self.retry, || {
            self.platform.subject(subject)
        })
        .await?;

        let mut context = ReviewContext {
            subject: metadata,
            files: Vec::new(),
            omitted: Vec::new(),
            notes: Vec::new(),
            history: Vec::new(),
            mode: instruction.mode,
        };

        if context.subject.kind == SubjectKind::PullRequest && instruction.mode != Mode::Plan {
            let entries = with_read_retry("list changed files", self.retry, || {
                self.platform.changed_files(subject)
            })
            .await?;
            let git_ref = context
                .subject
                .head_sha
                .clone()
                .unwrap_or_else(|| context.subject.source_ref.clone());
            self.collect_files(subject, &git_ref, entries, &mut context)
                .await;
        }

        if instruction.mode == Mode::Fix && self.config.include_history {
            context.history = self.history(subject, trigger_comment).await;
        }

        tracing::info!(
            subject = %subject,
            files = context.files.len(),
            omitted = context.omitted.len(),
            history = context.history.len(),
            "context assembled"
        );
        Ok(context)
    }

    async fn collect_files(
        &self,
        subject: &SubjectRef,
        git_ref: &str,
        entries: Vec<FileEntry>,
        context: &mut ReviewContext,
    ) {
        let mut total = 0usize;
        for entry in entries {
            if entry.status == "removed" {
                continue;
            }
            if is_lock_file(&entry.path) {
                omit(context, entry.path, OmitReason::LockFile);
                continue;
            }
            if let Some(pattern) = self.skip.iter().find(|p| p.matches(&entry.path)) {
                let reason = OmitReason::Pattern(pattern.as_str().to_string());
                omit(context, entry.path, reason);
                continue;
            }

            let patch_len = entry.patch.as_ref().map_or(0, String::len);
            if patch_len > self.config.max_file_bytes {
                omit(context, entry.path, OmitReason::TooLarge(patch_len));
                continue;
            }

            let content = match with_read_retry("fetch file content", self.retry, || {
                self.platform.file_content(subject, &entry.path, git_ref)
            })
            .await
            {
                Ok(content) => Some(content),
                Err(e) => {
                    tracing::warn!(path = %entry.path, error = %e, "file content unavailable");
                    context
                        .notes
                        .push(format!("content of `{}` unavailable; diff only", entry.path));
                    None
                }
            };

            let mut file = ChangedFile {
                path: entry.path,
                status: entry.status,
                additions: entry.additions,
                deletions: entry.deletions,
                patch: entry.patch,
                content,
            };
            if file.size() > self.config.max_file_bytes {
                let full = file.size();
                file.content = None;
                if file.patch.is_none() {
                    omit(context, file.path, OmitReason::TooLarge(full));
                    continue;
                }
                context.notes.push(format!(
                    "full content of `{}` omitted ({full} bytes); diff only",
                    file.path
                ));
            }

            let size = file.size();
            if total + size > self.config.max_total_bytes {
                omit(context, file.path, OmitReason::BudgetExhausted);
                continue;
            }
            total += size;
            context.files.push(file);
        }
    }

    async fn history(&self, subject: &SubjectRef, trigger_comment: Option<&str>) -> Vec<PriorCommand> {
        let comments = match with_read_retry("list comments", self.retry, || {
            self.platform.comments(subject)
        })
        .await
        {
            Ok(comments) => comments,
            Err(e) => {
                tracing::warn!(error = %e, "conversation history unavailable");
                return Vec::new();
            }
        };

        comments
            .into_iter()
            .filter(|c| trigger_comment != Some(c.id.to_string().as_str()))
            .filter(|c| !c.author.ends_with("[bot]") && !c.body.contains(RUN_MARKER_PREFIX))
            .filter_map(|c| {
                self.classifier
                    .extract_command(&c.body)
                    .map(|command| PriorCommand {
                        author: c.author,
                        command,
                    })
            })
            .collect()
    }
}

fn omit(context: &mut ReviewContext, path: String, reason: OmitReason) {
    tracing::debug!(%path, %reason, "omitting file from context");
    context.omitted.push(OmittedFile { path, reason });
}
