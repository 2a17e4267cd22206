use chrono::{DateTime, Utc};
use prwarden_core::{
    AnalysisResult, Instruction, Mode, SubjectKind, SubjectRef, Trigger, WardenConfig, WardenError,
};
use prwarden_github::{with_read_retry, Platform, PostedComment, RetryPolicy};
use serde::Serialize;

use crate::analysis::{AnalysisInvoker, AnalysisOutcome};
use crate::classifier::Classifier;
use crate::context::ContextAssembler;
use crate::llm::ReasoningService;
use crate::publish::{
    compose_comment, find_published, idempotency_key, Publication, ResultPublisher,
    NO_FILES_NARRATIVE,
};
use crate::remediation::{RemediationOutcome, RemediationRequest, Remediator};

/// Why a trigger produced no comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum IgnoreReason {
    /// No mention, an empty command, or a bot author.
    NotAddressed,
    /// A comment for this exact trigger already exists.
    AlreadyPublished { comment_id: u64 },
}

/// Summary of a run that published a comment.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub subject: SubjectRef,
    pub instruction: Instruction,
    pub analysis_failed: bool,
    pub has_changes: bool,
    pub remediation: RemediationOutcome,
    pub comment: PostedComment,
}

/// Result of [`Pipeline::run`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RunOutcome {
    Ignored(IgnoreReason),
    Published(RunReport),
}

/// One trigger in, at most one comment out.
///
/// Stages run strictly in order: classify, assemble context, analyze,
/// remediate (fix mode with edits only), publish.
pub struct Pipeline<'a> {
    platform: &'a dyn Platform,
    service: &'a dyn ReasoningService,
    config: &'a WardenConfig,
    classifier: Classifier,
    retry: RetryPolicy,
}

impl<'a> Pipeline<'a> {
    /// # Errors
    ///
    /// Returns [`WardenError::Config`] if the trigger phrase is unusable.
    pub fn new(
        platform: &'a dyn Platform,
        service: &'a dyn ReasoningService,
        config: &'a WardenConfig,
    ) -> Result<Self, WardenError> {
        Ok(Self {
            platform,
            service,
            config,
            classifier: Classifier::new(&config.trigger)?,
            retry: RetryPolicy::from_config(&config.github),
        })
    }

    /// Process a trigger.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Input`] when a classified trigger has no
    /// subject, and [`WardenError::Platform`] when the subject or its file
    /// listing cannot be read or the comment cannot be posted. No comment is
    /// published for a fatal error.
    pub async fn run(&self, trigger: &Trigger) -> Result<RunOutcome, WardenError> {
        self.run_at(trigger, Utc::now()).await
    }

    /// [`run`](Self::run) with an explicit clock for branch naming.
    pub async fn run_at(&self, trigger: &Trigger, now: DateTime<Utc>) -> Result<RunOutcome, WardenError> {
        let Some(instruction) = self.classifier.classify(trigger) else {
            tracing::info!(event = %trigger.event_kind, actor = %trigger.actor, "trigger not addressed to us");
            return Ok(RunOutcome::Ignored(IgnoreReason::NotAddressed));
        };
        let subject = trigger.subject.as_ref().ok_or_else(|| {
            WardenError::Input(format!(
                "{} event carries no pull request or issue number",
                trigger.event_kind
            ))
        })?;
        tracing::info!(
            subject = %subject,
            mode = %instruction.mode,
            command = %instruction.command,
            "trigger classified"
        );

        let key = idempotency_key(trigger, subject, &instruction);
        if self.config.publish.dedupe {
            if let Some(comment_id) = self.already_published(subject, &key).await {
                tracing::info!(subject = %subject, comment_id, "result already published, skipping");
                return Ok(RunOutcome::Ignored(IgnoreReason::AlreadyPublished { comment_id }));
            }
        }

        let trigger_comment = trigger
            .event_kind
            .is_comment()
            .then_some(trigger.delivery_id.as_deref())
            .flatten();
        let context = ContextAssembler::new(
            self.platform,
            &self.config.context,
            self.retry,
            &self.classifier,
        )
        .assemble(subject, &instruction, trigger_comment)
        .await?;

        let analysis = if context.subject.kind == SubjectKind::PullRequest
            && instruction.mode != Mode::Plan
            && context.files.is_empty()
            && context.omitted.is_empty()
        {
            tracing::info!(subject = %subject, "no reviewable files, skipping analysis");
            AnalysisOutcome::Completed(AnalysisResult::narrative_only(NO_FILES_NARRATIVE))
        } else {
            AnalysisInvoker::new(self.service)
                .invoke(&context, &instruction)
                .await
        };

        let remediation = match &analysis {
            AnalysisOutcome::Completed(result) if instruction.mode == Mode::Fix && result.has_changes() => {
                if self.config.remediation.enabled {
                    let state = Remediator::new(self.platform, &self.config.remediation, self.retry)
                        .run(&RemediationRequest {
                            subject,
                            metadata: &context.subject,
                            instruction: &instruction,
                            actor: &trigger.actor,
                            edits: &result.edits,
                            started_at: now,
                        })
                        .await;
                    RemediationOutcome::from(state)
                } else {
                    tracing::info!(subject = %subject, "remediation disabled, edits not applied");
                    RemediationOutcome::Disabled
                }
            }
            _ => RemediationOutcome::NotAttempted,
        };

        let body = compose_comment(&Publication {
            instruction: &instruction,
            subject_kind: context.subject.kind,
            analysis: &analysis,
            remediation: &remediation,
            phrase: &self.config.trigger.phrase,
            key: &key,
        });
        let comment = ResultPublisher::new(self.platform)
            .publish(subject, &body)
            .await?;

        Ok(RunOutcome::Published(RunReport {
            subject: subject.clone(),
            instruction,
            analysis_failed: matches!(analysis, AnalysisOutcome::Failed { .. }),
            has_changes: analysis.has_changes(),
            remediation,
            comment,
        }))
    }

    async fn already_published(&self, subject: &SubjectRef, key: &str) -> Option<u64> {
        match with_read_retry("list comments", self.retry, || self.platform.comments(subject)).await {
            Ok(comments) => find_published(&comments, key).map(|c| c.id),
            Err(e) => {
                tracing::warn!(error = %e, "could not check for an earlier result, continuing");
                None
            }
        }
    }
}
