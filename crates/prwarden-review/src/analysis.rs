use std::path::{Component, Path};

use prwarden_core::{AnalysisResult, FileEdit, Instruction, ReviewContext};

use crate::llm::{AnalysisRequest, ReasoningError, ReasoningService};
use crate::prompt::{self, FencedEdits};

const EMPTY_NARRATIVE: &str = "The analysis completed without a written summary.";

/// Outcome of one analysis call.
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    Completed(AnalysisResult),
    /// The service could not be reached or refused the request.
    Failed { reason: String },
}

impl AnalysisOutcome {
    /// Returns `true` when the analysis completed with edits.
    pub fn has_changes(&self) -> bool {
        matches!(self, AnalysisOutcome::Completed(result) if result.has_changes())
    }
}

/// Sends an assembled context to a [`ReasoningService`] and validates
/// what comes back.
///
/// Edits survive only in fix mode, only when every proposed edit is
/// well-formed, and with one edit per path (the last one wins).
pub struct AnalysisInvoker<'a> {
    service: &'a dyn ReasoningService,
}

impl<'a> AnalysisInvoker<'a> {
    pub fn new(service: &'a dyn ReasoningService) -> Self {
        Self { service }
    }

    /// Run the analysis for `instruction` against `context`.
    pub async fn invoke(&self, context: &ReviewContext, instruction: &Instruction) -> AnalysisOutcome {
        let allow_edits = instruction.mode.allows_edits();
        let request = AnalysisRequest {
            system: prompt::build_system_prompt(instruction.mode, context.subject.kind),
            user: prompt::build_user_prompt(context, instruction),
            allow_edits,
        };

        tracing::info!(
            model = self.service.model(),
            mode = %instruction.mode,
            files = context.files.len(),
            "invoking reasoning service"
        );

        let reply = match self.service.analyze(&request).await {
            Ok(reply) => reply,
            Err(ReasoningError::Malformed(reason)) => {
                tracing::warn!(%reason, "reasoning service returned a malformed response");
                return AnalysisOutcome::Completed(AnalysisResult::narrative_only(format!(
                    "The analysis response could not be interpreted ({reason}). \
                     No changes were proposed."
                )));
            }
            Err(err) => {
                tracing::error!(error = %err, "reasoning service call failed");
                return AnalysisOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };

        let mut narrative = reply.text;
        let mut candidates = reply.edits;
        let mut rejected = reply.rejected;

        if !allow_edits {
            if !candidates.is_empty() || !rejected.is_empty() {
                tracing::warn!(
                    mode = %instruction.mode,
                    discarded = candidates.len(),
                    "discarding edits proposed outside fix mode"
                );
            }
            return AnalysisOutcome::Completed(AnalysisResult::narrative_only(finish_narrative(
                narrative, &[],
            )));
        }

        if candidates.is_empty() && rejected.is_empty() {
            match prompt::parse_fenced_edits(&narrative) {
                FencedEdits::Absent => {}
                FencedEdits::Found {
                    edits,
                    narrative: rest,
                } => {
                    candidates = edits;
                    narrative = rest;
                }
                FencedEdits::Malformed(reason) => rejected.push(reason),
            }
        }

        for edit in &candidates {
            if let Err(reason) = validate_edit(edit) {
                rejected.push(reason);
            }
        }

        let edits = if rejected.is_empty() {
            dedupe_by_path(candidates)
        } else {
            tracing::warn!(
                rejected = rejected.len(),
                proposed = candidates.len(),
                "malformed edits, discarding all proposed changes"
            );
            narrative.push_str(&format!(
                "\n\n> Proposed file changes were discarded because some were malformed: {}.",
                rejected.join("; ")
            ));
            Vec::new()
        };

        AnalysisOutcome::Completed(AnalysisResult {
            narrative: finish_narrative(narrative, &edits),
            edits,
        })
    }
}

/// Check that an edit targets a plain relative path inside the repository.
///
/// # Examples
///
/// ```
/// use prwarden_core::FileEdit;
/// use prwarden_review::analysis::validate_edit;
///
/// let edit = |path: &str| FileEdit {
///     path: path.into(),
///     content: "x".into(),
///     description: None,
/// };
/// assert!(validate_edit(&edit("src/lib.rs")).is_ok());
/// assert!(validate_edit(&edit("../etc/passwd")).is_err());
/// assert!(validate_edit(&edit("/abs/path")).is_err());
/// assert!(validate_edit(&edit(".git/config")).is_err());
/// ```
pub fn validate_edit(edit: &FileEdit) -> Result<(), String> {
    let path = edit.path.trim();
    if path.is_empty() {
        return Err("edit with an empty path".into());
    }
    if path.contains('\\') || path.contains('\0') {
        return Err(format!("`{path}`: unsupported characters in path"));
    }
    let parsed = Path::new(path);
    if parsed.is_absolute() {
        return Err(format!("`{path}`: absolute paths are not allowed"));
    }
    for component in parsed.components() {
        match component {
            Component::Normal(part) if part == ".git" => {
                return Err(format!("`{path}`: cannot modify repository metadata"));
            }
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(format!("`{path}`: path escapes the repository")),
        }
    }
    if path.ends_with('/') {
        return Err(format!("`{path}`: not a file path"));
    }
    Ok(())
}

fn dedupe_by_path(edits: Vec<FileEdit>) -> Vec<FileEdit> {
    let mut unique: Vec<FileEdit> = Vec::with_capacity(edits.len());
    for mut edit in edits {
        edit.path = edit.path.trim().trim_start_matches("./").to_string();
        match unique.iter_mut().find(|e| e.path == edit.path) {
            Some(existing) => *existing = edit,
            None => unique.push(edit),
        }
    }
    unique
}

fn finish_narrative(narrative: String, edits: &[FileEdit]) -> String {
    let narrative = narrative.trim();
    if !narrative.is_empty() {
        return narrative.to_string();
    }
    if edits.is_empty() {
        return EMPTY_NARRATIVE.to_string();
    }
    let mut summary = String::from("Proposed changes:\n");
    for edit in edits {
        match &edit.description {
            Some(d) => summary.push_str(&format!("\n- `{}`: {d}", edit.path)),
            None => summary.push_str(&format!("\n- `{}`", edit.path)),
        }
    }
    summary
}
