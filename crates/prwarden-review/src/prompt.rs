use std::fmt::Write as _;
use std::path::Path;

use prwarden_core::{FileEdit, Instruction, Mode, ReviewContext, SubjectKind};
use regex::Regex;
use serde::Deserialize;

const ROLE: &str = "You are a senior software engineer assisting on a GitHub repository.";

const REVIEW_PULL_REQUEST: &str = "\
You are conducting a code review. Focus on high-priority issues by default:

- Critical (always mention): security vulnerabilities, bugs or logic errors, breaking changes
- Important (mention if significant): performance bottlenecks, poor error handling, architectural concerns
- Style and minor refactoring: only if explicitly requested

Keep the review concise and actionable. Reference files and lines from the diff.";

const REVIEW_ISSUE: &str = "\
You are providing guidance on an issue. Give architectural advice, relevant \
best practices and concrete next steps. Ask clarifying questions if more \
context is needed.";

const PLAN: &str = "\
This is a PLANNING session. Do NOT implement anything and do NOT provide \
complete code implementations.

Focus on:
- Strategic thinking: the key considerations, issues and opportunities
- Planning: which approach would be most effective
- Prioritization: what should be tackled first
- Discussion: ask clarifying questions where the goal is unclear
- Next steps: outline the approach so it can be implemented later";

const READ_ONLY: &str = "\
You cannot modify the repository in this mode. Never claim that files were \
changed, committed or pushed.";

const FIX: &str = "\
You are implementing fixes requested in the conversation on this subject.

1. Prioritize high-impact issues: security vulnerabilities, bugs, breaking changes.
2. Only implement changes that were specifically requested or discussed.
3. Be selective and change only what is necessary.

For every file that needs changing, call the modify_file tool with the \
file's complete new content and a short description. Paths are relative to \
the repository root. If tools are unavailable, put the changes in a single \
fenced json block of the form {\"files\": [{\"path\": \"...\", \"content\": \"...\"}]}.

After the changes, summarize what was fixed. Your changes are proposed on a \
separate branch for human review; never claim that anything was merged.";

/// Build the system prompt for a mode and subject kind.
///
/// # Examples
///
/// ```
/// use prwarden_core::{Mode, SubjectKind};
/// use prwarden_review::prompt::build_system_prompt;
///
/// let prompt = build_system_prompt(Mode::Plan, SubjectKind::Issue);
/// assert!(prompt.contains("PLANNING"));
/// assert!(prompt.contains("Never claim that files were changed"));
/// ```
pub fn build_system_prompt(mode: Mode, kind: SubjectKind) -> String {
    let body = match (mode, kind) {
        (Mode::Fix, _) => FIX,
        (Mode::Plan, _) => PLAN,
        (Mode::Review, SubjectKind::PullRequest) => REVIEW_PULL_REQUEST,
        (Mode::Review, SubjectKind::Issue) => REVIEW_ISSUE,
    };
    if mode.allows_edits() {
        format!("{ROLE}\n\n{body}")
    } else {
        format!("{ROLE}\n\n{body}\n\n{READ_ONLY}")
    }
}

/// Build the user message: subject, request, history and file contents.
pub fn build_user_prompt(context: &ReviewContext, instruction: &Instruction) -> String {
    let subject = &context.subject;
    let mut prompt = String::new();

    let _ = writeln!(prompt, "# {} #{}: {}", subject.kind, subject.number, subject.title);
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "- Author: {}", subject.author);
    let _ = writeln!(prompt, "- State: {}", subject.state);
    if subject.kind == SubjectKind::PullRequest {
        let _ = writeln!(prompt, "- Branch: {} → {}", subject.source_ref, subject.base_ref);
    }
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "## Description");
    let _ = writeln!(prompt);
    match subject.body.as_deref().map(str::trim) {
        Some(body) if !body.is_empty() => {
            let _ = writeln!(prompt, "{body}");
        }
        _ => {
            let _ = writeln!(prompt, "_No description provided._");
        }
    }

    if !context.history.is_empty() {
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "## Conversation history");
        let _ = writeln!(prompt);
        for prior in &context.history {
            let _ = writeln!(prompt, "- @{}: {}", prior.author, prior.command);
        }
    }

    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "## Current request ({} mode)", instruction.mode);
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "{}", instruction.command);

    if !context.notes.is_empty() || !context.omitted.is_empty() {
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "## Context notes");
        let _ = writeln!(prompt);
        for note in &context.notes {
            let _ = writeln!(prompt, "- {note}");
        }
        for omitted in &context.omitted {
            let _ = writeln!(prompt, "- `{}` omitted: {}", omitted.path, omitted.reason);
        }
    }

    if !context.files.is_empty() {
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "## Changed files");
        for file in &context.files {
            let _ = writeln!(prompt);
            let _ = writeln!(
                prompt,
                "### {} ({}, +{} -{})",
                file.path, file.status, file.additions, file.deletions
            );
            if let Some(patch) = &file.patch {
                let _ = writeln!(prompt);
                let _ = writeln!(prompt, "Diff:");
                let _ = writeln!(prompt, "```diff\n{}\n```", patch.trim_end());
            }
            if let Some(content) = &file.content {
                let _ = writeln!(prompt);
                let _ = writeln!(prompt, "Full content:");
                let _ = writeln!(
                    prompt,
                    "```{}\n{}\n```",
                    language_hint(&file.path),
                    content.trim_end()
                );
            }
        }
    } else if subject.kind == SubjectKind::Issue || instruction.mode == Mode::Plan {
        let _ = writeln!(prompt);
        let _ = writeln!(
            prompt,
            "No code files are attached. Focus on strategic guidance and actionable recommendations."
        );
    }

    prompt
}

/// Code fence language for a path, or `""` when unknown.
///
/// # Examples
///
/// ```
/// use prwarden_review::prompt::language_hint;
///
/// assert_eq!(language_hint("src/main.rs"), "rust");
/// assert_eq!(language_hint("web/App.TSX"), "tsx");
/// assert_eq!(language_hint("Makefile"), "");
/// ```
pub fn language_hint(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("py") => "python",
        Some("js" | "mjs" | "cjs") => "javascript",
        Some("ts") => "typescript",
        Some("jsx") => "jsx",
        Some("tsx") => "tsx",
        Some("java") => "java",
        Some("c" | "h") => "c",
        Some("cpp" | "cc" | "hpp") => "cpp",
        Some("cs") => "csharp",
        Some("php") => "php",
        Some("rb") => "ruby",
        Some("go") => "go",
        Some("rs") => "rust",
        Some("sh" | "bash") => "bash",
        Some("yml" | "yaml") => "yaml",
        Some("json") => "json",
        Some("toml") => "toml",
        Some("xml") => "xml",
        Some("html") => "html",
        Some("css") => "css",
        Some("scss") => "scss",
        Some("sql") => "sql",
        Some("md") => "markdown",
        _ => "",
    }
}

/// Result of scanning a narrative for a fenced JSON edit block.
#[derive(Debug, PartialEq, Eq)]
pub enum FencedEdits {
    /// No ```json block with a `files` key was found.
    Absent,
    /// Edits parsed; `narrative` is the text with the block removed.
    Found {
        edits: Vec<FileEdit>,
        narrative: String,
    },
    /// A block was found but could not be parsed.
    Malformed(String),
}

#[derive(Deserialize)]
struct FencedPayload {
    files: Vec<FencedFile>,
}

#[derive(Deserialize)]
struct FencedFile {
    path: String,
    content: String,
    #[serde(default)]
    description: Option<String>,
}

/// Look for a ```json block carrying `{"files": [{"path", "content"}]}`.
///
/// JSON blocks without a `files` key are ordinary narrative and are left
/// alone.
///
/// # Examples
///
/// ```
/// use prwarden_review::prompt::{parse_fenced_edits, FencedEdits};
///
/// let text = "Fixed it.\n```json\n{\"files\": [{\"path\": \"a.rs\", \"content\": \"x\"}]}\n```";
/// match parse_fenced_edits(text) {
///     FencedEdits::Found { edits, narrative } => {
///         assert_eq!(edits[0].path, "a.rs");
///         assert_eq!(narrative, "Fixed it.");
///     }
///     other => panic!("unexpected: {other:?}"),
/// }
/// ```
pub fn parse_fenced_edits(text: &str) -> FencedEdits {
    let Ok(block) = Regex::new(r"(?s)```json\s*(\{.*?\})\s*```") else {
        return FencedEdits::Absent;
    };
    for caps in block.captures_iter(text) {
        let (Some(whole), Some(json)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value: serde_json::Value = match serde_json::from_str(json.as_str()) {
            Ok(v) => v,
            Err(e) => {
                if json.as_str().contains("\"files\"") {
                    return FencedEdits::Malformed(format!("invalid JSON edit block: {e}"));
                }
                continue;
            }
        };
        if value.get("files").is_none() {
            continue;
        }
        return match serde_json::from_value::<FencedPayload>(value) {
            Ok(payload) => {
                let edits = payload
                    .files
                    .into_iter()
                    .map(|f| FileEdit {
                        path: f.path,
                        content: f.content,
                        description: f.description,
                    })
                    .collect();
                let mut narrative = String::with_capacity(text.len());
                narrative.push_str(&text[..whole.start()]);
                narrative.push_str(&text[whole.end()..]);
                FencedEdits::Found {
                    edits,
                    narrative: narrative.trim().to_string(),
                }
            }
            Err(e) => FencedEdits::Malformed(format!("invalid JSON edit block: {e}")),
        };
    }
    FencedEdits::Absent
}

#[cfg(test)]
mod tests {
    use super::*;
    use prwarden_core::{
        ChangedFile, OmitReason, OmittedFile, PriorCommand, SubjectMetadata,
    };

    fn context(kind: SubjectKind, mode: Mode) -> ReviewContext {
        ReviewContext {
            subject: SubjectMetadata {
                number: 7,
                kind,
                title: "Add parser".into(),
                body: Some("Implements the parser".into()),
                author: "alice".into(),
                state: "open".into(),
                source_ref: "feature".into(),
                base_ref: "main".into(),
                head_sha: Some("abc".into()),
                html_url: None,
            },
            files: Vec::new(),
            omitted: Vec::new(),
            notes: Vec::new(),
            history: Vec::new(),
            mode,
        }
    }

    #[test]
    fn read_only_modes_forbid_claiming_changes() {
        for mode in [Mode::Review, Mode::Plan] {
            for kind in [SubjectKind::PullRequest, SubjectKind::Issue] {
                let prompt = build_system_prompt(mode, kind);
                assert!(prompt.contains(READ_ONLY), "{mode} {kind}");
                assert!(!prompt.contains("modify_file"));
            }
        }
    }

    #[test]
    fn fix_prompt_mentions_tool_and_fallback() {
        let prompt = build_system_prompt(Mode::Fix, SubjectKind::PullRequest);
        assert!(prompt.contains("modify_file"));
        assert!(prompt.contains("\"files\""));
        assert!(!prompt.contains(READ_ONLY));
    }

    #[test]
    fn review_prompt_differs_by_subject_kind() {
        let pr = build_system_prompt(Mode::Review, SubjectKind::PullRequest);
        let issue = build_system_prompt(Mode::Review, SubjectKind::Issue);
        assert!(pr.contains("code review"));
        assert!(issue.contains("guidance on an issue"));
    }

    #[test]
    fn user_prompt_includes_files_with_language() {
        let mut ctx = context(SubjectKind::PullRequest, Mode::Review);
        ctx.files.push(ChangedFile {
            path: "src/parser.rs".into(),
            status: "modified".into(),
            additions: 2,
            deletions: 1,
            patch: Some("@@ -1 +1 @@\n-a\n+b".into()),
            content: Some("fn parse() {}".into()),
        });
        ctx.omitted.push(OmittedFile {
            path: "Cargo.lock".into(),
            reason: OmitReason::LockFile,
        });
        ctx.notes.push("content of `x.rs` unavailable".into());
        let instruction = Instruction {
            command: "review this code".into(),
            mode: Mode::Review,
        };
        let prompt = build_user_prompt(&ctx, &instruction);
        assert!(prompt.contains("pull request #7: Add parser"));
        assert!(prompt.contains("feature → main"));
        assert!(prompt.contains("```diff\n@@ -1 +1 @@"));
        assert!(prompt.contains("```rust\nfn parse() {}\n```"));
        assert!(prompt.contains("`Cargo.lock` omitted: lock file"));
        assert!(prompt.contains("content of `x.rs` unavailable"));
        assert!(prompt.contains("review this code"));
    }

    #[test]
    fn user_prompt_includes_history() {
        let mut ctx = context(SubjectKind::PullRequest, Mode::Fix);
        ctx.history.push(PriorCommand {
            author: "bob".into(),
            command: "review the error handling".into(),
        });
        let instruction = Instruction {
            command: "fix the issues you found".into(),
            mode: Mode::Fix,
        };
        let prompt = build_user_prompt(&ctx, &instruction);
        assert!(prompt.contains("## Conversation history"));
        assert!(prompt.contains("- @bob: review the error handling"));
        assert!(prompt.contains("(fix mode)"));
    }

    #[test]
    fn issue_prompt_without_files_asks_for_guidance() {
        let ctx = context(SubjectKind::Issue, Mode::Plan);
        let instruction = Instruction {
            command: "plan the rollout".into(),
            mode: Mode::Plan,
        };
        let prompt = build_user_prompt(&ctx, &instruction);
        assert!(prompt.contains("No code files are attached"));
        assert!(!prompt.contains("Branch:"));
    }

    #[test]
    fn fenced_edits_absent_without_block() {
        assert_eq!(parse_fenced_edits("Looks fine."), FencedEdits::Absent);
    }

    #[test]
    fn fenced_json_without_files_is_narrative() {
        let text = "Example config:\n```json\n{\"debug\": true}\n```";
        assert_eq!(parse_fenced_edits(text), FencedEdits::Absent);
    }

    #[test]
    fn fenced_edits_malformed() {
        let text = "```json\n{\"files\": [{\"path\": \"a.rs\"}]}\n```";
        assert!(matches!(parse_fenced_edits(text), FencedEdits::Malformed(_)));

        let broken = "```json\n{\"files\": [oops]}\n```";
        assert!(matches!(parse_fenced_edits(broken), FencedEdits::Malformed(_)));
    }

    #[test]
    fn fenced_edits_keep_surrounding_text() {
        let text = "Before.\n```json\n{\"files\": [{\"path\": \"a.rs\", \"content\": \"x\", \"description\": \"d\"}]}\n```\nAfter.";
        let FencedEdits::Found { edits, narrative } = parse_fenced_edits(text) else {
            panic!("expected edits");
        };
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].description.as_deref(), Some("d"));
        assert!(narrative.starts_with("Before."));
        assert!(narrative.ends_with("After."));
    }
}
