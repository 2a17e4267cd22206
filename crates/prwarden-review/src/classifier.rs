use prwarden_core::{Instruction, Mode, Trigger, TriggerConfig, WardenError};
use regex::Regex;

use crate::publish::RUN_MARKER_PREFIX;

/// Command used for pull request / issue open events that carry no explicit
/// mention.
pub const DEFAULT_COMMAND: &str = "review this subject";

/// Where a mode rule is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Against the first word of the command only.
    LeadingVerb,
    /// Anywhere in the command.
    Anywhere,
}

struct ModeRule {
    scope: Scope,
    pattern: &'static str,
    mode: Mode,
}

/// Mode inference rules, evaluated top to bottom; the first match wins and
/// [`Mode::Review`] applies when nothing matches. Leading verbs outrank
/// keywords found elsewhere in the command.
const MODE_RULES: &[ModeRule] = &[
    ModeRule {
        scope: Scope::LeadingVerb,
        pattern: r"^plan",
        mode: Mode::Plan,
    },
    ModeRule {
        scope: Scope::LeadingVerb,
        pattern: r"^(?:fix|implement|apply)",
        mode: Mode::Fix,
    },
    ModeRule {
        scope: Scope::LeadingVerb,
        pattern: r"^(?:review|analy[sz]|check|examine)",
        mode: Mode::Review,
    },
    ModeRule {
        scope: Scope::Anywhere,
        pattern: r"\b(?:fix|repair|correct|implement|apply)|\bcreate\s+(?:a\s+)?pr\b|\bmake\s+changes\b",
        mode: Mode::Fix,
    },
    ModeRule {
        scope: Scope::Anywhere,
        pattern: r"\b(?:plan|discuss|consider|strateg|approach)|\bthink\s+about\b",
        mode: Mode::Plan,
    },
];

struct CompiledRule {
    scope: Scope,
    regex: Regex,
    mode: Mode,
}

/// Turns trigger text into an [`Instruction`], or decides the trigger is not
/// addressed to us.
///
/// # Examples
///
/// ```
/// use prwarden_core::{Mode, TriggerConfig};
/// use prwarden_review::classifier::Classifier;
///
/// let classifier = Classifier::new(&TriggerConfig::default()).unwrap();
/// assert_eq!(classifier.infer_mode("plan the migration"), Mode::Plan);
/// assert_eq!(classifier.infer_mode("please fix the parser"), Mode::Fix);
/// assert_eq!(classifier.infer_mode("what does this do?"), Mode::Review);
/// ```
pub struct Classifier {
    marker: Regex,
    rules: Vec<CompiledRule>,
    ignore_bots: bool,
}

impl Classifier {
    /// Build a classifier for the configured mention phrase.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Config`] if the phrase is empty or a pattern
    /// fails to compile.
    pub fn new(config: &TriggerConfig) -> Result<Self, WardenError> {
        let phrase = config.phrase.trim();
        if phrase.is_empty() {
            return Err(WardenError::Config("trigger phrase must not be empty".into()));
        }
        // The phrase must not be glued to a preceding word (`me@claude`) or
        // run into a following one (`@claudebot`).
        let marker = Regex::new(&format!(
            r"(?is)(?:^|[^\w@]){}(?:[^\w]|$)(.*)",
            regex::escape(phrase)
        ))
        .map_err(|e| WardenError::Config(format!("invalid trigger phrase: {e}")))?;

        let rules = MODE_RULES
            .iter()
            .map(|rule| {
                Regex::new(&format!("(?i){}", rule.pattern))
                    .map(|regex| CompiledRule {
                        scope: rule.scope,
                        regex,
                        mode: rule.mode,
                    })
                    .map_err(|e| WardenError::Config(format!("invalid mode rule: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            marker,
            rules,
            ignore_bots: config.ignore_bots,
        })
    }

    /// Classify a trigger.
    ///
    /// Comment events need the mention phrase followed by non-empty text.
    /// Open/update events always get [`DEFAULT_COMMAND`] in review mode;
    /// a mention in the subject body is not a request.
    /// Bot authors (when configured) and our own published comments never
    /// produce an instruction.
    pub fn classify(&self, trigger: &Trigger) -> Option<Instruction> {
        if self.ignore_bots && is_bot(&trigger.actor) {
            tracing::debug!(actor = %trigger.actor, "ignoring bot-authored trigger");
            return None;
        }

        let text = trigger.raw_text.as_deref().unwrap_or("");
        if text.contains(RUN_MARKER_PREFIX) {
            return None;
        }

        if !trigger.event_kind.is_comment() {
            return Some(Instruction {
                command: DEFAULT_COMMAND.to_string(),
                mode: Mode::Review,
            });
        }

        let command = self.extract_command(text)?;
        let mode = self.infer_mode(&command);
        Some(Instruction { command, mode })
    }

    /// Text following the first mention, whitespace-collapsed; `None` when
    /// the phrase is absent or nothing follows it.
    ///
    /// # Examples
    ///
    /// ```
    /// use prwarden_core::TriggerConfig;
    /// use prwarden_review::classifier::Classifier;
    ///
    /// let classifier = Classifier::new(&TriggerConfig::default()).unwrap();
    /// assert_eq!(
    ///     classifier.extract_command("Hey @Claude:  fix the\nnull check").as_deref(),
    ///     Some("fix the null check")
    /// );
    /// assert!(classifier.extract_command("@claude   ").is_none());
    /// assert!(classifier.extract_command("looks good to me").is_none());
    /// ```
    pub fn extract_command(&self, text: &str) -> Option<String> {
        let rest = self.marker.captures(text)?.get(1)?.as_str();
        let command = normalize(rest.trim_start_matches(|c: char| {
            c.is_whitespace() || matches!(c, ':' | ',' | '-')
        }));
        (!command.is_empty()).then_some(command)
    }

    /// Infer the mode of a normalized command from the rule table.
    pub fn infer_mode(&self, command: &str) -> Mode {
        let leading = command
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_start_matches(|c: char| !c.is_alphanumeric());
        for rule in &self.rules {
            let haystack = match rule.scope {
                Scope::LeadingVerb => leading,
                Scope::Anywhere => command,
            };
            if rule.regex.is_match(haystack) {
                return rule.mode;
            }
        }
        Mode::Review
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_bot(actor: &str) -> bool {
    actor.ends_with("[bot]")
}
