use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::WardenError;

/// Top-level configuration loaded from `.prwarden.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
/// A run receives the resolved value by shared reference and never mutates it.
///
/// # Examples
///
/// ```
/// use prwarden_core::WardenConfig;
///
/// let config = WardenConfig::default();
/// assert_eq!(config.trigger.phrase, "@claude");
/// assert_eq!(config.llm.max_tokens, 4000);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Reasoning service settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Hosting platform settings.
    #[serde(default)]
    pub github: GitHubConfig,
    /// Mention marker handling.
    #[serde(default)]
    pub trigger: TriggerConfig,
    /// Context size bounds and filters.
    #[serde(default)]
    pub context: ContextConfig,
    /// Remediation branch / pull request settings.
    #[serde(default)]
    pub remediation: RemediationConfig,
    /// Comment publishing settings.
    #[serde(default)]
    pub publish: PublishConfig,
}

impl WardenConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Io`] if the file cannot be read, or
    /// [`WardenError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use prwarden_core::WardenConfig;
    /// use std::path::Path;
    ///
    /// let config = WardenConfig::from_file(Path::new(".prwarden.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, WardenError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use prwarden_core::WardenConfig;
    ///
    /// let toml = r#"
    /// [trigger]
    /// phrase = "@warden"
    /// "#;
    /// let config = WardenConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.trigger.phrase, "@warden");
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, WardenError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Overlay values from the environment.
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`; taking it as a
    /// parameter keeps the overlay testable without touching process state.
    /// Empty values are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use prwarden_core::WardenConfig;
    ///
    /// let mut config = WardenConfig::default();
    /// config.apply_env(|key| match key {
    ///     "CLAUDE_MODEL" => Some("claude-opus-4-1".to_string()),
    ///     _ => None,
    /// });
    /// assert_eq!(config.llm.model, "claude-opus-4-1");
    /// ```
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.llm.api_key.is_none() {
            self.llm.api_key = get(self.llm.provider.api_key_env());
        }
        if let Some(model) = get("CLAUDE_MODEL") {
            self.llm.model = model;
        }
        if let Some(max) = get("MAX_TOKENS").and_then(|v| v.trim().parse().ok()) {
            self.llm.max_tokens = max;
        }
        if let Some(budget) = get("THINKING_BUDGET").and_then(|v| v.trim().parse().ok()) {
            self.llm.thinking_budget = Some(budget);
        }
        if self.github.token.is_none() {
            self.github.token = get("GITHUB_TOKEN").or_else(|| get("GH_TOKEN"));
        }
        if let Some(api_base) = get("GITHUB_API_URL") {
            self.github.api_base = api_base;
        }
    }

    /// Check that the configuration can drive a run.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Config`] describing the first problem found.
    ///
    /// # Examples
    ///
    /// ```
    /// use prwarden_core::WardenConfig;
    ///
    /// let mut config = WardenConfig::default();
    /// assert!(config.validate().is_err()); // no credentials yet
    ///
    /// config.llm.api_key = Some("sk-test".into());
    /// config.github.token = Some("ghp_test".into());
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), WardenError> {
        if self.trigger.phrase.trim().is_empty() {
            return Err(WardenError::Config("trigger phrase must not be empty".into()));
        }
        if self.llm.api_key.is_none() {
            return Err(WardenError::Config(format!(
                "no API key for LLM provider '{}'; set {} or llm.api_key",
                self.llm.provider,
                self.llm.provider.api_key_env()
            )));
        }
        if self.github.token.is_none() {
            return Err(WardenError::Config(
                "no GitHub token; set GITHUB_TOKEN or github.token".into(),
            ));
        }
        if self.llm.max_tokens == 0 {
            return Err(WardenError::Config("llm.max_tokens must be positive".into()));
        }
        if let Some(budget) = self.llm.thinking_budget {
            if budget < 1024 {
                return Err(WardenError::Config(format!(
                    "llm.thinking_budget must be at least 1024, got {budget}"
                )));
            }
            if budget >= self.llm.max_tokens {
                return Err(WardenError::Config(format!(
                    "llm.thinking_budget ({budget}) must be less than llm.max_tokens ({})",
                    self.llm.max_tokens
                )));
            }
        }
        if self.github.read_attempts == 0 {
            return Err(WardenError::Config("github.read_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Which reasoning-service API to speak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Anthropic Messages API.
    #[default]
    Anthropic,
    /// OpenAI-compatible chat completions.
    OpenAi,
}

impl LlmProvider {
    /// Environment variable holding this provider's API key.
    pub fn api_key_env(self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::OpenAi => "OPENAI_API_KEY",
        }
    }

    /// Base URL used when none is configured.
    pub fn default_base_url(self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "https://api.anthropic.com",
            LlmProvider::OpenAi => "https://api.openai.com",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::Anthropic => write!(f, "anthropic"),
            LlmProvider::OpenAi => write!(f, "openai"),
        }
    }
}

/// Reasoning service configuration.
///
/// # Examples
///
/// ```
/// use prwarden_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.timeout_secs, 120);
/// assert!(config.thinking_budget.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API flavour.
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
    /// Output cap in tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Reasoning-depth budget in tokens; `None` disables extended thinking.
    pub thinking_budget: Option<u32>,
    /// Request timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_llm_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_model(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            thinking_budget: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Hosting platform configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API token.
    pub token: Option<String>,
    /// REST API root.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_github_timeout")]
    pub timeout_secs: u64,
    /// Attempts for idempotent reads (writes are never retried).
    #[serde(default = "default_read_attempts")]
    pub read_attempts: u32,
    /// Delay before the first read retry; doubles on each further attempt.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_api_base() -> String {
    "https://api.github.com".into()
}

fn default_github_timeout() -> u64 {
    30
}

fn default_read_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_api_base(),
            timeout_secs: default_github_timeout(),
            read_attempts: default_read_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Mention marker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Case-insensitive marker a comment must contain to be acted on.
    #[serde(default = "default_phrase")]
    pub phrase: String,
    /// Ignore comments written by `[bot]` accounts.
    #[serde(default = "default_true")]
    pub ignore_bots: bool,
}

fn default_phrase() -> String {
    "@claude".into()
}

fn default_true() -> bool {
    true
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            phrase: default_phrase(),
            ignore_bots: true,
        }
    }
}

/// Context assembly bounds.
///
/// # Examples
///
/// ```
/// use prwarden_core::ContextConfig;
///
/// let config = ContextConfig::default();
/// assert!(config.max_file_bytes < config.max_total_bytes);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Files whose patch + content exceed this are omitted.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
    /// Upper bound for all file text combined.
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: usize,
    /// Glob patterns for files to leave out.
    #[serde(default)]
    pub skip_patterns: Vec<String>,
    /// Include earlier mention commands in fix mode.
    #[serde(default = "default_true")]
    pub include_history: bool,
}

fn default_max_file_bytes() -> usize {
    100_000
}

fn default_max_total_bytes() -> usize {
    400_000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_total_bytes: default_max_total_bytes(),
            skip_patterns: Vec::new(),
            include_history: true,
        }
    }
}

/// Remediation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationConfig {
    /// Create branches and pull requests for fix-mode edits.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Labels added to remediation pull requests.
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
}

fn default_labels() -> Vec<String> {
    vec!["needs-human-review".into()]
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            labels: default_labels(),
        }
    }
}

/// Comment publishing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Skip the run when a comment for the same trigger already exists.
    #[serde(default)]
    pub dedupe: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> WardenConfig {
        let mut config = WardenConfig::default();
        config.llm.api_key = Some("key".into());
        config.github.token = Some("token".into());
        config
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = WardenConfig::default();
        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
        assert_eq!(config.llm.max_tokens, 4000);
        assert_eq!(config.github.api_base, "https://api.github.com");
        assert_eq!(config.github.read_attempts, 3);
        assert!(config.trigger.ignore_bots);
        assert_eq!(config.context.max_file_bytes, 100_000);
        assert!(config.context.include_history);
        assert!(config.remediation.enabled);
        assert_eq!(config.remediation.labels, vec!["needs-human-review"]);
        assert!(!config.publish.dedupe);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[llm]
provider = "openai"
model = "gpt-4o"
base_url = "http://localhost:11434"
max_tokens = 8000
thinking_budget = 2048

[github]
read_attempts = 5

[trigger]
phrase = "@warden"
ignore_bots = false

[context]
max_file_bytes = 5000
skip_patterns = ["*.snap", "fixtures/**"]

[remediation]
enabled = false
labels = []

[publish]
dedupe = true
"#;
        let config = WardenConfig::from_toml(toml).unwrap();
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.thinking_budget, Some(2048));
        assert_eq!(config.github.read_attempts, 5);
        assert_eq!(config.trigger.phrase, "@warden");
        assert!(!config.trigger.ignore_bots);
        assert_eq!(config.context.skip_patterns, vec!["*.snap", "fixtures/**"]);
        assert_eq!(config.context.max_total_bytes, 400_000);
        assert!(!config.remediation.enabled);
        assert!(config.remediation.labels.is_empty());
        assert!(config.publish.dedupe);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = WardenConfig::from_toml("").unwrap();
        assert_eq!(config.trigger.phrase, "@claude");
    }

    #[test]
    fn invalid_toml_returns_error() {
        assert!(WardenConfig::from_toml("{{invalid}}").is_err());
    }

    #[test]
    fn env_overlay_uses_provider_key_and_keeps_file_values() {
        let mut config = WardenConfig::default();
        config.llm.provider = LlmProvider::OpenAi;
        config.github.token = Some("from-file".into());
        config.apply_env(|key| match key {
            "OPENAI_API_KEY" => Some("sk-openai".into()),
            "ANTHROPIC_API_KEY" => Some("sk-ant".into()),
            "GITHUB_TOKEN" => Some("from-env".into()),
            "MAX_TOKENS" => Some("6000".into()),
            _ => None,
        });
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-openai"));
        assert_eq!(config.github.token.as_deref(), Some("from-file"));
        assert_eq!(config.llm.max_tokens, 6000);
    }

    #[test]
    fn env_overlay_ignores_empty_and_unparsable_values() {
        let mut config = WardenConfig::default();
        config.apply_env(|key| match key {
            "GITHUB_TOKEN" => Some("  ".into()),
            "GH_TOKEN" => Some("gh".into()),
            "MAX_TOKENS" => Some("lots".into()),
            _ => None,
        });
        assert_eq!(config.github.token.as_deref(), Some("gh"));
        assert_eq!(config.llm.max_tokens, 4000);
    }

    #[test]
    fn validate_rejects_bad_thinking_budget() {
        let mut config = ready();
        config.llm.thinking_budget = Some(512);
        assert!(config.validate().is_err());

        config.llm.thinking_budget = Some(4000);
        assert!(config.validate().is_err());

        config.llm.thinking_budget = Some(2048);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_phrase() {
        let mut config = ready();
        config.trigger.phrase = "  ".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("trigger phrase"));
    }

    #[test]
    fn validate_requires_credentials() {
        let mut config = ready();
        config.github.token = None;
        assert!(config.validate().is_err());
    }
}
