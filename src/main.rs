use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, WrapErr};
use prwarden_core::{EventKind, OutputFormat, SubjectRef, Trigger, WardenConfig};
use prwarden_github::event::{split_repo, trigger_from_event};
use prwarden_github::GitHubClient;
use prwarden_review::classifier::Classifier;
use prwarden_review::llm::LlmClient;
use prwarden_review::pipeline::{IgnoreReason, Pipeline, RunOutcome};
use prwarden_review::remediation::RemediationOutcome;
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = ".prwarden.toml";

#[derive(Parser)]
#[command(
    name = "prwarden",
    version,
    about = "Mention-driven pull request and issue assistant",
    long_about = "prwarden reacts to a mention (default: @claude) in a pull request or issue,\n\
                   asks a reasoning service to review, plan, or fix, and posts exactly one comment.\n\
                   In fix mode, proposed changes land on a new branch with a pull request for\n\
                   human review.\n\n\
                   Examples:\n  \
                     prwarden run                                   Handle the current GitHub Actions event\n  \
                     prwarden run --repo octo/app --subject 7 --text '@claude review this code'\n  \
                     prwarden classify '@claude plan the rollout'   Show which mode a comment selects\n  \
                     prwarden init                                  Write a default .prwarden.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .prwarden.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Handle one trigger: classify, analyze, remediate, comment
    #[command(long_about = "Handle one trigger: classify, analyze, remediate, comment.\n\n\
        Without --subject, reads the webhook event that GitHub Actions exposes through\n\
        GITHUB_EVENT_NAME and GITHUB_EVENT_PATH. With --subject, builds a manual trigger\n\
        from --text instead.\n\n\
        Writes mode, has_changes, comment_url and remediation_url to $GITHUB_OUTPUT\n\
        when that variable is set.")]
    Run {
        /// Event name, e.g. issue_comment
        #[arg(long, env = "GITHUB_EVENT_NAME")]
        event_name: Option<String>,

        /// Path to the event payload JSON
        #[arg(long, env = "GITHUB_EVENT_PATH")]
        event_path: Option<PathBuf>,

        /// Repository as owner/repo
        #[arg(long, env = "GITHUB_REPOSITORY")]
        repo: Option<String>,

        /// Workflow run id, used to tell repeated deliveries apart
        #[arg(long, env = "GITHUB_RUN_ID")]
        run_id: Option<String>,

        /// Pull request or issue number for a manual trigger
        #[arg(long, requires = "text")]
        subject: Option<u64>,

        /// Trigger text for a manual trigger
        #[arg(long)]
        text: Option<String>,

        /// Actor for a manual trigger
        #[arg(long, env = "GITHUB_ACTOR", default_value = "local")]
        actor: String,
    },
    /// Show how a comment would be classified, without calling any service
    Classify {
        /// Comment text
        text: String,

        /// Event kind the text arrived with (issue_comment, review_comment, pull_request, issues)
        #[arg(long, default_value = "manual")]
        event_kind: EventKind,
    },
    /// Create a default .prwarden.toml configuration file
    #[command(long_about = "Create a default .prwarden.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .prwarden.toml already exists.")]
    Init,
}

const DEFAULT_CONFIG: &str = r#"# prwarden configuration
# Environment variables override file values: ANTHROPIC_API_KEY / OPENAI_API_KEY,
# CLAUDE_MODEL, MAX_TOKENS, THINKING_BUDGET, GITHUB_TOKEN, GITHUB_API_URL.

[llm]
# provider = "anthropic"            # or "openai"
# model = "claude-sonnet-4-20250514"
# base_url = "https://api.anthropic.com"
# max_tokens = 4000
# thinking_budget = 2048            # at least 1024, below max_tokens
# timeout_secs = 120

[github]
# api_base = "https://api.github.com"
# timeout_secs = 30
# read_attempts = 3
# retry_delay_ms = 500

[trigger]
# phrase = "@claude"
# ignore_bots = true

[context]
# max_file_bytes = 100000
# max_total_bytes = 400000
# skip_patterns = ["*.min.js", "vendor/**", "dist/**"]
# include_history = true

[remediation]
# enabled = true
# labels = ["needs-human-review"]

[publish]
# dedupe = false
"#;

fn init_tracing(verbose: bool) {
    let default = if verbose { "prwarden=debug,warn" } else { "prwarden=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<WardenConfig> {
    let mut config = match path {
        Some(path) => WardenConfig::from_file(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to load {}", path.display()))?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                WardenConfig::from_file(default_path)
                    .into_diagnostic()
                    .wrap_err("failed to load .prwarden.toml")?
            } else {
                WardenConfig::default()
            }
        }
    };
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

fn build_trigger(
    event_name: Option<String>,
    event_path: Option<PathBuf>,
    repo: Option<String>,
    run_id: Option<String>,
    subject: Option<u64>,
    text: Option<String>,
    actor: String,
) -> Result<Option<Trigger>> {
    if let Some(number) = subject {
        let repo = repo.ok_or_else(|| miette::miette!("--subject needs --repo or GITHUB_REPOSITORY"))?;
        let (owner, name) = split_repo(&repo).into_diagnostic()?;
        return Ok(Some(Trigger {
            event_kind: EventKind::Manual,
            raw_text: text,
            actor,
            subject: Some(SubjectRef::new(owner, name, number)),
            delivery_id: run_id,
        }));
    }

    let (Some(event_name), Some(event_path)) = (event_name, event_path) else {
        miette::bail!(miette::miette!(
            help = "run inside GitHub Actions, or pass --repo, --subject and --text",
            "no event to handle"
        ));
    };
    let raw = std::fs::read_to_string(&event_path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read event payload {}", event_path.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&raw)
        .into_diagnostic()
        .wrap_err("event payload is not valid JSON")?;
    trigger_from_event(&event_name, &payload, repo.as_deref(), run_id.as_deref()).into_diagnostic()
}

/// Append `key=value` lines to the file named by `GITHUB_OUTPUT`.
fn write_step_outputs(outputs: &[(&str, String)]) -> Result<()> {
    let Ok(path) = std::env::var("GITHUB_OUTPUT") else {
        return Ok(());
    };
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .into_diagnostic()
        .wrap_err("failed to open GITHUB_OUTPUT")?;
    for (key, value) in outputs {
        writeln!(file, "{key}={}", value.replace('\n', " ")).into_diagnostic()?;
    }
    Ok(())
}

fn step_outputs(outcome: Option<&RunOutcome>) -> Vec<(&'static str, String)> {
    match outcome {
        Some(RunOutcome::Published(report)) => vec![
            ("mode", report.instruction.mode.to_string()),
            ("has_changes", report.has_changes.to_string()),
            ("comment_url", report.comment.html_url.clone()),
            (
                "remediation_url",
                report
                    .remediation
                    .pull_request()
                    .map(|pr| pr.html_url.clone())
                    .unwrap_or_default(),
            ),
        ],
        _ => vec![
            ("mode", "none".to_string()),
            ("has_changes", "false".to_string()),
            ("comment_url", String::new()),
            ("remediation_url", String::new()),
        ],
    }
}

fn print_outcome(outcome: Option<&RunOutcome>, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        let value = match outcome {
            Some(outcome) => serde_json::to_value(outcome).into_diagnostic()?,
            None => serde_json::json!({ "outcome": "ignored", "reason": "unsupported_event" }),
        };
        println!("{}", serde_json::to_string_pretty(&value).into_diagnostic()?);
        return Ok(());
    }

    match outcome {
        None => println!("Event not handled; nothing to do."),
        Some(RunOutcome::Ignored(IgnoreReason::NotAddressed)) => {
            println!("Trigger not addressed to prwarden; nothing to do.");
        }
        Some(RunOutcome::Ignored(IgnoreReason::AlreadyPublished { comment_id })) => {
            println!("Result already published (comment {comment_id}); nothing to do.");
        }
        Some(RunOutcome::Published(report)) => {
            println!("Subject:  {}", report.subject);
            println!("Mode:     {}", report.instruction.mode);
            println!("Command:  {}", report.instruction.command);
            if report.analysis_failed {
                println!("Analysis: failed (reported in comment)");
            }
            match &report.remediation {
                RemediationOutcome::Opened {
                    branch,
                    pull_request,
                } => println!("Fix PR:   #{} on {} ({})", pull_request.number, branch.name, pull_request.html_url),
                RemediationOutcome::NotCreated { step, reason } => {
                    println!("Fix PR:   not created ({step} failed: {reason})");
                }
                RemediationOutcome::Disabled => println!("Fix PR:   remediation disabled"),
                RemediationOutcome::NotAttempted => {}
            }
            println!("Comment:  {}", report.comment.html_url);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run {
            event_name,
            event_path,
            repo,
            run_id,
            subject,
            text,
            actor,
        } => {
            let config = load_config(cli.config.as_deref())?;
            config.validate().into_diagnostic()?;

            let trigger = build_trigger(event_name, event_path, repo, run_id, subject, text, actor)?;
            let Some(trigger) = trigger else {
                tracing::info!("event does not produce a run");
                write_step_outputs(&step_outputs(None))?;
                return print_outcome(None, cli.format);
            };

            let platform = GitHubClient::new(&config.github).into_diagnostic()?;
            let service = LlmClient::new(&config.llm).into_diagnostic()?;
            let pipeline = Pipeline::new(&platform, &service, &config).into_diagnostic()?;

            let outcome = pipeline
                .run(&trigger)
                .await
                .into_diagnostic()
                .wrap_err("run aborted before a comment was posted")?;

            write_step_outputs(&step_outputs(Some(&outcome)))?;
            print_outcome(Some(&outcome), cli.format)?;
        }
        Command::Classify { text, event_kind } => {
            let config = load_config(cli.config.as_deref())?;
            let classifier = Classifier::new(&config.trigger).into_diagnostic()?;
            let trigger = Trigger {
                event_kind,
                raw_text: Some(text),
                actor: "local".into(),
                subject: None,
                delivery_id: None,
            };
            let instruction = classifier.classify(&trigger);
            match cli.format {
                OutputFormat::Json => {
                    let value = match &instruction {
                        Some(i) => serde_json::json!({
                            "addressed": true,
                            "mode": i.mode,
                            "command": i.command,
                        }),
                        None => serde_json::json!({ "addressed": false }),
                    };
                    println!("{}", serde_json::to_string_pretty(&value).into_diagnostic()?);
                }
                OutputFormat::Text => match instruction {
                    Some(i) => {
                        println!("mode:    {}", i.mode);
                        println!("command: {}", i.command);
                    }
                    None => println!("no-op ({} not found or nothing follows it)", config.trigger.phrase),
                },
            }
        }
        Command::Init => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!(".prwarden.toml already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .prwarden.toml with default configuration");
        }
    }

    Ok(())
}
