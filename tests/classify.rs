use std::process::Command;

fn classify(dir: &std::path::Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_prwarden"))
        .arg("classify")
        .args(args)
        .current_dir(dir)
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("GITHUB_TOKEN")
        .output()
        .unwrap()
}

#[test]
fn classify_reports_mode_and_command() {
    let dir = tempfile::tempdir().unwrap();
    let output = classify(dir.path(), &["@claude fix the null check in parser"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("mode:    fix"));
    assert!(stdout.contains("command: fix the null check in parser"));
}

#[test]
fn classify_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = classify(dir.path(), &["--format", "json", "@claude help me plan a rollout"]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["addressed"], true);
    assert_eq!(value["mode"], "plan");
}

#[test]
fn classify_without_marker_is_not_addressed() {
    let dir = tempfile::tempdir().unwrap();
    let output = classify(dir.path(), &["--format", "json", "looks good to me"]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["addressed"], false);
}

#[test]
fn classify_honours_configured_phrase() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".prwarden.toml"),
        "[trigger]\nphrase = \"/warden\"\n",
    )
    .unwrap();

    let output = classify(dir.path(), &["--format", "json", "/warden review this code"]);
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["addressed"], true);
    assert_eq!(value["mode"], "review");
}

#[test]
fn classify_text_output_for_unaddressed_comment() {
    let dir = tempfile::tempdir().unwrap();
    let output = classify(dir.path(), &["nice work"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("no-op"));
}

#[test]
fn classify_opened_pull_request_defaults_to_review() {
    let dir = tempfile::tempdir().unwrap();
    let output = classify(
        dir.path(),
        &["--format", "json", "--event-kind", "pull_request", "Adds retry support"],
    );
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["addressed"], true);
    assert_eq!(value["mode"], "review");
}
