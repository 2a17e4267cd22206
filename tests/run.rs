use std::process::Command;

#[test]
fn run_without_credentials_fails_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_prwarden"))
        .args(["run", "--repo", "octo/app", "--subject", "7", "--text", "@claude review"])
        .current_dir(dir.path())
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("GITHUB_TOKEN")
        .env_remove("GH_TOKEN")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ANTHROPIC_API_KEY"), "stderr: {stderr}");
}

#[test]
fn unsupported_event_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let event = dir.path().join("event.json");
    std::fs::write(&event, r#"{ "ref": "refs/heads/main" }"#).unwrap();
    let outputs = dir.path().join("outputs.txt");

    let output = Command::new(env!("CARGO_BIN_EXE_prwarden"))
        .args(["--format", "json", "run"])
        .current_dir(dir.path())
        .env("GITHUB_EVENT_NAME", "push")
        .env("GITHUB_EVENT_PATH", &event)
        .env("GITHUB_REPOSITORY", "octo/app")
        .env("GITHUB_OUTPUT", &outputs)
        .env("ANTHROPIC_API_KEY", "sk-test")
        .env("GITHUB_TOKEN", "ghp_test")
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["outcome"], "ignored");

    let written = std::fs::read_to_string(&outputs).unwrap();
    assert!(written.contains("mode=none"));
    assert!(written.contains("has_changes=false"));
}
