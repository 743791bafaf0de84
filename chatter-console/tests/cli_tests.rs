//! Integration tests for the `chatter` binary.

use assert_cmd::{Command, cargo::cargo_bin_cmd};
use predicates::prelude::PredicateBooleanExt;
use tempfile::TempDir;

/// A command isolated from the caller's environment and config files.
fn chatter(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("chatter");
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env("HOME", dir.path())
        .env_remove("CHATTER_API_BASE_URL")
        .env_remove("CHATTER_PUSH_BASE_URL")
        .env_remove("CHATTER_API_TOKEN")
        .env_remove("CHATTER_PAGE_SIZE")
        .env_remove("CHATTER_LOG_LEVEL")
        .env_remove("CHATTER_LOG_FORMAT")
        .env_remove("RUST_LOG")
        .timeout(std::time::Duration::from_secs(10));
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    chatter(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("conversations"))
        .stdout(predicates::str::contains("open"))
        .stdout(predicates::str::contains("fan"))
        .stdout(predicates::str::contains("completion"))
        .stdout(predicates::str::contains("--api-url"));
}

#[test]
fn test_open_requires_conversation() {
    let dir = TempDir::new().unwrap();
    chatter(&dir)
        .arg("open")
        .assert()
        .failure()
        .stderr(predicates::str::contains(
            "the following required arguments were not provided",
        ))
        .stderr(predicates::str::contains("<CONVERSATION>"));
}

#[test]
fn test_open_rejects_non_numeric_conversation() {
    let dir = TempDir::new().unwrap();
    chatter(&dir)
        .args(["open", "five"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("invalid value"));
}

#[test]
fn test_config_generates_yaml_by_default() {
    let dir = TempDir::new().unwrap();
    chatter(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicates::str::contains("config.yaml"));

    let written = std::fs::read_to_string(dir.path().join("config.yaml")).unwrap();
    assert!(written.contains("page_size: 25"));
    assert!(written.contains("api_base_url"));
}

#[test]
fn test_config_generates_json() {
    let dir = TempDir::new().unwrap();
    chatter(&dir).args(["config", "--format", "json"]).assert().success();

    let written = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(value["page_size"], 25);
    assert_eq!(value["log_format"], "text");
}

#[test]
fn test_completion_script_names_binary() {
    let dir = TempDir::new().unwrap();
    chatter(&dir)
        .args(["completion", "--shell", "bash"])
        .assert()
        .success()
        .stdout(predicates::str::contains("chatter"));
}

#[test]
fn test_invalid_page_size_is_reported() {
    let dir = TempDir::new().unwrap();
    chatter(&dir)
        .args(["--page-size", "0", "conversations"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("failed to load configuration"))
        .stderr(predicates::str::contains("Invalid page size"));
}

#[test]
fn test_config_file_is_honoured() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("bad.yaml"), "api_base_url: ftp://example.com/\n").unwrap();

    chatter(&dir)
        .args(["--config", "bad.yaml", "conversations"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("http or https"));
}

#[test]
fn test_unreachable_backend_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    chatter(&dir)
        .args(["--api-url", "http://127.0.0.1:9/api", "conversations"])
        .assert()
        .failure()
        .stderr(
            predicates::str::contains("failed to load conversations")
                .or(predicates::str::contains("request failed")),
        );
}
