//! CLI integration tests: run the actual healthchat binary.
//! Marked `#[ignore]` to skip in normal `cargo test`.

use std::path::PathBuf;
use std::process::{Command, Stdio};

fn healthchat() -> Command {
    Command::new(env!("CARGO_BIN_EXE_healthchat"))
}

/// A command whose session file lives in a fresh temp location.
fn isolated(session: &PathBuf) -> Command {
    let mut cmd = healthchat();
    cmd.env("HEALTHCHAT__STORAGE__PATH", session)
        .env("HEALTHCHAT__CLIENT__PROXY_URL", "http://127.0.0.1:1/api/proxy/")
        .stdin(Stdio::null());
    cmd
}

fn temp_session() -> PathBuf {
    std::env::temp_dir().join(format!("healthchat-cli-{}.json", uuid::Uuid::now_v7()))
}

#[test]
#[ignore]
fn test_cli_help() {
    let output = healthchat().arg("--help").output().expect("failed to execute");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("signin"));
    assert!(stdout.contains("chat"));
}

#[test]
#[ignore]
fn test_cli_home_signed_out() {
    let session = temp_session();
    let output = isolated(&session)
        .arg("home")
        .output()
        .expect("failed to execute");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("healthchat signin"));
}

#[test]
#[ignore]
fn test_cli_chat_requires_session() {
    let session = temp_session();
    let output = isolated(&session)
        .args(["chat", "list", "--json"])
        .output()
        .expect("failed to execute");
    assert!(!output.status.success(), "chat list without a session should fail");
    assert!(String::from_utf8_lossy(&output.stderr).contains("Not signed in"));
}

#[test]
#[ignore]
fn test_cli_debug_reads_stored_session() {
    let session = temp_session();
    std::fs::write(
        &session,
        r#"{"token": "abcdefghijklmnopqrstuvwxyz", "refreshToken": "r"}"#,
    )
    .unwrap();

    let output = isolated(&session)
        .arg("debug")
        .output()
        .expect("failed to execute");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("abcdefghijklmnopqrst..."));
    assert!(!stdout.contains("uvwxyz"));

    let clear = isolated(&session)
        .args(["debug", "--clear"])
        .output()
        .expect("failed to execute");
    assert!(clear.status.success());
    assert!(!session.exists(), "cleared session file should be removed");
}

#[test]
#[ignore]
fn test_cli_delete_refuses_without_confirmation() {
    let session = temp_session();
    std::fs::write(&session, r#"{"token": "t", "refreshToken": "r"}"#).unwrap();

    // stdin is empty, so the prompt is answered "no" and nothing is sent.
    let output = isolated(&session)
        .args(["chat", "delete", "1"])
        .output()
        .expect("failed to execute");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("cancelled"));
    let _ = std::fs::remove_file(&session);
}

#[test]
#[ignore]
fn test_cli_unreachable_proxy_hint() {
    let session = temp_session();
    std::fs::write(&session, r#"{"token": "t", "refreshToken": "r"}"#).unwrap();

    let output = isolated(&session)
        .arg("dashboard")
        .output()
        .expect("failed to execute");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("healthchat-web"));
    let _ = std::fs::remove_file(&session);
}

#[test]
#[ignore]
fn test_cli_init_creates_config() {
    let tmp = std::env::temp_dir().join(format!("healthchat-init-test-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&tmp).unwrap();

    let output = healthchat()
        .arg("init")
        .current_dir(&tmp)
        .output()
        .expect("failed to execute");
    assert!(
        output.status.success(),
        "init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let config_path = tmp.join(".healthchat").join("config.toml");
    assert!(config_path.exists(), "config.toml should exist");
    let contents = std::fs::read_to_string(&config_path).unwrap();
    assert!(contents.contains("[upstream]"));
    assert!(contents.contains("lbserver.clintechso.com"));

    let gitignore = std::fs::read_to_string(tmp.join(".gitignore")).unwrap();
    assert!(gitignore.contains(".healthchat/config.local.toml"));

    let _ = std::fs::remove_dir_all(&tmp);
}
