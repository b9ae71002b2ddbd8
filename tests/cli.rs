use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn tubegrab(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tubegrab").unwrap();
    cmd.arg("--config").arg(config).env_remove("TUBEGRAB_OUTPUT_DIR");
    cmd
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("tubegrab")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("YouTube"))
        .stdout(predicate::str::contains("tui"))
        .stdout(predicate::str::contains("--format"));
}

#[test]
fn non_youtube_url_is_rejected() {
    let dir = tempfile::tempdir().unwrap();

    tubegrab(&dir.path().join("config.yaml"))
        .arg("https://example.com/watch?v=abc123")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid YouTube URL"));
}

#[test]
fn missing_url_is_an_error() {
    let dir = tempfile::tempdir().unwrap();

    tubegrab(&dir.path().join("config.yaml"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("URL is required"));
}

#[test]
fn config_show_prints_defaults_and_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");

    tubegrab(&config)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MP3 quality: 2"))
        .stdout(predicate::str::contains("AAC bitrate: 192k"));

    assert!(config.exists());
}

#[test]
fn invalid_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, "audio:\n  mp3_quality: 15\n").unwrap();

    tubegrab(&config)
        .args(["config", "--show"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("mp3_quality"));
}

#[test]
fn doctor_reports_missing_tools() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(
        &config,
        "tools:\n  yt_dlp: /nonexistent/yt-dlp\n  ffmpeg: /nonexistent/ffmpeg\n  ffprobe: /nonexistent/ffprobe\n",
    )
    .unwrap();

    tubegrab(&config)
        .arg("doctor")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("/nonexistent/yt-dlp: not found"))
        .stderr(predicate::str::contains("3 of 3 tools could not be run"));
}
