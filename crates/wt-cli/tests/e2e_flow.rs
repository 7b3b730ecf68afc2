//! End-to-end integration tests for the ingestion and analytics flow.
//!
//! Tests the full pipeline: import → consolidate → concurrency/sessions

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

fn wt_binary() -> String {
    env!("CARGO_BIN_EXE_wt").to_string()
}

/// Writes a config file pointing at a database inside `temp`.
fn write_config(temp: &Path) -> std::path::PathBuf {
    let db_path = temp.join("data").join("wt.db");
    let config_path = temp.join("config.toml");
    std::fs::write(
        &config_path,
        format!("database_path = \"{}\"\n", db_path.display()),
    )
    .unwrap();
    config_path
}

fn wt(temp: &Path, config: &Path, args: &[&str], stdin: Option<&str>) -> Output {
    let mut child = Command::new(wt_binary())
        .env("HOME", temp)
        .env("XDG_CONFIG_HOME", temp.join("xdg-config"))
        .env("XDG_DATA_HOME", temp.join("xdg-data"))
        .arg("--config")
        .arg(config)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run wt");
    {
        let mut child_stdin = child.stdin.take().unwrap();
        if let Some(input) = stdin {
            child_stdin.write_all(input.as_bytes()).unwrap();
        }
    }
    let output = child.wait_with_output().unwrap();
    assert!(
        output.status.success(),
        "wt {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

const POLLER_REPORTS: &str = r#"{"server_id":"srv-1","user":"alice","title":"Heat","media_type":"movie","started_at":"2025-01-01T20:00:00Z","stopped_at":"2025-01-01T20:40:00Z","watched_ms":2400000,"decision":"direct play"}
{"server_id":"srv-1","user":"bob","title":"Alien","media_type":"movie","started_at":"2025-01-01T20:10:00Z","stopped_at":"2025-01-01T21:30:00Z","watched_ms":4800000,"decision":"transcode"}
{"server_id":"srv-2","user":"carol","title":"Heat","media_type":"movie","started_at":"2025-01-01T20:20:00Z","stopped_at":"2025-01-01T20:50:00Z","watched_ms":1800000,"decision":"copy"}
"#;

/// Re-importing the same reports from a second collector creates nothing.
#[test]
fn test_import_is_deduplicated_across_collectors() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    let first = wt(temp.path(), &config, &["import"], Some(POLLER_REPORTS));
    assert_eq!(
        stdout(&first),
        "Imported 3 report(s): 3 new, 0 skipped, 0 merged, 0 rejected.\n"
    );

    // Importer saw the same plays a few seconds later
    let skewed = POLLER_REPORTS.replace(":00Z\",\"stopped_at", ":20Z\",\"stopped_at");
    let second = wt(temp.path(), &config, &["import"], Some(&skewed));
    assert_eq!(
        stdout(&second),
        "Imported 3 report(s): 0 new, 3 skipped, 0 merged, 0 rejected.\n"
    );

    let status = wt(temp.path(), &config, &["status"], None);
    assert!(
        stdout(&status).contains("Sessions: 3"),
        "unexpected status: {}",
        stdout(&status)
    );
}

/// Raw history is folded by `consolidate`, once.
#[test]
fn test_raw_history_consolidates_once() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    let fragments = r#"{"server_id":"srv-1","user":"alice","title":"Heat","started_at":"2025-01-01T20:00:00Z","stopped_at":"2025-01-01T20:30:00Z","watched_ms":1800000}
{"server_id":"srv-1","user":"alice","title":"Heat","started_at":"2025-01-01T20:35:00Z","stopped_at":"2025-01-01T21:00:00Z","watched_ms":1500000}
{"server_id":"srv-1","user":"alice","title":"Heat","started_at":"2025-01-02T20:00:00Z","stopped_at":"2025-01-02T20:10:00Z","watched_ms":600000}
"#;
    let imported = wt(temp.path(), &config, &["import", "--raw"], Some(fragments));
    assert_eq!(stdout(&imported), "Appended 3 raw session(s).\n");

    let first = wt(temp.path(), &config, &["consolidate"], None);
    assert_eq!(
        stdout(&first),
        "Scanned 1 group(s): folded 1 chain(s), absorbed 1 row(s).\n"
    );

    let second = wt(temp.path(), &config, &["consolidate"], None);
    assert_eq!(
        stdout(&second),
        "History already consolidated. Use --force to run again.\n"
    );

    let listed = wt(
        temp.path(),
        &config,
        &[
            "sessions",
            "--start",
            "2025-01-01",
            "--end",
            "2025-01-03",
            "--json",
        ],
        None,
    );
    let sessions: serde_json::Value = serde_json::from_str(&stdout(&listed)).unwrap();
    let sessions = sessions.as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["stopped_at"], "2025-01-01T21:00:00Z");
    assert_eq!(sessions[0]["watched_ms"], 3_300_000);
}

/// Concurrency honours the date range and server subset.
#[test]
fn test_concurrency_json_with_server_filter() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());
    wt(temp.path(), &config, &["import"], Some(POLLER_REPORTS));

    let range = [
        "concurrency",
        "--start",
        "2025-01-01T00:00:00Z",
        "--end",
        "2025-01-02T00:00:00Z",
        "--json",
    ];
    let all = wt(temp.path(), &config, &range, None);
    let report: serde_json::Value = serde_json::from_str(&stdout(&all)).unwrap();
    assert_eq!(report["peaks"]["total"], 3);
    assert_eq!(report["peaks"]["total_at"], "2025-01-01T20:20:00Z");
    assert_eq!(report["peaks"]["direct_play"], 1);
    assert_eq!(report["peaks"]["copy"], 1);
    assert_eq!(report["peaks"]["transcode"], 1);

    let mut filtered_args = range.to_vec();
    filtered_args.extend(["--server", "srv-1"]);
    let filtered = wt(temp.path(), &config, &filtered_args, None);
    let report: serde_json::Value = serde_json::from_str(&stdout(&filtered)).unwrap();
    assert_eq!(report["peaks"]["total"], 2);
    assert_eq!(report["peaks"]["copy"], 0);
}

/// Test that help output describes the tool.
#[test]
fn test_help_lists_commands() {
    let output = Command::new(wt_binary())
        .arg("--help")
        .output()
        .expect("failed to run wt --help");
    assert!(output.status.success());

    let help = String::from_utf8_lossy(&output.stdout);
    for command in ["import", "consolidate", "concurrency", "sessions", "status"] {
        assert!(help.contains(command), "missing {command} in help: {help}");
    }
}
