//! CLI tests driving the compiled binary

use crate::common::server::{paged_handler, CannedServer};
use crate::common::three_day_query;
use assert_cmd::Command;
use tempfile::TempDir;

fn harvester(data_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("timeline-harvester").unwrap();
    cmd.arg("--data-dir").arg(data_dir).arg("--rate-limit-ms").arg("0");
    cmd
}

fn collect_args(endpoint: &str) -> Vec<String> {
    [
        "collect",
        "--query",
        "rust",
        "--since",
        "2023-01-01",
        "--until",
        "2023-01-04",
        "--limit",
        "30",
        "--endpoint",
        endpoint,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[test]
fn test_help_lists_commands() {
    let output = Command::cargo_bin("timeline-harvester")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["collect", "resume", "validate", "export"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_argument_errors_exit_with_two() {
    let dir = TempDir::new().unwrap();
    harvester(dir.path())
        .args(["--max-retries", "11"])
        .args(collect_args("http://127.0.0.1:1/page"))
        .assert()
        .code(2);
}

#[test]
fn test_invalid_query_exits_with_one() {
    let dir = TempDir::new().unwrap();
    let mut args = collect_args("http://127.0.0.1:1/page");
    args[4] = "2023-01-04".to_string();
    args[6] = "2023-01-01".to_string();

    let output = harvester(dir.path()).args(&args).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("must be after since"));
}

#[test]
fn test_resume_missing_checkpoint_exits_with_one() {
    let dir = TempDir::new().unwrap();
    harvester(dir.path())
        .args(["resume", "missing/checkpoint.json", "--endpoint", "http://127.0.0.1:1/page"])
        .assert()
        .code(1);
}

#[test]
fn test_collect_validate_export() {
    let server = CannedServer::start(paged_handler(5, 3));
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("harvest");

    let output = harvester(&data_dir)
        .args(["--output-format", "json"])
        .args(collect_args(&server.url()))
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let summary: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(summary["termination"], "done");
    assert_eq!(summary["stored_records"], 45);
    assert_eq!(summary["windows"].as_array().unwrap().len(), 3);

    let checkpoint = data_dir
        .join(three_day_query().run_id())
        .join("checkpoint.json");
    assert!(checkpoint.is_file());

    harvester(&data_dir)
        .arg("validate")
        .arg(&checkpoint)
        .assert()
        .success();

    let csv_path = dir.path().join("dataset.csv");
    harvester(&data_dir)
        .arg("export")
        .arg(&checkpoint)
        .arg("--output")
        .arg(&csv_path)
        .assert()
        .success();
    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(csv.lines().count(), 46);
    assert!(csv.starts_with("url,created_at,content,extra"));

    // Same query again is refused without --force
    let output = harvester(&data_dir)
        .args(collect_args(&server.url()))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("already exists"));
}

#[cfg(unix)]
#[test]
fn test_ctrl_c_exits_with_75_and_resume_completes() {
    use assert_cmd::cargo::CommandCargoExt;
    use std::process::Stdio;
    use std::time::{Duration, Instant};
    use timeline_harvester::store::RecordStore;

    let pages = paged_handler(5, 3);
    let server = CannedServer::start(move |target| {
        std::thread::sleep(Duration::from_millis(300));
        pages(target)
    });
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("harvest");

    let mut child = std::process::Command::cargo_bin("timeline-harvester")
        .unwrap()
        .arg("--data-dir")
        .arg(&data_dir)
        .args(["--rate-limit-ms", "0"])
        .args(collect_args(&server.url()))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(20);
    while server.requests().is_empty() {
        assert!(Instant::now() < deadline, "collector never reached the endpoint");
        std::thread::sleep(Duration::from_millis(20));
    }
    let sent = std::process::Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(sent.success());

    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(75));

    let run_dir = data_dir.join(three_day_query().run_id());
    let checkpoint = run_dir.join("checkpoint.json");
    assert!(checkpoint.is_file());
    assert!(RecordStore::count_records(run_dir.join("records.jsonl")).unwrap() < 45);

    harvester(&data_dir)
        .arg("resume")
        .arg(&checkpoint)
        .args(["--endpoint", &server.url()])
        .assert()
        .code(0);
    assert_eq!(RecordStore::count_records(run_dir.join("records.jsonl")).unwrap(), 45);
}
