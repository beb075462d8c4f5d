use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Fast timings so simulated runs finish quickly.
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[pins]
# unused by the simulated backend but required
step = 21
dir = 20
enable = 16

[motor]
step_delay_us = 200
direction_settle_us = 100

[classifier]
labels = ["Metal", "Glass", "Plastic"]

[bins]
home = 0
[bins.positions]
Metal = 0
Glass = 40
"2" = -40

[sorter]
drop_delay_ms = 20
home_dwell_ms = 10

[capture]
resolution = [64, 48]
fps = 50
frame_width = 32
skip_frames = 0
max_inference_hz = 50

[sensors]
bin_depth_cm = 50.0
burst = 1
window = 1
interval_ms = 50
hysteresis_pct = 0.0

[[sensors.bins]]
name = "Glass"
trig = 23
echo = 24
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn sorter() -> Command {
    Command::cargo_bin("sorter").unwrap()
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["measure"], 0, "Glass: 10.0%", "stdout")]
#[case(&["jog", "--to", "-25"], 0, "moved 0 -> -25 (25 steps)", "stdout")]
#[case(&["self-check"], 0, "self-check ok", "stdout")]
#[case(&["run", "--duration-ms", "300"], 0, "sorted", "stdout")]
#[case(&["jog"], 2, "--to", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = sorter();
    cmd.arg("--config").arg(&cfg).args(args);
    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => assert.stdout(predicate::str::contains(needle)),
        _ => assert.stderr(predicate::str::contains(needle)),
    };
}

#[test]
fn missing_config_exits_with_config_code() {
    let dir = tempdir().unwrap();
    sorter()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("measure")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn invalid_config_reports_json_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    // Glass has no bin position.
    fs::write(
        &path,
        "[pins]\nstep = 1\ndir = 2\n[classifier]\nlabels = [\"Metal\", \"Glass\"]\n[bins.positions]\nMetal = 0\n",
    )
    .unwrap();

    let out = sorter()
        .arg("--json")
        .arg("--config")
        .arg(&path)
        .arg("measure")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8(out.stderr).unwrap();
    let line = stderr.lines().last().unwrap();
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(v["reason"], "Config");
    assert!(v["message"].as_str().unwrap().contains("Glass"));
}

#[test]
fn snapshot_stream_ends_inactive() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = sorter()
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--duration-ms", "1500", "--snapshots"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let snaps: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(!snaps.is_empty());

    let seqs: Vec<u64> = snaps.iter().map(|s| s["seq"].as_u64().unwrap()).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]), "{seqs:?}");

    let last = snaps.last().unwrap();
    assert_eq!(last["status"], "inactive");
    assert_eq!(last["sort_state"], "idle");
    let total = last["counters"]["total"].as_u64().unwrap();
    let by_label: u64 = last["counters"]["by_label"]
        .as_object()
        .unwrap()
        .values()
        .map(|v| v.as_u64().unwrap())
        .sum();
    assert_eq!(total, by_label);
}

#[test]
fn json_run_summary_is_one_object() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = sorter()
        .arg("--json")
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--duration-ms", "200"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let v: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert!(v["sorted"].is_u64());
    assert!(v["counters"].is_object());
}

#[test]
fn file_logging_writes_json_lines() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let log = dir.path().join("sorter.log");
    let mut text = fs::read_to_string(&cfg).unwrap();
    text.push_str(&format!(
        "\n[logging]\nfile = {:?}\nlevel = \"info\"\n",
        log.display().to_string()
    ));
    fs::write(&cfg, text).unwrap();

    sorter().arg("--config").arg(&cfg).arg("measure").assert().success();

    let contents = fs::read_to_string(&log).unwrap();
    let first = contents.lines().next().unwrap();
    let v: serde_json::Value = serde_json::from_str(first).unwrap();
    assert!(v.get("fields").is_some());
}
