//! CLI end-to-end tests

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

fn adslot() -> Command {
    let mut cmd = Command::cargo_bin("adslot").unwrap();
    cmd.env_remove("ADSLOT_METRICS_ADDR").env("RUST_LOG", "off");
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout should be JSON")
}

#[test]
fn test_table_lists_every_category() {
    let output = adslot().arg("table").assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).unwrap();

    for category in [
        "SCRIPT_LOAD_ERROR",
        "TIMEOUT_ERROR",
        "NETWORK_ERROR",
        "DOM_ERROR",
        "AD_RENDER_ERROR",
        "VALIDATION_ERROR",
        "UNKNOWN_ERROR",
    ] {
        assert!(text.contains(category), "missing {category}");
    }
}

#[test]
fn test_classify_json() {
    let json = stdout_json(adslot().args([
        "classify",
        "script network timeout",
        "--max-retries",
        "2",
        "--output-format",
        "json",
    ]));

    let attempts = json.as_array().unwrap();
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[0]["decision"]["errorType"], "SCRIPT_LOAD_ERROR");
    assert_eq!(attempts[0]["decision"]["strategy"], "SCRIPT_RELOAD");
    assert_eq!(attempts[2]["decision"]["strategy"], "FALLBACK_DISPLAY");
    assert_eq!(attempts[2]["decision"]["severity"], "CRITICAL");
}

#[test]
fn test_simulate_json() {
    let json = stdout_json(adslot().args([
        "simulate",
        "--placements",
        "2",
        "--output-format",
        "json",
    ]));

    let sessions = json["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s["currentState"] == "SUCCESS"));
    assert_eq!(json["metrics"]["successCount"], 2);
    assert_eq!(json["errorStats"]["totalErrors"], 0);
}

#[test]
fn test_simulate_fallback_and_export() {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("events.csv");

    let json = stdout_json(adslot().args([
        "simulate",
        "--detached",
        "--max-retries",
        "1",
        "--base-delay-ms",
        "10",
        "--export-csv",
        csv_path.to_str().unwrap(),
        "--output-format",
        "json",
    ]));

    assert_eq!(json["sessions"][0]["currentState"], "FALLBACK");
    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert!(csv.lines().next().unwrap().contains("eventType"));
    assert!(csv.contains("load_error"));
}

#[test]
fn test_simulate_human_output() {
    let output = adslot()
        .args(["simulate", "--placement-prefix", "DAN-human"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("DAN-human-1"));
    assert!(text.contains("SUCCESS"));
}

#[test]
fn test_simulate_rejects_zero_timeout() {
    adslot()
        .args(["simulate", "--timeout-ms", "0"])
        .assert()
        .failure();
}
