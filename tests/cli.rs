//! Smoke tests for the `bridgesim` binary.

use std::io::Write;
use std::process::{Command, Stdio};

const ENVELOPES: &str = concat!(
    r#"{"type":"initSTP","data":{"nodes":[{"id":1,"rootId":2,"hopCount":1,"nextHop":2,"ports":[{"targetId":2,"portNumber":1,"status":"Unblocked"}]},{"id":2,"rootId":2,"hopCount":0,"nextHop":2,"ports":[{"targetId":1,"portNumber":1,"status":"Unblocked"},{"targetId":3,"portNumber":2,"status":"Unblocked"}]},{"id":3,"rootId":2,"hopCount":1,"nextHop":2,"ports":[{"targetId":2,"portNumber":1,"status":"Unblocked"}]}],"links":[{"sourceId":1,"targetId":2},{"sourceId":2,"targetId":3}]}}"#,
    "\n",
    "\n",
    r#"{"type":"heartbeat","data":null}"#,
    "\n",
    r#"{"type":"initSTP","data":{"nodes":[{"id":1,"ports":[{"targetId":99,"portNumber":1,"status":"Unblocked"}]}]}}"#,
    "\n",
    "garbage\n",
);

fn fast_config() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(b"simulation:\n  processing_delay_ms: 5\n  run_timeout_ms: 5000\n")
        .unwrap();
    file
}

fn replies(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn test_stdin_envelopes_get_one_reply_each() {
    let bin = env!("CARGO_BIN_EXE_bridgesim");
    let config = fast_config();

    let mut child = Command::new(bin)
        .args(["--config", config.path().to_str().unwrap()])
        .args(["--log-level", "warn"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn bridgesim");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(ENVELOPES.as_bytes())
        .unwrap();

    let output = child.wait_with_output().expect("failed to wait on child");
    assert!(output.status.success());

    let replies = replies(&output.stdout);
    assert_eq!(replies.len(), 4);

    assert_eq!(replies[0]["type"], "stpReport");
    assert_eq!(replies[0]["data"]["outcome"], "completed");
    assert_eq!(replies[0]["data"]["nodes"]["2"]["packetsProcessed"], 3);

    assert_eq!(replies[1]["type"], "ignored");
    assert_eq!(replies[1]["data"], "heartbeat");

    assert_eq!(replies[2]["type"], "stpError");
    assert_eq!(replies[2]["data"]["kind"], "DanglingPort");

    assert_eq!(replies[3]["type"], "stpError");
    assert_eq!(replies[3]["data"]["kind"], "MalformedInput");
}

#[test]
fn test_input_file_and_json_logs() {
    let bin = env!("CARGO_BIN_EXE_bridgesim");
    let config = fast_config();

    let mut input = tempfile::NamedTempFile::new().unwrap();
    input.write_all(ENVELOPES.as_bytes()).unwrap();

    let output = Command::new(bin)
        .args(["--config", config.path().to_str().unwrap()])
        .args(["--input", input.path().to_str().unwrap()])
        .env("RUST_LOG_FORMAT", "json")
        .env("RUST_LOG", "info")
        .output()
        .expect("failed to run bridgesim");

    assert!(output.status.success());
    assert_eq!(replies(&output.stdout).len(), 4);

    // Logs stay on stderr, one JSON object per line.
    let stderr = String::from_utf8_lossy(&output.stderr);
    let first = stderr.lines().next().expect("expected log output");
    let log: serde_json::Value = serde_json::from_str(first).unwrap();
    assert!(log.get("level").is_some());
}

#[test]
fn test_missing_config_fails() {
    let bin = env!("CARGO_BIN_EXE_bridgesim");

    let output = Command::new(bin)
        .args(["--config", "/nonexistent/bridgesim.yaml"])
        .stdin(Stdio::null())
        .output()
        .expect("failed to run bridgesim");

    assert!(!output.status.success());
}
