#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader};
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

const WAIT: Duration = Duration::from_secs(10);

fn rigwire() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_rigwire"));
    command.args(["--log-level", "error", "--format", "json"]);
    command
}

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "rigwire-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

/// Forward the child's stdout, one parsed JSON record per line.
fn records(stdout: ChildStdout) -> mpsc::Receiver<Value> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            if let Ok(value) = serde_json::from_str::<Value>(&line) {
                if tx.send(value).is_err() {
                    break;
                }
            }
        }
    });
    rx
}

fn wait_for_event(records: &mpsc::Receiver<Value>, event: &str) -> Value {
    loop {
        let record = records
            .recv_timeout(WAIT)
            .unwrap_or_else(|_| panic!("no {event:?} record before timeout"));
        if record["event"] == event {
            return record;
        }
    }
}

fn listening_addr(records: &mpsc::Receiver<Value>) -> SocketAddr {
    let record = wait_for_event(records, "listening");
    record["addr"]
        .as_str()
        .expect("addr should be a string")
        .parse()
        .expect("addr should parse")
}

fn wait_exit(child: &mut Child) -> std::process::ExitStatus {
    let deadline = std::time::Instant::now() + WAIT;
    loop {
        if let Some(status) = child.try_wait().expect("child should be pollable") {
            return status;
        }
        if std::time::Instant::now() >= deadline {
            let _ = child.kill();
            panic!("child did not exit in time");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn version_prints_name() {
    let output = rigwire().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("rigwire "));
}

#[test]
fn send_delivers_envelope_to_control_listener() {
    let mut child = rigwire()
        .args(["control", "--bind", "127.0.0.1", "--port", "0", "--count", "1"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("control command should start");
    let records = records(child.stdout.take().expect("stdout should be piped"));
    let addr = listening_addr(&records);

    let output = rigwire()
        .args(["send", &addr.to_string(), "--command", "shutdown"])
        .output()
        .expect("send should run");
    assert!(output.status.success(), "send failed: {output:?}");

    let message = wait_for_event(&records, "message");
    assert_eq!(
        message["json"],
        r#"{"type":"cmd","command":"shutdown","args":{}}"#
    );
    assert!(wait_exit(&mut child).success());
}

#[test]
fn send_frame_reaches_video_receiver() {
    let dir = unique_temp_dir("video");
    let frame_path = dir.join("frame.bin");
    let frame: Vec<u8> = (0..10_000u32).map(|i| (i % 253) as u8).collect();
    std::fs::write(&frame_path, &frame).expect("frame file should be writable");
    let save_dir = dir.join("out");

    let mut child = rigwire()
        .args(["video", "--bind", "127.0.0.1", "--port", "0", "--count", "1"])
        .args(["--min-interval", "0"])
        .arg("--save-dir")
        .arg(&save_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("video command should start");
    let records = records(child.stdout.take().expect("stdout should be piped"));
    let addr = listening_addr(&records);

    let output = rigwire()
        .args(["send-frame", &addr.to_string(), "--chunk-size", "1200"])
        .args(["--repeat", "5", "--interval", "50ms"])
        .arg("--file")
        .arg(&frame_path)
        .output()
        .expect("send-frame should run");
    assert!(output.status.success(), "send-frame failed: {output:?}");

    let record = wait_for_event(&records, "frame");
    assert_eq!(record["len"], frame.len());
    let saved = record["saved_to"].as_str().expect("frame should be saved");
    assert_eq!(std::fs::read(saved).expect("saved frame"), frame);

    let stats = wait_for_event(&records, "stats");
    assert!(stats["completed"].as_u64().unwrap_or(0) >= 1);
    assert!(wait_exit(&mut child).success());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_to_closed_port_fails() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        listener.local_addr().expect("listener addr")
    };

    let output = rigwire()
        .args(["send", &addr.to_string(), "--command", "shutdown"])
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn invalid_args_json_is_usage_error() {
    let output = rigwire()
        .args(["send", "127.0.0.1:9", "--command", "x", "--args", "not json"])
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn video_port_in_use_is_transport_error() {
    let taken = std::net::UdpSocket::bind("127.0.0.1:0").expect("udp bind");
    let port = taken.local_addr().expect("addr").port().to_string();

    let output = rigwire()
        .args(["video", "--bind", "127.0.0.1", "--port", &port, "--duration", "1s"])
        .output()
        .expect("video should run");
    assert_eq!(output.status.code(), Some(3));
}
