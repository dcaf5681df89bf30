#![cfg(feature = "cli")]

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

fn keylink(args: &[&str], stdin: &[u8]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_keylink"))
        .args(["--log-level", "error"])
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("keylink should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(stdin)
        .expect("stdin should accept input");
    child.wait_with_output().expect("keylink should finish")
}

fn temp_capture(tag: &str, bytes: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "keylink-{tag}-{}-{}.bin",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::write(&path, bytes).expect("capture should be writable");
    path
}

#[test]
fn encode_raw_emits_wire_bytes() {
    let out = keylink(
        &["--format", "raw", "encode", "--channel", "cdc", "--data", "hello"],
        b"",
    );
    assert!(out.status.success());
    assert_eq!(out.stdout, [&[0x40, 5][..], b"hello"].concat());
}

#[test]
fn encode_splits_long_payload() {
    let out = keylink(
        &["--format", "json", "encode", "--channel", "debug", "--hex", &"ab".repeat(100)],
        b"",
    );
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("\"frames\":2"));
    assert!(stdout.contains("\"bytes\":104"));
}

#[test]
fn decode_reads_stdin() {
    let out = keylink(
        &["--format", "json", "decode", "-"],
        &[0x40, 2, b'h', b'i', 0x80, 1, 0xff],
    );
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("\"channel\":\"CDC\""));
    assert!(lines[1].contains("\"payload\":\"ff\""));
}

#[test]
fn decode_desync_exits_restart_required() {
    let out = keylink(&["--format", "json", "decode", "-"], &[0x40, 1, 0x00, 0x33, 0x00]);
    assert_eq!(out.status.code(), Some(80));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("restart required"));
    assert_eq!(String::from_utf8_lossy(&out.stdout).lines().count(), 1);
}

#[test]
fn decode_truncated_capture_is_invalid_data() {
    let out = keylink(&["decode", "-"], &[0x40, 4, 1]);
    assert_eq!(out.status.code(), Some(60));
}

#[test]
fn header_rejects_version_bit() {
    let out = keylink(&["header", "0x80"], b"");
    assert_eq!(out.status.code(), Some(60));

    let out = keylink(&["--format", "json", "header", "0x32"], b"");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("\"endpoint\":\"FW\""));
    assert!(stdout.contains("\"length\":32"));
}

#[test]
fn reply_for_128_byte_response() {
    let out = keylink(
        &["--format", "json", "reply", "--kind", "load-app-data-ready", "--id", "1"],
        b"",
    );
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("\"length\":128"));
    assert_eq!(stdout.matches("\"channel\":\"CDC\"").count(), 4);
}

#[test]
fn reply_unknown_code_fails() {
    let out = keylink(&["reply", "--kind", "0x42"], b"");
    assert_eq!(out.status.code(), Some(60));
}

#[test]
fn simulate_reports_transfers_and_discards() {
    let mut capture = vec![0x40, 5, 1, 2, 3, 4, 5];
    capture.extend_from_slice(&[0x20, 2, 9, 9]);
    let path = temp_capture("sim", &capture);

    let out = keylink(
        &["--format", "json", "simulate", path.to_str().expect("utf-8 path")],
        b"",
    );
    let _ = std::fs::remove_file(&path);

    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("\"delivered\":1"));
    assert!(stdout.contains("\"discarded\":1"));
    assert!(stdout.contains("\"data\":\"0102030405\""));
}

#[test]
fn simulate_pauses_peer_under_load() {
    let mut capture = Vec::new();
    for _ in 0..6 {
        capture.push(0x40);
        capture.push(64);
        capture.extend_from_slice(&[0x5a; 64]);
    }

    for latency in ["0", "1", "3"] {
        let out = keylink(
            &["--format", "json", "simulate", "-", "--usb-latency", latency],
            &capture,
        );

        let stdout = String::from_utf8_lossy(&out.stdout);
        assert!(
            out.status.success(),
            "latency {latency}: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        assert!(stdout.contains("\"delivered\":6"), "latency {latency}: {stdout}");
        assert!(stdout.contains("\"left_in_ring\":0"), "latency {latency}: {stdout}");
        assert!(stdout.contains("\"overruns\":0"));
        assert!(!stdout.contains("\"pauses\":0"));
    }
}

#[test]
fn simulate_control_frame_requests_restart() {
    let out = keylink(&["--format", "json", "simulate", "-"], &[0x02, 2, 0x01, 0xc0]);
    assert_eq!(out.status.code(), Some(80));
    assert!(String::from_utf8_lossy(&out.stdout).contains("endpoint mask changed"));
}

#[test]
fn version_prints_package_version() {
    let out = keylink(&["version"], b"");
    assert!(out.status.success());
    assert_eq!(
        String::from_utf8_lossy(&out.stdout).trim(),
        format!("keylink {}", env!("CARGO_PKG_VERSION"))
    );
}
