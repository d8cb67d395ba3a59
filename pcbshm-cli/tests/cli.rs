// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Cross-process tests driving the `pcbshm` binary.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use pcbshm_core::{PressurePcbData, PressureSensorData, PRESSURE_PCB_CSV_HEADERS};
use tempfile::TempDir;

fn pcbshm() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pcbshm"))
}

fn test_namespace() -> &'static str {
    if cfg!(windows) {
        "Local"
    } else {
        "pcbshm-cli-test"
    }
}

/// Write a config file pointing every backend at a private location.
fn write_config(dir: &Path, region: &str) -> PathBuf {
    let path = dir.join("pcbshm.yaml");
    std::fs::write(
        &path,
        format!(
            "transport:\n  namespace: {}\n  run_dir: '{}'\n  region: {}\nreader:\n  recall_timeout_ms: 2000\n  poll_interval_ms: 50\n",
            test_namespace(),
            dir.display(),
            region
        ),
    )
    .expect("Failed to write config");
    path
}

fn unique_region(tag: &str) -> String {
    format!("cli-{}-{}", tag, std::process::id())
}

fn sample() -> PressurePcbData {
    PressurePcbData {
        unix_sec: 123456,
        teensy_on_ms: 5000,
        ps1: PressureSensorData {
            pressure_mbar: 1.0,
            temp: 2.3,
            pressure_raw: 5.67,
            temp_raw: 0.0,
            error: 100,
        },
        ..Default::default()
    }
}

fn read(config: &Path, extra: &[&str]) -> Output {
    pcbshm()
        .arg("--config")
        .arg(config)
        .arg("read")
        .args(extra)
        .output()
        .expect("Failed to run pcbshm read")
}

#[test]
fn test_validate_valid_config() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "Teensy1SharedMemory");

    let output = pcbshm()
        .arg("validate")
        .arg(&config)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Configuration is valid"));
    assert!(stdout.contains("Teensy1SharedMemory"));
}

#[test]
fn test_validate_invalid_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.yaml");
    std::fs::write(&path, "reader:\n  poll_interval_ms: 1\n").unwrap();

    let output = pcbshm().arg("validate").arg(&path).output().unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("validation failed"));
}

#[cfg(any(target_os = "linux", windows))]
#[test]
fn test_read_missing_region_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &unique_region("missing"));

    let output = read(&config, &[]);
    assert!(!output.status.success());
}

#[test]
fn test_publish_from_file_exits_on_eof() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &unique_region("file"));
    let input = dir.path().join("records.csv");
    std::fs::write(
        &input,
        format!(
            "{}\n\nnot,a,record\n{}\n{}\n",
            sample().to_csv(),
            sample().to_csv().replacen("1.000000", "NaN", 1),
            sample().to_csv()
        ),
    )
    .unwrap();

    let output = pcbshm()
        .arg("--config")
        .arg(&config)
        .arg("publish")
        .arg("--input")
        .arg(&input)
        .arg("--exit-on-eof")
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Published 2 snapshot(s)"));
}

/// A publisher process and a separate reader process share one snapshot.
#[test]
fn test_publish_and_read_across_processes() {
    let dir = TempDir::new().unwrap();
    let region = unique_region("xproc");
    let config = write_config(dir.path(), &region);

    let mut publisher = pcbshm()
        .arg("--config")
        .arg(&config)
        .arg("publish")
        .arg("--format")
        .arg("json")
        .arg("--exit-on-eof")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn publisher");

    let record = sample();
    let json = String::from_utf8(record.to_json().unwrap()).unwrap();
    {
        let stdin = publisher.stdin.as_mut().expect("publisher stdin");
        writeln!(stdin, "{}", json).unwrap();
        stdin.flush().unwrap();
    }

    // Poll until the snapshot is visible from another process
    let deadline = Instant::now() + Duration::from_secs(10);
    let output = loop {
        let output = read(&config, &["--format", "csv", "--header"]);
        if output.status.success() || Instant::now() > deadline {
            break output;
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    assert!(output.status.success(), "reader never saw the snapshot");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    assert_eq!(lines.next(), Some(PRESSURE_PCB_CSV_HEADERS));
    assert_eq!(lines.next(), Some(record.to_csv().as_str()));

    let output = read(&config, &[]);
    assert!(output.status.success());
    let recalled =
        PressurePcbData::from_json(String::from_utf8_lossy(&output.stdout).trim().as_bytes())
            .unwrap();
    assert_eq!(recalled, record);

    // Closing stdin ends the publisher, which tears the region down
    drop(publisher.stdin.take());
    let status = publisher.wait().unwrap();
    assert!(status.success());

    #[cfg(any(target_os = "linux", windows))]
    assert!(!read(&config, &[]).status.success());
}
