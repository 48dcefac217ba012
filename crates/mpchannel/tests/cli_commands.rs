#![cfg(all(unix, feature = "cli"))]

use std::io::Read;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "mpcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn mpchannel() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_mpchannel"));
    command.env_remove("MPCHANNEL_PATH").env_remove("MPCHANNEL_POLL");
    command
}

fn wait_for_fifo(path: &Path, timeout: Duration) {
    let start = Instant::now();
    loop {
        if let Ok(metadata) = std::fs::metadata(path) {
            if metadata.file_type().is_fifo() {
                return;
            }
        }
        if start.elapsed() >= timeout {
            panic!("fifo {} was not created", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

/// Run `send` until the worker end accepts it.
fn send_until_delivered(path: &Path, action: &str, timeout: &str) -> Output {
    let start = Instant::now();
    loop {
        let output = mpchannel()
            .args(["--log-level", "error", "--format", "json", "send", action])
            .args(["--timeout", timeout])
            .arg("--path")
            .arg(path)
            .output()
            .expect("send should run");
        if output.status.success() || start.elapsed() >= Duration::from_secs(3) {
            return output;
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn wait_for_exit(mut child: Child, timeout: Duration) -> (std::process::ExitStatus, String, String) {
    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().expect("child status should be readable") {
            break status;
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            panic!("child did not exit in time");
        }
        thread::sleep(Duration::from_millis(25));
    };

    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_string(&mut stdout);
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut stderr);
    }
    (status, stdout, stderr)
}

fn interrupt(child: &Child) {
    let status = Command::new("kill")
        .arg("-INT")
        .arg(child.id().to_string())
        .status()
        .expect("kill should run");
    assert!(status.success());
}

#[test]
fn encode_prints_exact_wire_frame() {
    let output = mpchannel()
        .args(["encode", "shutdown", "--timeout", "5"])
        .output()
        .expect("encode should run");

    assert!(output.status.success());
    assert_eq!(
        output.stdout,
        b"-->\nShutdownMessage\n{\"timeout\": 5}\n<--\n"
    );
}

#[test]
fn send_without_worker_returns_3() {
    let dir = unique_temp_dir("no-worker");
    let fifo = dir.join("worker.pipe");

    let output = mpchannel()
        .args(["--log-level", "error", "send", "reboot"])
        .arg("--path")
        .arg(&fifo)
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("worker is not listening"));
    assert!(!fifo.exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_poll_interval_returns_64() {
    let output = mpchannel()
        .args(["listen", "--poll", "0ms", "--path", "/tmp/mpcli-unused.pipe"])
        .output()
        .expect("listen should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn listen_prints_sent_command() {
    let dir = unique_temp_dir("listen");
    let fifo = dir.join("worker.pipe");

    let child = mpchannel()
        .args(["--log-level", "error", "--format", "json", "listen", "--count", "1"])
        .args(["--poll", "20ms"])
        .arg("--path")
        .arg(&fifo)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("listen should start");

    wait_for_fifo(&fifo, Duration::from_secs(3));
    let sent = send_until_delivered(&fifo, "reboot", "7");
    assert!(sent.status.success(), "send failed: {sent:?}");
    let sent_stdout = String::from_utf8_lossy(&sent.stdout);
    assert!(sent_stdout.contains("\"event\":\"sent\""));

    let (status, stdout, _stderr) = wait_for_exit(child, Duration::from_secs(5));
    assert!(status.success());
    assert!(stdout.contains("\"event\":\"received\""));
    assert!(stdout.contains("\"type\":\"RebootMessage\""));
    assert!(stdout.contains("\"timeout\":7"));
    assert!(!fifo.exists(), "listen should remove its fifo");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn worker_dry_run_logs_command_and_stops_on_interrupt() {
    let dir = unique_temp_dir("worker");
    let fifo = dir.join("worker.pipe");

    let child = mpchannel()
        .args(["--log-level", "info", "worker", "--dry-run", "--poll", "20ms"])
        .arg("--path")
        .arg(&fifo)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("worker should start");

    wait_for_fifo(&fifo, Duration::from_secs(3));
    let sent = send_until_delivered(&fifo, "sleep", "3");
    assert!(sent.status.success(), "send failed: {sent:?}");

    thread::sleep(Duration::from_millis(500));
    interrupt(&child);

    let (status, _stdout, stderr) = wait_for_exit(child, Duration::from_secs(5));
    assert!(status.success(), "worker stderr: {stderr}");
    assert!(stderr.contains("dry run: power command not executed"));
    assert!(stderr.contains("action=sleep"));
    assert!(stderr.contains("worker was shutdown"));
    assert!(!fifo.exists(), "worker should remove its fifo");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_extended_lists_message_types() {
    let output = mpchannel()
        .args(["version", "--extended"])
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("name: mpchannel"));
    assert!(stdout.contains("ShutdownMessage, RebootMessage, SleepMessage"));
    assert!(stdout.contains("transport: fifo"));
}
