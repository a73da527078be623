//! Drive the demo binary with piped output, where spinners fall back to
//! plain lines.

use std::process::{Command, Output};

#[cfg(unix)]
use std::io::{BufRead, BufReader, Read};
#[cfg(unix)]
use std::process::Stdio;

fn demo(scenario: &str) -> Output {
    Command::new(env!("CARGO_BIN_EXE_spindle-demo"))
        .args(["--scenario", scenario, "--speed", "1000"])
        .env("NO_COLOR", "1")
        .env("SPINDLE_PLAIN", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run spindle-demo")
}

#[test]
fn test_nested_scenario() {
    let output = demo("nested");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<_> = stdout.lines().collect();
    let position = |wanted: &str| {
        lines
            .iter()
            .position(|line| *line == wanted)
            .unwrap_or_else(|| panic!("missing {wanted:?} in {stdout}"))
    };

    let outer = position("Preparing samples...");
    let inner_done = position("✔ DONE Loading batch.");
    let outer_done = position("✔ DONE Preparing samples.");
    assert!(outer < inner_done && inner_done < outer_done);
    assert!(lines.contains(&"Loading batch 3/3..."));
}

#[test]
fn test_progress_scenario() {
    let output = demo("progress");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[  0%] Downloading MNIST..."));
    assert!(stdout.contains("[100%] Downloading MNIST..."));
    assert!(stdout.ends_with("✔ DONE Downloading MNIST.\n"));
}

#[test]
fn test_failure_scenario_exits_nonzero() {
    let output = demo("failure");
    assert!(!output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stdout.ends_with("✘ FAILED Loading TensorFlow.\n"));
    assert!(stderr.contains("TensorFlow exploded!"));
}

#[test]
fn test_rejects_non_positive_speed() {
    let output = Command::new(env!("CARGO_BIN_EXE_spindle-demo"))
        .args(["--speed", "0"])
        .output()
        .expect("failed to run spindle-demo");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("speed must be a positive number"));
}

#[cfg(unix)]
#[test]
fn test_ctrl_c_cancels_blocking_spinner() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_spindle-demo"))
        .args(["--scenario", "progress", "--speed", "1"])
        .env("NO_COLOR", "1")
        .env("SPINDLE_PLAIN", "1")
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run spindle-demo");

    // The handler is in place before the first line is printed
    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    let mut transcript = String::new();
    loop {
        let mut line = String::new();
        assert_ne!(stdout.read_line(&mut line).unwrap(), 0, "demo exited early");
        transcript.push_str(&line);
        if line == "Downloading MNIST...\n" {
            break;
        }
    }

    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("failed to run kill");
    assert!(status.success());

    stdout.read_to_string(&mut transcript).unwrap();
    let mut stderr = String::new();
    child.stderr.take().unwrap().read_to_string(&mut stderr).unwrap();
    let exit = child.wait().unwrap();

    assert!(!exit.success());
    assert!(transcript.ends_with("! CANCELED Downloading MNIST.\n"), "{transcript}");
    assert!(!transcript.contains("[100%]"));
    assert!(stderr.contains("interrupted"), "{stderr}");
}
