use std::io::Write;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

/// Start the binary with every user directory pointed into `home`.
fn spawn(home: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_impro"))
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("IMPRO_MODELS_DIR", home.join("models"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start impro")
}

/// Write one console line and give the processing thread time to see it.
fn send(stdin: &mut ChildStdin, line: &str) {
    writeln!(stdin, "{}", line).unwrap();
    stdin.flush().unwrap();
    thread::sleep(Duration::from_millis(150));
}

#[test]
fn learn_then_save_a_model() {
    let home = TempDir::new().unwrap();
    let mut child = spawn(home.path());
    let mut stdin = child.stdin.take().unwrap();

    send(&mut stdin, "learn on");
    for pitch in [60, 64, 67, 72] {
        send(&mut stdin, &format!("note {}", pitch));
        send(&mut stdin, &format!("off {}", pitch));
    }
    send(&mut stdin, "save session");
    send(&mut stdin, "models");
    send(&mut stdin, "quit");
    drop(stdin);

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("learning on"), "{}", stdout);
    assert!(stdout.contains("saved"), "{}", stdout);

    let blob = std::fs::read_to_string(home.path().join("models").join("session.txt")).unwrap();
    let pitch_section = blob
        .strip_prefix("#PITCH#")
        .and_then(|rest| rest.split("#IOI#").next())
        .unwrap();
    // each note closed the previous single-note chord
    assert!(pitch_section.contains("60-"), "{}", blob);
    assert!(pitch_section.contains("64-"), "{}", blob);
}

#[test]
fn bad_commands_do_not_stop_the_console() {
    let home = TempDir::new().unwrap();
    let mut child = spawn(home.path());
    let mut stdin = child.stdin.take().unwrap();

    send(&mut stdin, "dance");
    send(&mut stdin, "random 500");
    send(&mut stdin, "load nothing-here");
    send(&mut stdin, "random 40");
    send(&mut stdin, "quit");
    drop(stdin);

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("unknown command 'dance'"), "{}", stdout);
    assert!(stdout.contains("random needs a value 0-100"), "{}", stdout);
    assert!(stdout.contains("error: load"), "{}", stdout);
    assert!(stdout.contains("randomness 40%"), "{}", stdout);
}

#[test]
fn list_ports_exits_immediately() {
    let home = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_impro"))
        .arg("--list-ports")
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("MIDI inputs:"));
    assert!(stdout.contains("MIDI outputs:"));
}
