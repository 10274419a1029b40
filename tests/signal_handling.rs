#[cfg(unix)]
use std::io::Write;
#[cfg(unix)]
use std::path::Path;
#[cfg(unix)]
use std::process::{Command, Stdio};

#[cfg(unix)]
fn run_shell_in(home: &Path, lines: &[&str]) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_jshell"))
        .current_dir(home)
        .env("HOME", home)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn jshell");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        for line in lines {
            writeln!(stdin, "{line}").expect("write line");
        }
        writeln!(stdin, "exit").expect("write exit");
    }

    child.wait_with_output().expect("wait output")
}

#[cfg(unix)]
#[test]
fn pipeline_sigpipe_does_not_abort_shell() {
    // head exits after one line and closes the channel; yes then dies of
    // SIGPIPE. The shell must join every stage and keep going.
    let home = tempfile::tempdir().unwrap();
    let output = run_shell_in(home.path(), &["yes | head -1", "echo ALIVE", "echo STATUS:$?"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("y\n"), "stdout was: {stdout}");
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
    assert!(stdout.contains("STATUS:0"), "stdout was: {stdout}");
    assert!(output.status.success(), "shell did not exit cleanly");
}

#[cfg(unix)]
#[test]
fn shell_survives_sigint() {
    // The child signals its parent, which is the shell.
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join("interrupt_parent.sh"), "kill -INT $PPID\n").unwrap();

    let output = run_shell_in(home.path(), &["sh interrupt_parent.sh", "sleep 1", "echo ALIVE"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
    assert!(output.status.success(), "shell did not exit cleanly");
}
