//! Exit codes of the ssm-ctl binary

use std::process::Command;

fn ssm_ctl(args: &[&str]) -> std::process::Output {
    let dir = tempfile::tempdir().unwrap();
    Command::new(env!("CARGO_BIN_EXE_ssm-ctl"))
        .args(args)
        .current_dir(dir.path())
        .output()
        .unwrap()
}

#[test]
fn unknown_command_exits_with_1() {
    let output = ssm_ctl(&["bogus"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!output.stderr.is_empty());
}

#[test]
fn help_exits_with_0() {
    let output = ssm_ctl(&["--help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("push"));
}
