use std::process::{Command, Output};

fn grader(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_grader"))
        .args(args)
        .output()
        .expect("failed to run the grader")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn priority_scheduler_passes() {
    let output = grader(&["-q"]);
    let out = stdout(&output);
    assert!(out.contains("test result: ok"), "{out}");
    assert!(!out.contains("fatal::"), "{out}");
    assert_eq!(output.status.code(), Some(0), "{out}");
}

#[test]
fn mlfqs_scheduler_passes() {
    let output = grader(&["-mlfqs", "-q"]);
    let out = stdout(&output);
    assert!(out.contains("test result: ok"), "{out}");
    assert!(!out.contains("fatal::"), "{out}");
    assert_eq!(output.status.code(), Some(0), "{out}");
}

#[test]
fn filters_select_tests() {
    let output = grader(&["-q", "semaphore::sema_0", "donation::donate_one"]);
    let out = stdout(&output);
    assert!(out.contains("Running 2 tests"), "{out}");
    assert!(out.contains("test grader::semaphore::sema_0 ... ok"), "{out}");
    assert!(out.contains("2 passed; 0 failed"), "{out}");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn unsupported_frequency_fails_to_boot() {
    let output = grader(&["-q", "-freq=5"]);
    let out = format!("{}{}", stdout(&output), String::from_utf8_lossy(&output.stderr));
    assert!(out.contains("Failed to boot the kernel"), "{out}");
    assert_eq!(output.status.code(), Some(101));
}

#[test]
fn bad_command_line_is_rejected() {
    let output = grader(&["-freq=fast"]);
    assert!(stdout(&output).contains("Invalid command line"));
    assert_eq!(output.status.code(), Some(1));
}

/// Runs a case that must panic the kernel and returns what it printed.
fn fatal(case: &str) -> String {
    let output = grader(&["-q", case]);
    let out = format!("{}{}", stdout(&output), String::from_utf8_lossy(&output.stderr));
    assert_eq!(output.status.code(), Some(101), "{out}");
    assert!(!out.contains("test result"), "{out}");
    out
}

#[test]
fn recursive_acquire_is_fatal() {
    let out = fatal("fatal::recursive_acquire");
    assert!(out.contains("which it already holds"), "{out}");
}

#[test]
fn release_of_unheld_lock_is_fatal() {
    let out = fatal("fatal::release_unowned");
    assert!(out.contains("which is held by None"), "{out}");
}

#[test]
fn release_by_non_holder_is_fatal() {
    let out = fatal("fatal::release_by_other");
    assert!(out.contains("which is held by Some("), "{out}");
}

#[test]
fn wait_without_lock_is_fatal() {
    let out = fatal("fatal::wait_without_lock");
    assert!(out.contains("ConditionVariable::wait() without holding the lock"), "{out}");
}

#[test]
fn dropping_waited_semaphore_is_fatal() {
    let out = fatal("fatal::drop_waited_semaphore");
    assert!(out.contains("dropped while 1 threads wait on it"), "{out}");
}
