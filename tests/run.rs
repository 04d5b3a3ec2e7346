use std::fs;

use log::info;
use nix::unistd::Uid;
use tempfile::tempdir;

use judgebox::{run, Fault, Outcome, RunConfig};

mod common;

#[test]
fn it_should_run_echo() {
  common::setup();

  let dir = tempdir().unwrap();
  let out = dir.path().join("echo.out");
  let out = out.to_string_lossy().to_string();

  let config = RunConfig::new("/bin/echo", vec!["hello"])
    .current_user()
    .stdout(out.clone())
    .build();
  let result = run(&config);

  info!("echo finished in {} ms", result.real_time());
  assert_eq!(result.outcome(), Outcome::Success);
  assert_eq!(result.fault(), Fault::None);
  assert_eq!(*result.status(), Some(0));
  assert_eq!(*result.signal(), None);
  assert_eq!(fs::read_to_string(&out).unwrap(), "hello\n");
}

#[test]
fn it_should_redirect_stdin() {
  common::setup();

  let dir = tempdir().unwrap();
  let sub_in = dir.path().join("cat.in");
  let sub_out = dir.path().join("cat.out");
  fs::write(&sub_in, "1 2\n").unwrap();

  let config = RunConfig::new("/bin/cat", Vec::<String>::new())
    .current_user()
    .stdin(sub_in.to_string_lossy().to_string())
    .stdout(sub_out.to_string_lossy().to_string())
    .build();
  let result = run(&config);

  assert_eq!(result.outcome(), Outcome::Success);
  assert_eq!(fs::read_to_string(&sub_out).unwrap(), "1 2\n");
}

#[test]
fn it_should_report_a_non_zero_exit_code() {
  common::setup();

  let config = RunConfig::new("/bin/sh", vec!["-c", "exit 3"])
    .current_user()
    .build();
  let result = run(&config);

  assert_eq!(result.outcome(), Outcome::RuntimeError);
  assert_eq!(result.fault(), Fault::None);
  assert_eq!(*result.status(), Some(3));
}

#[test]
fn it_should_reject_a_missing_program() {
  common::setup();

  let config = RunConfig::new("/no/such/binary", Vec::<String>::new())
    .current_user()
    .build();
  let result = run(&config);

  assert_eq!(result.outcome(), Outcome::SystemError);
  assert_eq!(result.fault(), Fault::InvalidConfig);
}

#[test]
fn it_should_report_an_exec_failure() {
  common::setup();

  // passes validation (resolved through PATH), fails only at exec time
  let config = RunConfig::new("definitely-not-a-real-command", Vec::<String>::new())
    .current_user()
    .build();
  let result = run(&config);

  assert_eq!(result.outcome(), Outcome::SystemError);
  assert_eq!(result.fault(), Fault::ExecFailed);
}

#[test]
fn it_should_require_privilege_to_change_identity() {
  common::setup();

  if Uid::effective().is_root() {
    info!("running as root, skipping the privilege check");
    return;
  }

  let config = RunConfig::new("/bin/echo", vec!["hello"]).uid(1).gid(1).build();
  let result = run(&config);

  assert_eq!(result.outcome(), Outcome::SystemError);
  assert_eq!(result.fault(), Fault::PrivilegeRequired);
}

#[test]
fn it_should_behave_the_same_across_sequential_runs() {
  common::setup();

  let dir = tempdir().unwrap();
  let out = dir.path().join("twice.out");
  let out = out.to_string_lossy().to_string();

  for _ in 0..2 {
    let config = RunConfig::new("/bin/echo", vec!["again"])
      .current_user()
      .stdout(out.clone())
      .build();
    let result = run(&config);

    assert_eq!(result.outcome(), Outcome::Success);
    assert_eq!(result.fault(), Fault::None);
    assert_eq!(fs::read_to_string(&out).unwrap(), "again\n");
  }
}
