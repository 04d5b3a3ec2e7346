use std::fs;

use nix::sys::signal::Signal;
use tempfile::tempdir;

use judgebox::{run, Fault, Outcome, RunConfig};

mod common;

#[test]
fn it_should_allow_a_clean_program_under_the_general_policy() {
  common::setup();

  let dir = tempdir().unwrap();
  let out = dir.path().join("echo.out");
  let out = out.to_string_lossy().to_string();

  let config = RunConfig::new("/bin/echo", vec!["filtered"])
    .current_user()
    .policy("general")
    .stdout(out.clone())
    .build();
  let result = run(&config);

  assert_eq!(result.outcome(), Outcome::Success);
  assert_eq!(result.fault(), Fault::None);
  assert_eq!(fs::read_to_string(&out).unwrap(), "filtered\n");
}

#[test]
fn it_should_kill_a_forking_program_under_the_general_policy() {
  common::setup();

  // the pipeline forces the shell to fork, which the policy forbids
  let config = RunConfig::new("/bin/sh", vec!["-c", "echo hi | cat"])
    .current_user()
    .policy("general")
    .real_time_limit(5 * 1000)
    .build();
  let result = run(&config);

  assert_eq!(result.outcome(), Outcome::RuntimeError);
  assert_eq!(result.fault(), Fault::None);
  assert_eq!(*result.signal(), Some(Signal::SIGSYS));
}

#[test]
fn it_should_reject_an_unknown_policy_name() {
  common::setup();

  let config = RunConfig::new("/bin/echo", vec!["hello"])
    .current_user()
    .policy("no_such_policy")
    .build();
  let result = run(&config);

  assert_eq!(result.outcome(), Outcome::SystemError);
  assert_eq!(result.fault(), Fault::InvalidConfig);
}
