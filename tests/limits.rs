use std::path::PathBuf;
use std::process::Command;

use log::info;
use nix::sys::signal::Signal;
use tempfile::tempdir;

use judgebox::{run, Fault, Outcome, RunConfig};

mod common;

#[test]
fn it_should_kill_a_sleeping_program_on_the_wall_clock() {
  common::setup();

  let config = RunConfig::new("/bin/sleep", vec!["5"])
    .current_user()
    .real_time_limit(300)
    .build();
  let result = run(&config);

  info!("sleep was stopped after {} ms", result.real_time());
  assert_eq!(result.outcome(), Outcome::RealTimeLimitExceeded);
  assert_eq!(result.fault(), Fault::None);
  assert_eq!(*result.signal(), Some(Signal::SIGKILL));
  assert!(result.real_time() >= 300);
}

#[test]
fn it_should_kill_a_busy_loop_on_cpu_time() {
  common::setup();

  let config = RunConfig::new("/bin/sh", vec!["-c", "while : ; do : ; done"])
    .current_user()
    .cpu_time_limit(1000)
    .real_time_limit(10 * 1000)
    .build();
  let result = run(&config);

  info!("busy loop used {} ms cpu time", result.cpu_time());
  assert_eq!(result.outcome(), Outcome::CpuTimeLimitExceeded);
  assert_eq!(result.fault(), Fault::None);
  assert!(result.cpu_time() >= 1000);
}

#[test]
fn it_should_kill_a_program_flooding_its_output() {
  common::setup();

  let dir = tempdir().unwrap();
  let out = dir.path().join("flood.out");

  let config = RunConfig::new("/bin/sh", vec!["-c", "while : ; do echo aaaaaaaaaaaaaaaa ; done"])
    .current_user()
    .stdout(out.to_string_lossy().to_string())
    .output_limit(1024)
    .real_time_limit(10 * 1000)
    .build();
  let result = run(&config);

  assert_eq!(result.outcome(), Outcome::RuntimeError);
  assert_eq!(result.fault(), Fault::None);
  assert_eq!(*result.signal(), Some(Signal::SIGXFSZ));
}

fn compile_alloc_fixture(dir: &PathBuf) -> Option<String> {
  let executable = dir.join("alloc.out");
  let status = Command::new("cc")
    .arg("tests/fixtures/alloc.c")
    .arg("-o")
    .arg(&executable)
    .status();
  match status {
    Ok(status) if status.success() => Some(executable.to_string_lossy().to_string()),
    _ => {
      info!("no C compiler available, skipping the memory limit test");
      None
    }
  }
}

#[test]
fn it_should_stop_an_allocating_program_in_both_memory_modes() {
  common::setup();

  let dir = tempdir().unwrap();
  let dir = dir.path().to_path_buf();
  let executable = match compile_alloc_fixture(&dir) {
    Some(executable) => executable,
    None => return,
  };

  // the verdict must be identical, only the mechanism differs
  for check_only in [false, true] {
    let config = RunConfig::new(executable.clone(), Vec::<String>::new())
      .current_user()
      .memory_limit(32 * 1024 * 1024)
      .memory_check_only(check_only)
      .real_time_limit(10 * 1000)
      .build();
    let result = run(&config);

    info!(
      "alloc fixture peaked at {} KB (check_only = {})",
      result.memory() / 1024,
      check_only
    );
    assert_eq!(result.outcome(), Outcome::MemoryLimitExceeded);
    assert_eq!(result.fault(), Fault::None);
    assert!(result.memory() >= 32 * 1024 * 1024);
  }
}
