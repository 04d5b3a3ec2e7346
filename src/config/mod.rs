use std::fmt::{self, Display};
use std::path::Path;

use nix::libc::STDOUT_FILENO;
use nix::sys::signal::Signal;
use nix::unistd::{isatty, Gid, Group, Uid, User};

use crate::error::JudgeBoxError;
use crate::filter;
use crate::utils::{MemoryLimitType, TimeLimitType};

pub use builder::RunConfigBuilder;

mod builder;

/// Maximum number of argument strings accepted for one run
pub const ARGS_MAX_NUMBER: usize = 256;

/// Maximum number of environment entries accepted for one run
pub const ENV_MAX_NUMBER: usize = 256;

/// JudgeBox running config that describes one sandboxed execution
#[derive(Debug, Clone)]
pub struct RunConfig {
  /// CPU time ceiling (unit: ms)
  cpu_time_limit: TimeLimitType,
  /// Wall clock ceiling (unit: ms)
  real_time_limit: TimeLimitType,
  /// Memory ceiling (unit: bytes)
  memory_limit: MemoryLimitType,
  /// Stack ceiling (unit: bytes)
  stack_limit: MemoryLimitType,
  /// Process count ceiling
  process_limit: u64,
  /// Output size ceiling (unit: bytes)
  output_limit: u64,
  /// Measure peak memory only instead of enforcing a hard ceiling
  memory_check_only: bool,
  program: String,
  arguments: Vec<String>,
  env: Vec<(String, String)>,
  stdin: Option<String>,
  stdout: Option<String>,
  stderr: Option<String>,
  log_path: Option<String>,
  policy: Option<String>,
  uid: Uid,
  gid: Gid,
}

/// How the submitted program's execution concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  Success,
  CpuTimeLimitExceeded,
  RealTimeLimitExceeded,
  MemoryLimitExceeded,
  RuntimeError,
  SystemError,
}

/// Whether the engine itself failed to set up or supervise the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
  None,
  InvalidConfig,
  ForkFailed,
  WatchdogFailed,
  WaitFailed,
  PrivilegeRequired,
  FilterLoadFailed,
  LimitSetFailed,
  IoRedirectFailed,
  PrivilegeDropFailed,
  ExecFailed,
  ExternalCheckerError,
}

/// JudgeBox running result
#[derive(Debug, Clone)]
pub struct RunResult {
  status: Option<i32>,
  signal: Option<Signal>,
  cpu_time: TimeLimitType,
  real_time: TimeLimitType,
  memory: MemoryLimitType,
  outcome: Outcome,
  fault: Fault,
}

impl RunConfig {
  pub fn cpu_time_limit(&self) -> TimeLimitType {
    self.cpu_time_limit
  }

  pub fn real_time_limit(&self) -> TimeLimitType {
    self.real_time_limit
  }

  pub fn memory_limit(&self) -> MemoryLimitType {
    self.memory_limit
  }

  pub fn stack_limit(&self) -> MemoryLimitType {
    self.stack_limit
  }

  pub fn process_limit(&self) -> u64 {
    self.process_limit
  }

  pub fn output_limit(&self) -> u64 {
    self.output_limit
  }

  pub fn memory_check_only(&self) -> bool {
    self.memory_check_only
  }

  pub fn program(&self) -> &String {
    &self.program
  }

  pub fn arguments(&self) -> &Vec<String> {
    &self.arguments
  }

  pub fn env(&self) -> &Vec<(String, String)> {
    &self.env
  }

  pub fn stdin(&self) -> &Option<String> {
    &self.stdin
  }

  pub fn stdout(&self) -> &Option<String> {
    &self.stdout
  }

  pub fn stderr(&self) -> &Option<String> {
    &self.stderr
  }

  pub fn log_path(&self) -> &Option<String> {
    &self.log_path
  }

  pub fn policy(&self) -> &Option<String> {
    &self.policy
  }

  pub fn uid(&self) -> Uid {
    self.uid
  }

  pub fn gid(&self) -> Gid {
    self.gid
  }

  /// Reject a config before any process is created
  pub(crate) fn validate(&self) -> Result<(), JudgeBoxError> {
    if self.program.is_empty() {
      return Err(JudgeBoxError::config("program path is empty"));
    }
    if self.program.contains('\0') {
      return Err(JudgeBoxError::config("program path contains a NUL byte"));
    }
    let path = Path::new(&self.program);
    if path.is_absolute() && !path.exists() {
      return Err(JudgeBoxError::config(format!(
        "program {} does not exist",
        &self.program
      )));
    }

    if self.arguments.len() > ARGS_MAX_NUMBER {
      return Err(JudgeBoxError::config(format!(
        "too many arguments: {} (maximum {})",
        self.arguments.len(),
        ARGS_MAX_NUMBER
      )));
    }
    if self.env.len() > ENV_MAX_NUMBER {
      return Err(JudgeBoxError::config(format!(
        "too many environment entries: {} (maximum {})",
        self.env.len(),
        ENV_MAX_NUMBER
      )));
    }
    if self.arguments.iter().any(|arg| arg.contains('\0')) {
      return Err(JudgeBoxError::config("argument contains a NUL byte"));
    }
    if self
      .env
      .iter()
      .any(|(key, value)| key.contains('\0') || value.contains('\0'))
    {
      return Err(JudgeBoxError::config(
        "environment entry contains a NUL byte",
      ));
    }

    if self.cpu_time_limit == 0 {
      return Err(JudgeBoxError::config("cpu time limit must be positive"));
    }
    if self.real_time_limit == 0 {
      return Err(JudgeBoxError::config("real time limit must be positive"));
    }
    if self.memory_limit == 0 {
      return Err(JudgeBoxError::config("memory limit must be positive"));
    }
    if self.stack_limit == 0 {
      return Err(JudgeBoxError::config("stack limit must be positive"));
    }
    if self.process_limit == 0 {
      return Err(JudgeBoxError::config("process limit must be positive"));
    }
    if self.output_limit == 0 {
      return Err(JudgeBoxError::config("output limit must be positive"));
    }

    if let Some(name) = &self.policy {
      if !filter::exists(name) {
        return Err(JudgeBoxError::config(format!(
          "unknown syscall policy: {}",
          name
        )));
      }
    }

    match User::from_uid(self.uid) {
      Ok(Some(_)) => {}
      _ => {
        return Err(JudgeBoxError::config(format!(
          "uid {} can not be resolved",
          self.uid
        )));
      }
    }
    match Group::from_gid(self.gid) {
      Ok(Some(_)) => {}
      _ => {
        return Err(JudgeBoxError::config(format!(
          "gid {} can not be resolved",
          self.gid
        )));
      }
    }

    Ok(())
  }

  /// Dropping to another identity requires the caller to be root
  pub(crate) fn privileged(&self) -> bool {
    let euid = Uid::effective();
    euid.is_root() || (self.uid == euid && self.gid == Gid::effective())
  }
}

impl Outcome {
  pub fn as_str(&self) -> &'static str {
    match self {
      Outcome::Success => "Success",
      Outcome::CpuTimeLimitExceeded => "CpuTimeLimitExceeded",
      Outcome::RealTimeLimitExceeded => "RealTimeLimitExceeded",
      Outcome::MemoryLimitExceeded => "MemoryLimitExceeded",
      Outcome::RuntimeError => "RuntimeError",
      Outcome::SystemError => "SystemError",
    }
  }
}

impl Display for Outcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl Fault {
  pub fn is_none(&self) -> bool {
    matches!(self, Fault::None)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Fault::None => "None",
      Fault::InvalidConfig => "InvalidConfig",
      Fault::ForkFailed => "ForkFailed",
      Fault::WatchdogFailed => "WatchdogFailed",
      Fault::WaitFailed => "WaitFailed",
      Fault::PrivilegeRequired => "PrivilegeRequired",
      Fault::FilterLoadFailed => "FilterLoadFailed",
      Fault::LimitSetFailed => "LimitSetFailed",
      Fault::IoRedirectFailed => "IoRedirectFailed",
      Fault::PrivilegeDropFailed => "PrivilegeDropFailed",
      Fault::ExecFailed => "ExecFailed",
      Fault::ExternalCheckerError => "ExternalCheckerError",
    }
  }

  pub(crate) fn from_tag(tag: &str) -> Option<Fault> {
    match tag {
      "InvalidConfig" => Some(Fault::InvalidConfig),
      "ForkFailed" => Some(Fault::ForkFailed),
      "WatchdogFailed" => Some(Fault::WatchdogFailed),
      "WaitFailed" => Some(Fault::WaitFailed),
      "PrivilegeRequired" => Some(Fault::PrivilegeRequired),
      "FilterLoadFailed" => Some(Fault::FilterLoadFailed),
      "LimitSetFailed" => Some(Fault::LimitSetFailed),
      "IoRedirectFailed" => Some(Fault::IoRedirectFailed),
      "PrivilegeDropFailed" => Some(Fault::PrivilegeDropFailed),
      "ExecFailed" => Some(Fault::ExecFailed),
      "ExternalCheckerError" => Some(Fault::ExternalCheckerError),
      _ => None,
    }
  }
}

impl Display for Fault {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl RunResult {
  pub(crate) fn new(
    status: Option<i32>,
    signal: Option<Signal>,
    cpu_time: TimeLimitType,
    real_time: TimeLimitType,
    memory: MemoryLimitType,
    outcome: Outcome,
    fault: Fault,
  ) -> Self {
    RunResult {
      status,
      signal,
      cpu_time,
      real_time,
      memory,
      outcome,
      fault,
    }
  }

  /// A run that failed inside the engine, before any measurement was taken
  pub(crate) fn from_fault(fault: Fault) -> Self {
    RunResult {
      status: None,
      signal: None,
      cpu_time: 0,
      real_time: 0,
      memory: 0,
      outcome: Outcome::SystemError,
      fault,
    }
  }

  pub fn status(&self) -> &Option<i32> {
    &self.status
  }

  pub fn signal(&self) -> &Option<Signal> {
    &self.signal
  }

  pub fn cpu_time(&self) -> TimeLimitType {
    self.cpu_time
  }

  pub fn real_time(&self) -> TimeLimitType {
    self.real_time
  }

  pub fn memory(&self) -> MemoryLimitType {
    self.memory
  }

  pub fn outcome(&self) -> Outcome {
    self.outcome
  }

  pub fn fault(&self) -> Fault {
    self.fault
  }

  /// Report usage, human readable on a terminal and JSON otherwise
  pub fn report(&self) {
    let is_tty = isatty(STDOUT_FILENO).unwrap_or(false);
    if is_tty {
      self.report_human();
    } else {
      self.report_json();
    }
  }

  pub fn report_human(&self) {
    let outcome = if self.outcome == Outcome::Success {
      format!("\x1b[92m{}\x1b[39m", self.outcome)
    } else {
      format!("\x1b[91m{}\x1b[39m", self.outcome)
    };
    let fault = if self.fault.is_none() {
      "\x1b[92m✓\x1b[39m".to_string()
    } else {
      format!("\x1b[91m{}\x1b[39m", self.fault)
    };
    let status = self.status.map_or_else(
      || "\x1b[91m×\x1b[39m".to_string(),
      |v| format!("\x1b[9{}m{}\x1b[39m", if v == 0 { 2 } else { 1 }, v),
    );
    let signal = self.signal.map_or_else(
      || "\x1b[92m✓\x1b[39m".to_string(),
      |v| format!("\x1b[91m{}\x1b[39m", v),
    );

    println!();
    println!("\x1b[1mOutcome\x1b[22m    {}", outcome);
    println!("\x1b[1mFault\x1b[22m      {}", fault);
    println!("\x1b[1mStatus\x1b[22m     {}", status);
    println!("\x1b[1mSignal\x1b[22m     {}", signal);
    println!("\x1b[1mCPU time\x1b[22m   {} ms", self.cpu_time);
    println!("\x1b[1mReal time\x1b[22m  {} ms", self.real_time);
    println!("\x1b[1mMemory\x1b[22m     {} KB", self.memory / 1024);
    println!();
  }

  pub fn report_json(&self) {
    let status = self
      .status
      .map_or_else(|| "null".to_string(), |v| v.to_string());
    let signal = self
      .signal
      .map_or_else(|| "null".to_string(), |v| format!("\"{}\"", v));
    let fault = if self.fault.is_none() {
      "null".to_string()
    } else {
      format!("\"{}\"", self.fault)
    };

    println!("{{");
    println!("  \"ok\": {},", self.fault.is_none());
    println!("  \"outcome\": \"{}\",", self.outcome);
    println!("  \"fault\": {},", fault);
    println!("  \"status\": {},", status);
    println!("  \"signal\": {},", signal);
    println!("  \"cpu_time\": {},", self.cpu_time);
    println!("  \"real_time\": {},", self.real_time);
    println!("  \"memory\": {}", self.memory);
    println!("}}");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn it_should_accept_a_plain_config() {
    let config = RunConfig::new("/bin/echo", vec!["hello"]).build();
    assert!(config.validate().is_ok());
  }

  #[test]
  fn it_should_reject_empty_program() {
    let config = RunConfig::new("", Vec::<String>::new()).build();
    assert!(config.validate().is_err());
  }

  #[test]
  fn it_should_reject_missing_program() {
    let config = RunConfig::new("/no/such/binary", Vec::<String>::new()).build();
    assert!(config.validate().is_err());
  }

  #[test]
  fn it_should_reject_too_many_arguments() {
    let arguments = vec!["x".to_string(); ARGS_MAX_NUMBER + 1];
    let config = RunConfig::new("/bin/echo", arguments).build();
    assert!(config.validate().is_err());
  }

  #[test]
  fn it_should_reject_zero_limits() {
    let config = RunConfig::new("/bin/echo", Vec::<String>::new())
      .cpu_time_limit(0)
      .build();
    assert!(config.validate().is_err());
  }

  #[test]
  fn it_should_reject_unknown_policy() {
    let config = RunConfig::new("/bin/echo", Vec::<String>::new())
      .policy("no_such_policy")
      .build();
    assert!(config.validate().is_err());
  }

  #[test]
  fn it_should_reject_nul_bytes_in_arguments() {
    let config = RunConfig::new("/bin/echo", vec!["he\0llo"]).build();
    assert!(config.validate().is_err());
  }

  #[test]
  fn it_should_parse_fault_tags() {
    assert_eq!(Fault::from_tag("ExecFailed"), Some(Fault::ExecFailed));
    assert_eq!(Fault::from_tag("LimitSetFailed"), Some(Fault::LimitSetFailed));
    assert_eq!(Fault::from_tag("whatever"), None);
  }
}
