use std::env;

use nix::unistd::{Gid, Group, Uid, User};

use crate::config::RunConfig;
use crate::utils::{parse_env, GidType, TimeLimitType, UidType, UNLIMITED};
use crate::JudgeBoxError;

/// Build one RunConfig
pub struct RunConfigBuilder {
  config: RunConfig,
}

impl RunConfig {
  /// Start building a config for one program invocation.
  /// Every limit starts unlimited and the identity defaults to the caller's own.
  pub fn new<PS: Into<String>, AS: Into<String>>(
    program: PS,
    arguments: Vec<AS>,
  ) -> RunConfigBuilder {
    RunConfigBuilder {
      config: RunConfig {
        cpu_time_limit: UNLIMITED,
        real_time_limit: UNLIMITED,
        memory_limit: UNLIMITED,
        stack_limit: UNLIMITED,
        process_limit: UNLIMITED,
        output_limit: UNLIMITED,
        memory_check_only: false,
        program: program.into(),
        arguments: arguments.into_iter().map(|a| a.into()).collect(),
        env: vec![(
          "PATH".to_string(),
          env::var("PATH").unwrap_or("".to_string()),
        )],
        stdin: None,
        stdout: None,
        stderr: None,
        log_path: None,
        policy: None,
        uid: Uid::effective(),
        gid: Gid::effective(),
      },
    }
  }
}

impl RunConfigBuilder {
  /// Finish building
  pub fn build(self) -> RunConfig {
    self.config
  }

  /// Set CPU time limit (unit: ms)
  pub fn cpu_time_limit(mut self, value: TimeLimitType) -> Self {
    self.config.cpu_time_limit = value;
    self
  }

  /// Set CPU time limit or do nothing
  pub fn set_cpu_time_limit(mut self, value: Option<TimeLimitType>) -> Self {
    if let Some(value) = value {
      self.config.cpu_time_limit = value;
    }
    self
  }

  /// Set real time limit (unit: ms)
  pub fn real_time_limit(mut self, value: TimeLimitType) -> Self {
    self.config.real_time_limit = value;
    self
  }

  /// Set real time limit or do nothing
  pub fn set_real_time_limit(mut self, value: Option<TimeLimitType>) -> Self {
    if let Some(value) = value {
      self.config.real_time_limit = value;
    }
    self
  }

  /// Set memory limit (unit: bytes)
  pub fn memory_limit(mut self, value: u64) -> Self {
    self.config.memory_limit = value;
    self
  }

  /// Set memory limit or do nothing
  pub fn set_memory_limit(mut self, value: Option<u64>) -> Self {
    if let Some(value) = value {
      self.config.memory_limit = value;
    }
    self
  }

  /// Set stack limit (unit: bytes)
  pub fn stack_limit(mut self, value: u64) -> Self {
    self.config.stack_limit = value;
    self
  }

  /// Set stack limit or do nothing
  pub fn set_stack_limit(mut self, value: Option<u64>) -> Self {
    if let Some(value) = value {
      self.config.stack_limit = value;
    }
    self
  }

  /// Set the max number of processes
  pub fn process_limit(mut self, value: u64) -> Self {
    self.config.process_limit = value;
    self
  }

  /// Set the max number of processes or do nothing
  pub fn set_process_limit(mut self, value: Option<u64>) -> Self {
    if let Some(value) = value {
      self.config.process_limit = value;
    }
    self
  }

  /// Set output size limit (unit: bytes)
  pub fn output_limit(mut self, value: u64) -> Self {
    self.config.output_limit = value;
    self
  }

  /// Set output size limit or do nothing
  pub fn set_output_limit(mut self, value: Option<u64>) -> Self {
    if let Some(value) = value {
      self.config.output_limit = value;
    }
    self
  }

  /// Measure peak memory only instead of enforcing a hard address space ceiling
  pub fn memory_check_only(mut self, flag: bool) -> Self {
    self.config.memory_check_only = flag;
    self
  }

  /// Set stdin redirection
  pub fn stdin<PS: Into<String>>(mut self, path: PS) -> Self {
    self.config.stdin = Some(path.into());
    self
  }

  /// Set stdin redirection or not
  pub fn set_stdin<PS: Into<String>>(mut self, path: Option<PS>) -> Self {
    self.config.stdin = path.map(|p| p.into());
    self
  }

  /// Set stdout redirection
  pub fn stdout<PS: Into<String>>(mut self, path: PS) -> Self {
    self.config.stdout = Some(path.into());
    self
  }

  /// Set stdout redirection or not
  pub fn set_stdout<PS: Into<String>>(mut self, path: Option<PS>) -> Self {
    self.config.stdout = path.map(|p| p.into());
    self
  }

  /// Set stderr redirection
  pub fn stderr<PS: Into<String>>(mut self, path: PS) -> Self {
    self.config.stderr = Some(path.into());
    self
  }

  /// Set stderr redirection or not
  pub fn set_stderr<PS: Into<String>>(mut self, path: Option<PS>) -> Self {
    self.config.stderr = path.map(|p| p.into());
    self
  }

  /// Set audit log path or not
  pub fn set_log_path<PS: Into<String>>(mut self, path: Option<PS>) -> Self {
    self.config.log_path = path.map(|p| p.into());
    self
  }

  /// Select a named syscall filter policy
  pub fn policy<NS: Into<String>>(mut self, name: NS) -> Self {
    self.config.policy = Some(name.into());
    self
  }

  /// Select a named syscall filter policy or not
  pub fn set_policy<NS: Into<String>>(mut self, name: Option<NS>) -> Self {
    self.config.policy = name.map(|n| n.into());
    self
  }

  /// Set uid
  pub fn uid(mut self, uid: UidType) -> Self {
    self.config.uid = Uid::from_raw(uid);
    self
  }

  /// Set gid
  pub fn gid(mut self, gid: GidType) -> Self {
    self.config.gid = Gid::from_raw(gid);
    self
  }

  /// Resolve uid / gid from a user name
  pub fn user(mut self, name: &str) -> Result<Self, JudgeBoxError> {
    let user = User::from_name(name)
      .map_err(JudgeBoxError::from)?
      .ok_or_else(|| JudgeBoxError::config(format!("user {} can not be resolved", name)))?;
    self.config.uid = user.uid;
    self.config.gid = user.gid;
    Ok(self)
  }

  /// Resolve gid from a group name
  pub fn group(mut self, name: &str) -> Result<Self, JudgeBoxError> {
    let group = Group::from_name(name)
      .map_err(JudgeBoxError::from)?
      .ok_or_else(|| JudgeBoxError::config(format!("group {} can not be resolved", name)))?;
    self.config.gid = group.gid;
    Ok(self)
  }

  /// Set uid / gid with current user
  pub fn current_user(mut self) -> Self {
    self.config.uid = Uid::effective();
    self.config.gid = Gid::effective();
    self
  }

  /// Pass env
  pub fn env<KS: Into<String>, VS: Into<String>>(mut self, key: KS, value: VS) -> Self {
    self.config.env.push((key.into(), value.into()));
    self
  }

  /// Parse env list
  pub fn parse_env_list(mut self, list: Vec<String>) -> Result<Self, JudgeBoxError> {
    for env_var in list {
      self.config.env.push(parse_env(env_var)?);
    }
    Ok(self)
  }
}
