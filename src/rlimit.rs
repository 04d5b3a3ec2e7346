use log::debug;
use nix::sys::resource::{setrlimit, Resource};

use crate::config::RunConfig;
use crate::error::JudgeBoxError;
use crate::utils::limited;

/// Apply every configured resource ceiling to the calling process.
/// Runs in the child, before the target program is executed.
pub(crate) fn apply(config: &RunConfig) -> Result<(), JudgeBoxError> {
  if limited(config.cpu_time_limit()) {
    // rlimit granularity is one second, keep a grace second above the ceiling
    let seconds = (config.cpu_time_limit() as f64 / 1000.0).ceil() as u64 + 1;
    setrlimit(Resource::RLIMIT_CPU, seconds, seconds)?;
    debug!("Set cpu time limit {} seconds", seconds);
  }

  if !config.memory_check_only() && limited(config.memory_limit()) {
    // allocation headroom above the ceiling, the verdict compares the measured peak
    let bytes = config.memory_limit().saturating_mul(2);
    setrlimit(Resource::RLIMIT_AS, bytes, bytes)?;
    debug!("Set address space limit {} bytes", bytes);
  }

  if limited(config.stack_limit()) {
    let stack_size = config.stack_limit();
    setrlimit(Resource::RLIMIT_STACK, stack_size, stack_size)?;
    debug!("Set stack size {} bytes", stack_size);
  }

  if limited(config.process_limit()) {
    setrlimit(
      Resource::RLIMIT_NPROC,
      config.process_limit(),
      config.process_limit(),
    )?;
    debug!("Set process number limit {}", config.process_limit());
  }

  if limited(config.output_limit()) {
    setrlimit(
      Resource::RLIMIT_FSIZE,
      config.output_limit(),
      config.output_limit(),
    )?;
    debug!("Set output size limit {} bytes", config.output_limit());
  }

  Ok(())
}
