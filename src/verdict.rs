use nix::sys::signal::Signal;

use crate::config::{Outcome, RunConfig};
use crate::utils::limited;

/// Map the child's termination state and measured usage onto the judge's
/// result taxonomy. Engine faults are handled by the caller and never reach
/// this function.
///
/// When several ceilings could explain the same kill signal, CPU time wins
/// only if the measured CPU time actually reached its ceiling; otherwise the
/// wall clock, then memory, are charged.
pub(crate) fn classify(
  config: &RunConfig,
  status: Option<i32>,
  signal: Option<Signal>,
  cpu_time: u64,
  real_time: u64,
  memory: u64,
  watchdog_fired: bool,
) -> Outcome {
  let cpu_exceeded = limited(config.cpu_time_limit()) && cpu_time >= config.cpu_time_limit();
  let real_exceeded = watchdog_fired
    || (limited(config.real_time_limit()) && real_time >= config.real_time_limit());
  let memory_exceeded = limited(config.memory_limit()) && memory >= config.memory_limit();

  match signal {
    Some(Signal::SIGXCPU) => Outcome::CpuTimeLimitExceeded,
    Some(_) => {
      if cpu_exceeded {
        Outcome::CpuTimeLimitExceeded
      } else if real_exceeded {
        Outcome::RealTimeLimitExceeded
      } else if memory_exceeded {
        Outcome::MemoryLimitExceeded
      } else {
        // SIGSEGV within the limits, SIGSYS from the filter, SIGXFSZ from
        // the output ceiling: the submission's own fault
        Outcome::RuntimeError
      }
    }
    None => {
      if cpu_exceeded {
        Outcome::CpuTimeLimitExceeded
      } else if real_exceeded {
        Outcome::RealTimeLimitExceeded
      } else if memory_exceeded {
        Outcome::MemoryLimitExceeded
      } else if status.map_or(false, |code| code != 0) {
        Outcome::RuntimeError
      } else {
        Outcome::Success
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config() -> RunConfig {
    RunConfig::new("/bin/true", Vec::<String>::new())
      .cpu_time_limit(1000)
      .real_time_limit(2000)
      .memory_limit(64 * 1024 * 1024)
      .build()
  }

  #[test]
  fn it_should_pass_a_clean_exit() {
    let outcome = classify(&config(), Some(0), None, 10, 20, 1024 * 1024, false);
    assert_eq!(outcome, Outcome::Success);
  }

  #[test]
  fn it_should_report_a_non_zero_exit() {
    let outcome = classify(&config(), Some(1), None, 10, 20, 1024 * 1024, false);
    assert_eq!(outcome, Outcome::RuntimeError);
  }

  #[test]
  fn it_should_charge_cpu_time_on_sigxcpu() {
    let outcome = classify(
      &config(),
      None,
      Some(Signal::SIGXCPU),
      1100,
      1200,
      1024 * 1024,
      false,
    );
    assert_eq!(outcome, Outcome::CpuTimeLimitExceeded);
  }

  #[test]
  fn it_should_charge_cpu_time_on_a_measured_overshoot() {
    // the ceiling was reached even though the process exited by itself
    let outcome = classify(&config(), Some(0), None, 1000, 1200, 1024 * 1024, false);
    assert_eq!(outcome, Outcome::CpuTimeLimitExceeded);
  }

  #[test]
  fn it_should_charge_the_wall_clock_when_the_watchdog_killed() {
    let outcome = classify(
      &config(),
      None,
      Some(Signal::SIGKILL),
      50,
      2100,
      1024 * 1024,
      true,
    );
    assert_eq!(outcome, Outcome::RealTimeLimitExceeded);
  }

  #[test]
  fn it_should_charge_memory_on_a_strict_mode_kill() {
    let outcome = classify(
      &config(),
      None,
      Some(Signal::SIGSEGV),
      100,
      200,
      80 * 1024 * 1024,
      false,
    );
    assert_eq!(outcome, Outcome::MemoryLimitExceeded);
  }

  #[test]
  fn it_should_charge_memory_post_hoc_in_check_only_mode() {
    // same verdict as strict mode, only the mechanism differs
    let outcome = classify(&config(), Some(0), None, 100, 200, 80 * 1024 * 1024, false);
    assert_eq!(outcome, Outcome::MemoryLimitExceeded);
  }

  #[test]
  fn it_should_prefer_cpu_over_memory_only_when_cpu_reached_its_ceiling() {
    // a SIGKILL explicable by both: memory wins below the cpu ceiling
    let outcome = classify(
      &config(),
      None,
      Some(Signal::SIGKILL),
      900,
      1000,
      80 * 1024 * 1024,
      false,
    );
    assert_eq!(outcome, Outcome::MemoryLimitExceeded);

    let outcome = classify(
      &config(),
      None,
      Some(Signal::SIGKILL),
      1050,
      1000,
      80 * 1024 * 1024,
      false,
    );
    assert_eq!(outcome, Outcome::CpuTimeLimitExceeded);
  }

  #[test]
  fn it_should_report_a_plain_crash() {
    let outcome = classify(
      &config(),
      None,
      Some(Signal::SIGSEGV),
      10,
      20,
      1024 * 1024,
      false,
    );
    assert_eq!(outcome, Outcome::RuntimeError);
  }

  #[test]
  fn it_should_report_a_filter_violation() {
    let outcome = classify(
      &config(),
      None,
      Some(Signal::SIGSYS),
      10,
      20,
      1024 * 1024,
      false,
    );
    assert_eq!(outcome, Outcome::RuntimeError);
  }

  #[test]
  fn it_should_ignore_disabled_limits() {
    let config = RunConfig::new("/bin/true", Vec::<String>::new()).build();
    let outcome = classify(&config, Some(0), None, 123456, 654321, u64::MAX / 2, false);
    assert_eq!(outcome, Outcome::Success);
  }
}
