use std::ffi::CString;
use std::mem;
use std::time::Instant;

use libc_stdhandle::{stderr, stdin, stdout};
use log::{error, info};
use nix::errno::Errno;
use nix::libc::{self, c_int, freopen};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::{execvpe, fork, setgid, setgroups, setuid, ForkResult, Pid, Uid};
use seccompiler::BpfProgram;

use crate::config::{Fault, Outcome, RunConfig, RunResult};
use crate::error::JudgeBoxError;
use crate::pipe::{FaultPipe, FaultWritePipe};
use crate::utils::{into_c_string, limited, milliseconds};
use crate::watchdog::Watchdog;
use crate::{filter, rlimit, verdict};

/// Everything the child needs after the fork, built up front so the
/// child only performs setup syscalls before exec
struct Prepared {
  program: CString,
  argv: Vec<CString>,
  envp: Vec<CString>,
  bpf: Option<BpfProgram>,
}

impl Prepared {
  fn new(config: &RunConfig) -> Result<Self, JudgeBoxError> {
    let program = into_c_string(config.program());
    let arguments = config
      .arguments()
      .iter()
      .map(|p| into_c_string(p))
      .collect::<Vec<CString>>();
    let argv = [vec![program.clone()], arguments].concat();
    let envp = config
      .env()
      .iter()
      .map(|(key, value)| into_c_string(&format!("{}={}", key, value)))
      .collect::<Vec<CString>>();
    let bpf = match config.policy() {
      Some(name) => Some(filter::compile(name)?),
      None => None,
    };
    Ok(Prepared {
      program,
      argv,
      envp,
      bpf,
    })
  }
}

/// Run one submission under the configured limits and produce its result.
/// Engine failures are reported through the result's fault, never panics.
pub fn run(config: &RunConfig) -> RunResult {
  if let Err(err) = config.validate() {
    error!("Invalid run config: {}", err);
    return RunResult::from_fault(Fault::InvalidConfig);
  }
  if !config.privileged() {
    error!(
      "Dropping to uid {} / gid {} requires root",
      config.uid(),
      config.gid()
    );
    return RunResult::from_fault(Fault::PrivilegeRequired);
  }

  let prepared = match Prepared::new(config) {
    Ok(prepared) => prepared,
    Err(err) => {
      error!("Prepare syscall filter fails: {}", err);
      return RunResult::from_fault(Fault::FilterLoadFailed);
    }
  };

  let pipe = match FaultPipe::new() {
    Ok(pipe) => pipe,
    Err(err) => {
      error!("Create fault pipe fails: {}", err);
      return RunResult::from_fault(Fault::ForkFailed);
    }
  };

  let start = Instant::now();
  match unsafe { fork() } {
    Ok(ForkResult::Parent { child, .. }) => parent_main(config, child, pipe, start),
    Ok(ForkResult::Child) => child_main(config, prepared, pipe),
    Err(errno) => {
      error!("Fork fails: {}", errno);
      RunResult::from_fault(Fault::ForkFailed)
    }
  }
}

fn parent_main(config: &RunConfig, child: Pid, pipe: FaultPipe, start: Instant) -> RunResult {
  info!("Start supervising child process (pid = {})", child);

  let pipe = match pipe.reader() {
    Ok(pipe) => pipe,
    Err(err) => {
      error!("Open fault pipe fails: {}", err);
      let _ = kill(child, Signal::SIGKILL);
      let _ = wait_for(child);
      return RunResult::from_fault(Fault::ForkFailed);
    }
  };

  let watchdog = if limited(config.real_time_limit()) {
    match Watchdog::spawn(child, config.real_time_limit()) {
      Ok(watchdog) => Some(watchdog),
      Err(err) => {
        error!("Start watchdog fails: {}", err);
        let _ = kill(child, Signal::SIGKILL);
        let _ = wait_for(child);
        return RunResult::from_fault(Fault::WatchdogFailed);
      }
    }
  } else {
    None
  };

  let (status, signal, usage) = match wait_for(child) {
    Ok(waited) => waited,
    Err(err) => {
      error!("Wait for child process fails: {}", err);
      let _ = kill(child, Signal::SIGKILL);
      if let Some(watchdog) = watchdog {
        watchdog.disarm();
      }
      return RunResult::from_fault(Fault::WaitFailed);
    }
  };
  let real_time = start.elapsed().as_millis() as u64;
  let watchdog_fired = watchdog.map_or(false, |watchdog| watchdog.disarm());

  let cpu_time = milliseconds(&usage.ru_utime) + milliseconds(&usage.ru_stime);
  let memory = (usage.ru_maxrss as u64) * 1024;
  info!(
    "Child used {} ms cpu time, {} ms real time, {} KB memory",
    cpu_time, real_time, usage.ru_maxrss
  );

  if let Some((fault, message)) = pipe.read_fault() {
    error!("Child setup fails before exec: {}: {}", fault, message);
    return RunResult::new(
      status,
      signal,
      cpu_time,
      real_time,
      memory,
      Outcome::SystemError,
      fault,
    );
  }

  let outcome = verdict::classify(
    config,
    status,
    signal,
    cpu_time,
    real_time,
    memory,
    watchdog_fired,
  );
  RunResult::new(
    status,
    signal,
    cpu_time,
    real_time,
    memory,
    outcome,
    Fault::None,
  )
}

/// Reap the child and collect its own resource usage
fn wait_for(child: Pid) -> Result<(Option<i32>, Option<Signal>, libc::rusage), JudgeBoxError> {
  let mut status: c_int = 0;
  let mut usage: libc::rusage = unsafe { mem::zeroed() };
  let pid = unsafe { libc::wait4(child.as_raw(), &mut status, 0, &mut usage) };
  if pid < 0 {
    return Err(JudgeBoxError::from(Errno::last()));
  }

  match WaitStatus::from_raw(Pid::from_raw(pid), status)? {
    WaitStatus::Exited(pid, status) => {
      info!("Child process #{}. exited with status {}", pid, status);
      Ok((Some(status), None, usage))
    }
    WaitStatus::Signaled(pid, signal, _) => {
      info!("Child process #{}. is signaled by {}", pid, signal);
      Ok((None, Some(signal), usage))
    }
    other => Err(JudgeBoxError::fork(format!(
      "unexpected wait status: {:?}",
      other
    ))),
  }
}

/// Child side: ordered, fallible setup, then exec. A failure at any step
/// reports its fault through the pipe and terminates the child immediately;
/// the target program never runs with weaker isolation than configured.
fn child_main(config: &RunConfig, prepared: Prepared, pipe: FaultPipe) -> RunResult {
  let pipe = match pipe.writer() {
    Ok(pipe) => pipe,
    Err(_) => unsafe { libc::_exit(1) },
  };

  if let Err(err) = rlimit::apply(config) {
    fail(&pipe, Fault::LimitSetFailed, &err);
  }
  if let Err(err) = redirect_io(config) {
    fail(&pipe, Fault::IoRedirectFailed, &err);
  }
  if let Some(bpf) = &prepared.bpf {
    if let Err(err) = filter::install(bpf) {
      fail(&pipe, Fault::FilterLoadFailed, &err);
    }
  }
  if let Err(err) = drop_privileges(config) {
    fail(&pipe, Fault::PrivilegeDropFailed, &err);
  }

  let result = execvpe(
    prepared.program.as_c_str(),
    prepared.argv.as_slice(),
    prepared.envp.as_slice(),
  );
  if let Err(errno) = result {
    let _ = pipe.write(format!("{}: {}", Fault::ExecFailed, errno.desc()));
  }
  unsafe { libc::_exit(1) }
}

fn fail(pipe: &FaultWritePipe, fault: Fault, err: &JudgeBoxError) -> ! {
  let _ = pipe.write(format!("{}: {}", fault, err));
  unsafe { libc::_exit(1) }
}

/// Rebind the standard streams to the configured files, truncating outputs
fn redirect_io(config: &RunConfig) -> Result<(), JudgeBoxError> {
  unsafe {
    if let Some(in_path) = config.stdin() {
      let path = into_c_string(in_path);
      let mode = CString::new("r").unwrap();
      if freopen(path.as_ptr(), mode.as_ptr(), stdin()).is_null() {
        return Err(JudgeBoxError::fs(format!("freopen stdin to {} fails", in_path)));
      }
    }

    if let Some(out_path) = config.stdout() {
      let path = into_c_string(out_path);
      let mode = CString::new("w").unwrap();
      if freopen(path.as_ptr(), mode.as_ptr(), stdout()).is_null() {
        return Err(JudgeBoxError::fs(format!("freopen stdout to {} fails", out_path)));
      }
    }

    if let Some(err_path) = config.stderr() {
      let path = into_c_string(err_path);
      let mode = CString::new("w").unwrap();
      if freopen(path.as_ptr(), mode.as_ptr(), stderr()).is_null() {
        return Err(JudgeBoxError::fs(format!("freopen stderr to {} fails", err_path)));
      }
    }
  }

  Ok(())
}

/// Switch to the configured unprivileged identity, group first, and make
/// sure the original privilege can not be regained
fn drop_privileges(config: &RunConfig) -> Result<(), JudgeBoxError> {
  let uid = config.uid();
  let gid = config.gid();

  if Uid::effective().is_root() {
    setgroups(&[gid])?;
  }
  setgid(gid)?;
  setuid(uid)?;

  if !uid.is_root() && setuid(Uid::from_raw(0)).is_ok() {
    return Err(JudgeBoxError::privilege(
      "process can regain root after dropping privileges",
    ));
  }

  Ok(())
}
