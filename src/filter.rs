use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;
use log::debug;
use nix::errno::Errno;
use nix::libc::{
  self, c_long, SYS_accept, SYS_accept4, SYS_access, SYS_arch_prctl, SYS_bind, SYS_brk,
  SYS_clock_getres, SYS_clock_gettime, SYS_clock_nanosleep, SYS_clone, SYS_clone3, SYS_close,
  SYS_connect, SYS_dup, SYS_dup2, SYS_dup3, SYS_execve, SYS_execveat, SYS_exit, SYS_exit_group,
  SYS_faccessat, SYS_fcntl, SYS_fork, SYS_fstat, SYS_futex, SYS_getcwd, SYS_getegid, SYS_geteuid,
  SYS_getgid, SYS_getpeername, SYS_getpid, SYS_getrandom, SYS_getrlimit, SYS_getsockname,
  SYS_getsockopt, SYS_gettid, SYS_getuid, SYS_kill, SYS_listen, SYS_lseek, SYS_lstat, SYS_madvise,
  SYS_mmap, SYS_mprotect, SYS_mremap, SYS_munmap, SYS_nanosleep, SYS_newfstatat, SYS_open,
  SYS_openat, SYS_pread64, SYS_prlimit64, SYS_ptrace, SYS_pwrite64, SYS_read, SYS_readlink,
  SYS_readlinkat, SYS_readv, SYS_recvfrom, SYS_recvmsg, SYS_rseq, SYS_rt_sigaction,
  SYS_rt_sigprocmask, SYS_rt_sigreturn, SYS_sched_getaffinity, SYS_sched_yield, SYS_sendmsg,
  SYS_sendto, SYS_set_robust_list, SYS_set_tid_address, SYS_setgid, SYS_setgroups,
  SYS_setsockopt, SYS_setuid, SYS_shutdown, SYS_sigaltstack, SYS_socket, SYS_socketpair,
  SYS_stat, SYS_sysinfo, SYS_uname, SYS_vfork, SYS_write, SYS_writev,
};
use seccompiler::{
  BpfProgram, SeccompAction, SeccompCmpArgLen, SeccompCmpOp, SeccompCondition, SeccompFilter,
  SeccompRule, TargetArch,
};

use crate::error::JudgeBoxError;

/// Network syscalls, never available to a filtered submission
const NETWORK_SYSCALLS: &[c_long] = &[
  SYS_socket,
  SYS_socketpair,
  SYS_setsockopt,
  SYS_getsockopt,
  SYS_getsockname,
  SYS_getpeername,
  SYS_bind,
  SYS_listen,
  SYS_accept,
  SYS_accept4,
  SYS_connect,
  SYS_shutdown,
  SYS_sendto,
  SYS_recvfrom,
  SYS_sendmsg,
  SYS_recvmsg,
];

/// Process control syscalls a filtered submission may not use
const PROCESS_SYSCALLS: &[c_long] = &[
  SYS_fork,
  SYS_vfork,
  SYS_clone,
  SYS_clone3,
  SYS_execveat,
  SYS_kill,
  SYS_ptrace,
];

/// Whitelist for compiled batch programs: dynamic loading, memory management,
/// stdio and process teardown, plus the calls the child itself still needs
/// between filter installation and exec (privilege drop and one execve).
const COMPUTE_SYSCALLS: &[c_long] = &[
  SYS_read,
  SYS_write,
  SYS_readv,
  SYS_writev,
  SYS_pread64,
  SYS_pwrite64,
  SYS_lseek,
  SYS_close,
  SYS_fstat,
  SYS_stat,
  SYS_lstat,
  SYS_newfstatat,
  SYS_access,
  SYS_faccessat,
  SYS_readlink,
  SYS_readlinkat,
  SYS_getcwd,
  SYS_mmap,
  SYS_munmap,
  SYS_mprotect,
  SYS_mremap,
  SYS_madvise,
  SYS_brk,
  SYS_arch_prctl,
  SYS_set_tid_address,
  SYS_set_robust_list,
  SYS_rseq,
  SYS_prlimit64,
  SYS_getrlimit,
  SYS_getrandom,
  SYS_futex,
  SYS_rt_sigaction,
  SYS_rt_sigprocmask,
  SYS_rt_sigreturn,
  SYS_sigaltstack,
  SYS_sched_getaffinity,
  SYS_sched_yield,
  SYS_gettid,
  SYS_getpid,
  SYS_getuid,
  SYS_geteuid,
  SYS_getgid,
  SYS_getegid,
  SYS_uname,
  SYS_sysinfo,
  SYS_clock_gettime,
  SYS_clock_getres,
  SYS_clock_nanosleep,
  SYS_nanosleep,
  SYS_exit,
  SYS_exit_group,
  SYS_setgid,
  SYS_setgroups,
  SYS_setuid,
  SYS_execve,
];

/// Extra file syscalls for submissions that read and write data files
const FILE_IO_SYSCALLS: &[c_long] = &[SYS_dup, SYS_dup2, SYS_dup3, SYS_fcntl];

type PolicyBuilder = fn() -> Result<SeccompFilter, JudgeBoxError>;

lazy_static! {
  static ref POLICIES: HashMap<&'static str, PolicyBuilder> = {
    let mut map: HashMap<&'static str, PolicyBuilder> = HashMap::new();
    map.insert("general", general_policy as PolicyBuilder);
    map.insert("c_cpp", c_cpp_policy as PolicyBuilder);
    map.insert("c_cpp_file_io", c_cpp_file_io_policy as PolicyBuilder);
    map
  };
}

/// Whether a policy name is part of the catalog
pub(crate) fn exists(name: &str) -> bool {
  POLICIES.contains_key(name)
}

/// Resolve a policy name and compile it down to a loadable BPF program
pub(crate) fn compile(name: &str) -> Result<BpfProgram, JudgeBoxError> {
  let build = POLICIES
    .get(name)
    .ok_or_else(|| JudgeBoxError::filter(format!("unknown syscall policy: {}", name)))?;
  let filter = build()?;
  debug!("Compiled syscall policy {}", name);
  filter
    .try_into()
    .map_err(|err: seccompiler::BackendError| JudgeBoxError::filter(err.to_string()))
}

/// Install a compiled filter into the calling process. Irrevocable: the
/// target program runs under it from its first instruction, and a violation
/// terminates the whole process.
pub(crate) fn install(program: &BpfProgram) -> Result<(), JudgeBoxError> {
  let ret = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
  if ret != 0 {
    return Err(JudgeBoxError::from(Errno::last()));
  }
  seccompiler::apply_filter(program).map_err(|err| JudgeBoxError::filter(err.to_string()))
}

fn target_arch() -> Result<TargetArch, JudgeBoxError> {
  TargetArch::try_from(std::env::consts::ARCH).map_err(|_| {
    JudgeBoxError::filter(format!(
      "unsupported seccomp architecture: {}",
      std::env::consts::ARCH
    ))
  })
}

/// Blacklist policy: everything is allowed except networking and process
/// control, a violation kills the submission outright
fn general_policy() -> Result<SeccompFilter, JudgeBoxError> {
  let mut rules: BTreeMap<i64, Vec<SeccompRule>> = BTreeMap::new();
  for id in NETWORK_SYSCALLS.iter().chain(PROCESS_SYSCALLS.iter()) {
    rules.insert(*id as i64, vec![]);
  }
  SeccompFilter::new(
    rules,
    SeccompAction::Allow,
    SeccompAction::KillProcess,
    target_arch()?,
  )
  .map_err(|err| JudgeBoxError::filter(err.to_string()))
}

/// Whitelist policy for compiled batch programs, files only openable read only
fn c_cpp_policy() -> Result<SeccompFilter, JudgeBoxError> {
  let mut rules = compute_rules();
  // open flags live in arg1 for open and arg2 for openat
  rules.insert(SYS_open as i64, read_only_rules(1)?);
  rules.insert(SYS_openat as i64, read_only_rules(2)?);
  SeccompFilter::new(
    rules,
    SeccompAction::KillProcess,
    SeccompAction::Allow,
    target_arch()?,
  )
  .map_err(|err| JudgeBoxError::filter(err.to_string()))
}

/// Whitelist policy for compiled batch programs that do their own file I/O
fn c_cpp_file_io_policy() -> Result<SeccompFilter, JudgeBoxError> {
  let mut rules = compute_rules();
  rules.insert(SYS_open as i64, vec![]);
  rules.insert(SYS_openat as i64, vec![]);
  for id in FILE_IO_SYSCALLS.iter() {
    rules.insert(*id as i64, vec![]);
  }
  SeccompFilter::new(
    rules,
    SeccompAction::KillProcess,
    SeccompAction::Allow,
    target_arch()?,
  )
  .map_err(|err| JudgeBoxError::filter(err.to_string()))
}

fn compute_rules() -> BTreeMap<i64, Vec<SeccompRule>> {
  COMPUTE_SYSCALLS
    .iter()
    .map(|id| (*id as i64, vec![]))
    .collect()
}

fn read_only_rules(flag_index: u8) -> Result<Vec<SeccompRule>, JudgeBoxError> {
  let condition = SeccompCondition::new(
    flag_index,
    SeccompCmpArgLen::Dword,
    SeccompCmpOp::MaskedEq(libc::O_ACCMODE as u64),
    libc::O_RDONLY as u64,
  )
  .map_err(|err| JudgeBoxError::filter(err.to_string()))?;
  let rule =
    SeccompRule::new(vec![condition]).map_err(|err| JudgeBoxError::filter(err.to_string()))?;
  Ok(vec![rule])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn it_should_know_the_catalog() {
    assert!(exists("general"));
    assert!(exists("c_cpp"));
    assert!(exists("c_cpp_file_io"));
    assert!(!exists("python"));
  }

  #[test]
  fn it_should_compile_every_policy() {
    for name in POLICIES.keys() {
      assert!(compile(name).is_ok(), "policy {} should compile", name);
    }
  }

  #[test]
  fn it_should_keep_the_child_setup_calls_allowed() {
    // the filter is installed before the privilege drop and the exec
    for id in [SYS_setgroups, SYS_setgid, SYS_setuid, SYS_execve] {
      assert!(COMPUTE_SYSCALLS.contains(&id));
      assert!(!NETWORK_SYSCALLS.contains(&id));
      assert!(!PROCESS_SYSCALLS.contains(&id));
    }
  }
}
