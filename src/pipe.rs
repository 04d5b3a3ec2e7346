use std::os::unix::prelude::RawFd;

use nix::{
  fcntl::OFlag,
  unistd::{self, close, pipe2},
};

use crate::config::Fault;
use crate::error::JudgeBoxError;

/// One-shot channel carrying a child setup fault back to the supervisor.
/// The write end closes on a successful exec, so a clean run reads nothing.
pub(crate) struct FaultPipe(RawFd, RawFd);

pub(crate) struct FaultReadPipe(RawFd);

pub(crate) struct FaultWritePipe(RawFd);

impl FaultPipe {
  pub fn new() -> Result<Self, JudgeBoxError> {
    let result = pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)?;
    Ok(FaultPipe(result.0, result.1))
  }

  pub fn reader(self) -> Result<FaultReadPipe, JudgeBoxError> {
    close(self.1)?;
    Ok(FaultReadPipe(self.0))
  }

  pub fn writer(self) -> Result<FaultWritePipe, JudgeBoxError> {
    close(self.0)?;
    Ok(FaultWritePipe(self.1))
  }
}

impl FaultReadPipe {
  /// Read the fault reported by the child, if any
  pub fn read_fault(&self) -> Option<(Fault, String)> {
    let mut buf = vec![0 as u8; 256];
    unistd::read(self.0, buf.as_mut_slice()).ok()?;
    let buf = buf.into_iter().take_while(|b| *b != 0).collect::<Vec<u8>>();
    if buf.is_empty() {
      return None;
    }
    let text = String::from_utf8(buf).ok().unwrap_or("".to_string());
    match text.split_once(": ") {
      Some((tag, message)) => {
        // an unknown tag still means the exec never happened
        let fault = Fault::from_tag(tag).unwrap_or(Fault::ExecFailed);
        Some((fault, message.to_string()))
      }
      None => Some((Fault::ExecFailed, text)),
    }
  }
}

impl Drop for FaultReadPipe {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}

impl FaultWritePipe {
  pub fn write<S: Into<String>>(&self, text: S) -> Result<usize, JudgeBoxError> {
    let text: String = text.into();
    let mut bytes = text.into_bytes();
    bytes.push(0);
    let size = unistd::write(self.0, &bytes)?;
    Ok(size)
  }
}

impl Drop for FaultWritePipe {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}
