use std::{
  error::Error,
  fmt::{Debug, Display},
  process::{ExitCode, Termination},
};

use flexi_logger::FlexiLoggerError;
use nix::{errno::Errno, libc::STDOUT_FILENO, unistd::isatty};

pub enum JudgeBoxError {
  Config(String),
  Fork(String),
  Watchdog(String),
  Filter(String),
  Privilege(String),
  Nix(Errno),
  Fs(String),
  Cli(String),
  Logger(FlexiLoggerError),
}

#[allow(unused)]
pub enum JudgeBoxExit {
  Ok,
  Err(JudgeBoxError),
}

impl JudgeBoxError {
  pub fn config<MS: Into<String>>(msg: MS) -> JudgeBoxError {
    JudgeBoxError::Config(msg.into())
  }

  pub fn fork<MS: Into<String>>(msg: MS) -> JudgeBoxError {
    JudgeBoxError::Fork(msg.into())
  }

  pub fn watchdog<MS: Into<String>>(msg: MS) -> JudgeBoxError {
    JudgeBoxError::Watchdog(msg.into())
  }

  pub fn filter<MS: Into<String>>(msg: MS) -> JudgeBoxError {
    JudgeBoxError::Filter(msg.into())
  }

  pub fn privilege<MS: Into<String>>(msg: MS) -> JudgeBoxError {
    JudgeBoxError::Privilege(msg.into())
  }

  pub fn fs<MS: Into<String>>(msg: MS) -> JudgeBoxError {
    JudgeBoxError::Fs(msg.into())
  }

  pub fn cli<MS: Into<String>>(msg: MS) -> JudgeBoxError {
    JudgeBoxError::Cli(msg.into())
  }
}

impl Debug for JudgeBoxError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    std::fmt::Display::fmt(&self, f)
  }
}

impl Display for JudgeBoxError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self {
      JudgeBoxError::Config(msg) => f.write_fmt(format_args!("JudgeBox Config Error: {}", msg)),
      JudgeBoxError::Fork(msg) => f.write_fmt(format_args!("JudgeBox Fork Error: {}", msg)),
      JudgeBoxError::Watchdog(msg) => {
        f.write_fmt(format_args!("JudgeBox Watchdog Error: {}", msg))
      }
      JudgeBoxError::Filter(msg) => f.write_fmt(format_args!("JudgeBox Filter Error: {}", msg)),
      JudgeBoxError::Privilege(msg) => {
        f.write_fmt(format_args!("JudgeBox Privilege Error: {}", msg))
      }
      JudgeBoxError::Nix(errno) => f.write_fmt(format_args!("JudgeBox Nix Error: {}", errno)),
      JudgeBoxError::Fs(msg) => f.write_fmt(format_args!("JudgeBox File System Error: {}", msg)),
      JudgeBoxError::Cli(msg) => f.write_fmt(format_args!("JudgeBox CLI Error: {}", msg)),
      JudgeBoxError::Logger(err) => f.write_fmt(format_args!("JudgeBox Logger Error: {}", err)),
    }
  }
}

impl From<Errno> for JudgeBoxError {
  fn from(errno: Errno) -> Self {
    JudgeBoxError::Nix(errno)
  }
}

impl From<std::io::Error> for JudgeBoxError {
  fn from(err: std::io::Error) -> Self {
    JudgeBoxError::Fs(err.to_string())
  }
}

impl From<FlexiLoggerError> for JudgeBoxError {
  fn from(err: FlexiLoggerError) -> Self {
    JudgeBoxError::Logger(err)
  }
}

impl Error for JudgeBoxError {}

impl Termination for JudgeBoxExit {
  fn report(self) -> ExitCode {
    match self {
      JudgeBoxExit::Ok => ExitCode::SUCCESS.report(),
      JudgeBoxExit::Err(err) => {
        let text = format!("{}", err);
        let text = match text.split_once(": ") {
          Some((prefix, message)) => {
            let is_tty = isatty(STDOUT_FILENO).unwrap_or(false);
            if is_tty {
              format!("\x1b[1m\x1b[91m{}\x1b[39m\x1b[22m  {}", prefix, message)
            } else {
              format!(
                "{{\n  \"ok\": false,\n  \"type\": \"{}\",\n  \"message\": \"{}\"\n}}",
                prefix, message
              )
            }
          }
          None => {
            format!("{}", err)
          }
        };
        eprintln!("{}", text);
        ExitCode::FAILURE.report()
      }
    }
  }
}
