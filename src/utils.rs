use std::env;
use std::ffi::CString;

use flexi_logger::DeferredNow;
use log::{error, info, Record};
use nix::libc::{gid_t, timeval, uid_t};

use crate::JudgeBoxError;

pub type TimeLimitType = u64;

pub type MemoryLimitType = u64;

pub type UidType = uid_t;

pub type GidType = gid_t;

/// Sentinel disabling a numeric limit
pub const UNLIMITED: u64 = u64::MAX;

pub(crate) fn limited(value: u64) -> bool {
  value != UNLIMITED
}

/// A logline-formatter that produces log lines like <br>
/// ```[datetime: INFO] Start supervising child process```
#[allow(unused)]
pub fn default_format(
  w: &mut dyn std::io::Write,
  now: &mut DeferredNow,
  record: &Record,
) -> Result<(), std::io::Error> {
  write!(
    w,
    "[{}: {:5}] {}",
    now.format("%Y-%m-%d %H:%M:%S"),
    record.level(),
    record.args()
  )
}

pub(crate) fn into_c_string(string: &String) -> CString {
  let string = string.as_str();
  CString::new(string).expect("Convert &str to CString should work")
}

pub(crate) fn milliseconds(val: &timeval) -> u64 {
  (val.tv_sec * 1000 + val.tv_usec / 1000) as u64
}

pub(crate) fn parse_env(text: String) -> Result<(String, String), JudgeBoxError> {
  let arr = text.split("=").collect::<Vec<&str>>();
  if arr.len() == 2 {
    let key = arr.get(0).unwrap();
    let value = arr.get(1).unwrap();
    Ok((key.to_string(), value.to_string()))
  } else if arr.len() == 1 {
    let key = arr.get(0).unwrap();
    let value = env::var(key).unwrap_or("".to_string());
    info!("Read environment variable {} = {}", key, value);
    Ok((key.to_string(), value.to_string()))
  } else {
    error!("Wrong environment variable string ({}) format", &text);
    Err(JudgeBoxError::cli("Wrong environment variable string format"))
  }
}
