use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::info;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::error::JudgeBoxError;

/// Kills the child once the wall clock deadline passes, no matter how little
/// CPU time it has consumed. Disarmed when the child exits first; a kill
/// aimed at an already reaped child fails with ESRCH and is ignored.
pub(crate) struct Watchdog {
  cancel: Sender<()>,
  fired: Arc<AtomicBool>,
  handle: JoinHandle<()>,
}

impl Watchdog {
  pub fn spawn(child: Pid, real_time_limit: u64) -> Result<Self, JudgeBoxError> {
    let (cancel, deadline) = mpsc::channel();
    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);

    let handle = thread::Builder::new()
      .name("watchdog".to_string())
      .spawn(move || {
        if let Err(RecvTimeoutError::Timeout) =
          deadline.recv_timeout(Duration::from_millis(real_time_limit))
        {
          flag.store(true, Ordering::SeqCst);
          info!("Watchdog fired after {} ms, killing child #{}.", real_time_limit, child);
          let _ = kill(child, Signal::SIGKILL);
        }
      })
      .map_err(|err| JudgeBoxError::watchdog(err.to_string()))?;

    Ok(Watchdog {
      cancel,
      fired,
      handle,
    })
  }

  /// Stop the timer and report whether it already performed the kill
  pub fn disarm(self) -> bool {
    let _ = self.cancel.send(());
    let _ = self.handle.join();
    self.fired.load(Ordering::SeqCst)
  }
}
