pub use config::{Fault, Outcome, RunConfig, RunConfigBuilder, RunResult};
pub use error::{JudgeBoxError, JudgeBoxExit};
pub use judge::run;
pub use utils::UNLIMITED;

mod config;
mod error;
mod filter;
mod judge;
mod pipe;
mod rlimit;
mod utils;
mod verdict;
mod watchdog;
