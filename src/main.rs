use std::env;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use flexi_logger::{DeferredNow, Duplicate, FileSpec, Logger};
use log::{info, Record};

use judgebox::{run, JudgeBoxError, JudgeBoxExit, RunConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// CPU time limit (unit: ms)
  #[arg(short = 't', long, default_value_t = 1000)]
  time: u64,

  /// Wall clock limit (unit: ms), unlimited when absent
  #[arg(long)]
  real_time: Option<u64>,

  /// Memory limit (unit: bytes)
  #[arg(short = 'm', long, default_value_t = 256 * 1024 * 1024)]
  memory: u64,

  /// Measure peak memory instead of enforcing a hard ceiling
  #[arg(long, default_value_t = false)]
  memory_check_only: bool,

  /// Stack size limit (unit: bytes), unlimited when absent
  #[arg(long)]
  stack: Option<u64>,

  /// Max number of processes, unlimited when absent
  #[arg(long)]
  process: Option<u64>,

  /// Output size limit (unit: bytes), unlimited when absent
  #[arg(long)]
  output_size: Option<u64>,

  #[arg(long)]
  stdin: Option<String>,

  #[arg(long)]
  stdout: Option<String>,

  #[arg(long)]
  stderr: Option<String>,

  /// Audit log file
  #[arg(long)]
  log: Option<PathBuf>,

  /// Name of the syscall filter policy, no filtering when absent
  #[arg(long)]
  policy: Option<String>,

  /// User to run the program
  #[arg(long)]
  uid: Option<u32>,

  /// Group to run the program
  #[arg(long)]
  gid: Option<u32>,

  /// Pass environment variables, KEY=VALUE or KEY
  #[arg(short = 'e', long = "env")]
  env: Vec<String>,

  /// Run the program with the current user
  #[arg(long, default_value_t = false)]
  current_user: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  #[command(about = "Run user program")]
  Run {
    #[arg(help = "Program")]
    program: String,

    #[arg(help = "Arguments")]
    arguments: Vec<String>,
  },
}

/// A logline-formatter that produces log lines like <br>
/// ```[datetime: INFO] Start supervising child process```
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

fn setup_logger(log: &Option<PathBuf>) -> Result<(), JudgeBoxError> {
  let spec = match log {
    Some(path) => {
      let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
      let basename = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("judgebox");
      FileSpec::default()
        .directory(directory)
        .basename(basename)
        .suppress_timestamp()
    }
    None => FileSpec::default()
      .directory(env::var("LOG_DIR").unwrap_or("./logs/".into()))
      .basename("judgebox")
      .discriminant(format!("{}", chrono::offset::Local::now().format("%Y-%m-%d")))
      .suppress_timestamp(),
  };

  Logger::try_with_str("judgebox=info")?
    .log_to_file(spec)
    .append()
    .duplicate_to_stderr(Duplicate::Warn)
    .format_for_files(default_format)
    .start()?;

  Ok(())
}

fn execute(cli: Cli) -> Result<(), JudgeBoxError> {
  setup_logger(&cli.log)?;

  info!("Start running judgebox");

  let (program, arguments) = match cli.command {
    Commands::Run { program, arguments } => (program, arguments),
  };

  let mut builder = RunConfig::new(program, arguments)
    .cpu_time_limit(cli.time)
    .set_real_time_limit(cli.real_time)
    .memory_limit(cli.memory)
    .memory_check_only(cli.memory_check_only)
    .set_stack_limit(cli.stack)
    .set_process_limit(cli.process)
    .set_output_limit(cli.output_size)
    .set_stdin(cli.stdin)
    .set_stdout(cli.stdout)
    .set_stderr(cli.stderr)
    .set_log_path(cli.log.as_ref().map(|path| path.to_string_lossy().to_string()))
    .set_policy(cli.policy)
    .parse_env_list(cli.env)?;

  if cli.current_user {
    builder = builder.current_user();
  }
  if let Some(uid) = cli.uid {
    builder = builder.uid(uid);
  }
  if let Some(gid) = cli.gid {
    builder = builder.gid(gid);
  }

  let config = builder.build();
  let result = run(&config);
  result.report();

  info!("Running judgebox finished");

  Ok(())
}

fn main() -> JudgeBoxExit {
  let cli = Cli::parse();
  match execute(cli) {
    Ok(_) => JudgeBoxExit::Ok,
    Err(err) => JudgeBoxExit::Err(err),
  }
}
