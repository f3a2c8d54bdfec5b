//! Code executor: runs submitted source against test-case inputs in a local sandbox.
//!
//! Every `run_cases` call gets its own scratch directory (unique random name) holding the
//! source file; it is removed when the call returns, whatever the outcome. Each case spawns
//! a fresh interpreter process with a cleared environment, the case input on stdin, capped
//! output capture, and a hard wall-clock timeout.
//!
//! The interpreter leads its own process group under rlimits (address space, process count,
//! CPU seconds). Once it exits or times out the whole group is killed, so nothing it forked
//! outlives the case or holds its output pipes open.
//!
//! Failures never propagate: a crash, a timeout or a missing interpreter all become a
//! `Runtime Error: ...` marker used as the case's actual output.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::resource::{getrlimit, setrlimit, Resource};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, error, instrument, warn};

use crate::config::ExecutorSettings;
use crate::domain::TestCase;
use crate::util::trunc_for_log;

pub const UNSUPPORTED_LANGUAGE: &str = "Language not supported in local runner";
pub const RUNTIME_ERROR_PREFIX: &str = "Runtime Error: ";

/// How long to wait for output pipes to close after the process group is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Languages the local runner accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Language {
  JavaScript,
  Python,
}

impl Language {
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "javascript" | "js" | "node" => Some(Language::JavaScript),
      "python" | "python3" | "py" => Some(Language::Python),
      _ => None,
    }
  }

  fn source_file(self) -> &'static str {
    match self {
      Language::JavaScript => "submission.js",
      Language::Python => "submission.py",
    }
  }

  fn interpreter(self, settings: &ExecutorSettings) -> &str {
    match self {
      Language::JavaScript => &settings.node_bin,
      Language::Python => &settings.python_bin,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
  Completed,
  RuntimeError,
  TimedOut,
  Unsupported,
}

/// Result of running the submission against one test-case input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionOutcome {
  /// Trimmed stdout, or a marker string for anything but `Completed`.
  pub output: String,
  pub kind: OutcomeKind,
  pub elapsed_ms: u64,
}

impl ExecutionOutcome {
  pub fn unsupported() -> Self {
    Self { output: UNSUPPORTED_LANGUAGE.into(), kind: OutcomeKind::Unsupported, elapsed_ms: 0 }
  }

  pub fn runtime_error(msg: impl AsRef<str>, elapsed_ms: u64) -> Self {
    Self {
      output: format!("{}{}", RUNTIME_ERROR_PREFIX, msg.as_ref()),
      kind: OutcomeKind::RuntimeError,
      elapsed_ms,
    }
  }

  fn timed_out(timeout_ms: u64) -> Self {
    Self {
      output: format!("{}time limit exceeded ({} ms)", RUNTIME_ERROR_PREFIX, timeout_ms),
      kind: OutcomeKind::TimedOut,
      elapsed_ms: timeout_ms,
    }
  }
}

/// Runs one submission against an ordered list of test cases.
/// Implementations return exactly one outcome per case, in input order.
#[async_trait]
pub trait CodeRunner: Send + Sync {
  async fn run_cases(&self, language: &str, code: &str, cases: &[TestCase]) -> Vec<ExecutionOutcome>;
}

/// Per-evaluation scratch directory holding the source file. Removed on drop.
pub struct Scratch {
  dir: TempDir,
  source: PathBuf,
}

impl Scratch {
  pub async fn create(language: Language, code: &str) -> std::io::Result<Self> {
    let dir = tempfile::Builder::new().prefix("devforces-run-").tempdir()?;
    let source = dir.path().join(language.source_file());
    tokio::fs::write(&source, code).await?;
    Ok(Self { dir, source })
  }

  pub fn path(&self) -> &Path {
    self.dir.path()
  }
}

/// Kernel limits applied to the interpreter between fork and exec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ResourceLimits {
  address_space: Option<u64>,
  processes: Option<u64>,
  cpu_secs: u64,
}

impl ResourceLimits {
  fn from_settings(settings: &ExecutorSettings) -> Self {
    Self {
      address_space: (settings.memory_limit_mb > 0).then(|| settings.memory_limit_mb * 1024 * 1024),
      processes: (settings.max_processes > 0).then_some(settings.max_processes),
      // Wall clock fires first; the CPU cap catches anything that escapes it.
      cpu_secs: settings.timeout_ms.div_ceil(1000) + 1,
    }
  }

  /// Runs in the forked child: only async-signal-safe calls.
  fn apply(self) -> std::io::Result<()> {
    if let Some(bytes) = self.address_space {
      lower_limit(Resource::RLIMIT_AS, bytes, bytes)?;
    }
    if let Some(n) = self.processes {
      lower_limit(Resource::RLIMIT_NPROC, n, n)?;
    }
    lower_limit(Resource::RLIMIT_CPU, self.cpu_secs, self.cpu_secs + 1)?;
    Ok(())
  }
}

/// Unprivileged processes cannot raise a hard limit, so never ask above the inherited one.
fn lower_limit(resource: Resource, soft: u64, hard: u64) -> nix::Result<()> {
  let (_, inherited) = getrlimit(resource)?;
  setrlimit(resource, soft.min(inherited), hard.min(inherited))
}

/// SIGKILL every process in the group led by `pgid`. An already empty group is fine.
fn kill_group(pgid: Option<u32>) {
  let Some(pgid) = pgid else { return };
  match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
    Ok(()) | Err(Errno::ESRCH) => {}
    Err(e) => warn!(target: "judge", pgid, error = %e, "Failed to kill process group"),
  }
}

#[derive(Clone)]
pub struct LocalExecutor {
  settings: ExecutorSettings,
}

impl LocalExecutor {
  pub fn new(settings: ExecutorSettings) -> Self {
    Self { settings }
  }

  #[instrument(level = "debug", skip(self, scratch, input), fields(input_len = input.len()))]
  async fn run_one(&self, language: Language, scratch: &Scratch, input: &str) -> ExecutionOutcome {
    let timeout_ms = self.settings.timeout_ms;
    let started = Instant::now();

    let mut cmd = Command::new(language.interpreter(&self.settings));
    cmd.arg(&scratch.source)
      .current_dir(scratch.path())
      .env_clear()
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .process_group(0)
      .kill_on_drop(true);
    if let Some(path) = std::env::var_os("PATH") {
      cmd.env("PATH", path);
    }
    let limits = ResourceLimits::from_settings(&self.settings);
    // SAFETY: the hook only calls setrlimit, which is async-signal-safe.
    unsafe {
      cmd.pre_exec(move || limits.apply());
    }

    let mut child = match cmd.spawn() {
      Ok(c) => c,
      Err(e) => {
        error!(target: "judge", ?language, error = %e, "Failed to spawn interpreter");
        return ExecutionOutcome::runtime_error(format!("failed to start interpreter: {e}"), 0);
      }
    };
    // process_group(0) makes the child's pid its group id.
    let pgid = child.id();

    // Feed stdin from a separate task so a program that never reads cannot wedge us.
    if let Some(mut stdin) = child.stdin.take() {
      let input = input.to_owned();
      tokio::spawn(async move {
        let _ = stdin.write_all(input.as_bytes()).await;
      });
    }
    let cap = self.settings.max_output_bytes;
    let stdout = tokio::spawn(read_capped(child.stdout.take(), cap));
    let stderr = tokio::spawn(read_capped(child.stderr.take(), cap));
    let readers = [stdout.abort_handle(), stderr.abort_handle()];

    let waited = tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait()).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    kill_group(pgid);

    let status = match waited {
      Ok(Ok(status)) => status,
      Ok(Err(e)) => {
        readers.iter().for_each(|r| r.abort());
        return ExecutionOutcome::runtime_error(format!("failed to wait for process: {e}"), elapsed_ms);
      }
      Err(_) => {
        if let Err(e) = child.start_kill() {
          warn!(target: "judge", error = %e, "Failed to kill timed-out process");
        }
        readers.iter().for_each(|r| r.abort());
        warn!(target: "judge", timeout_ms, "Case timed out; process group killed");
        return ExecutionOutcome::timed_out(timeout_ms);
      }
    };

    let drained = tokio::time::timeout(DRAIN_GRACE, async { (stdout.await, stderr.await) }).await;
    let (out, err) = match drained {
      Ok((Ok(out), Ok(err))) => (out, err),
      _ => {
        readers.iter().for_each(|r| r.abort());
        warn!(target: "judge", elapsed_ms, "Output pipes stayed open after the process exited");
        return ExecutionOutcome::runtime_error("output left open by a detached process", elapsed_ms);
      }
    };

    if status.success() {
      debug!(target: "judge", elapsed_ms, out_len = out.len(), "Case completed");
      ExecutionOutcome {
        output: String::from_utf8_lossy(&out).trim().to_string(),
        kind: OutcomeKind::Completed,
        elapsed_ms,
      }
    } else {
      let stderr = String::from_utf8_lossy(&err);
      let msg = summarize_stderr(&stderr).unwrap_or_else(|| format!("process exited with {status}"));
      debug!(target: "judge", elapsed_ms, %status, "Case failed at runtime");
      ExecutionOutcome::runtime_error(msg, elapsed_ms)
    }
  }
}

#[async_trait]
impl CodeRunner for LocalExecutor {
  #[instrument(level = "info", skip(self, code, cases), fields(%language, code_len = code.len(), cases = cases.len()))]
  async fn run_cases(&self, language: &str, code: &str, cases: &[TestCase]) -> Vec<ExecutionOutcome> {
    let Some(lang) = Language::parse(language) else {
      warn!(target: "judge", %language, "Unsupported language; skipping execution");
      return cases.iter().map(|_| ExecutionOutcome::unsupported()).collect();
    };

    let scratch = match Scratch::create(lang, code).await {
      Ok(s) => s,
      Err(e) => {
        error!(target: "judge", error = %e, "Failed to prepare scratch directory");
        return cases
          .iter()
          .map(|_| ExecutionOutcome::runtime_error(format!("failed to prepare sandbox: {e}"), 0))
          .collect();
      }
    };

    let mut outcomes = Vec::with_capacity(cases.len());
    for tc in cases {
      outcomes.push(self.run_one(lang, &scratch, &tc.input).await);
    }
    outcomes
  }
}

/// Read at most `cap` bytes, then keep draining so the child never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize) -> Vec<u8> {
  let Some(mut reader) = reader else { return Vec::new() };
  let mut buf = Vec::new();
  let _ = (&mut reader).take(cap as u64).read_to_end(&mut buf).await;
  let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
  buf
}

/// Pick the most telling stderr line: the first naming an error, else the last non-empty one.
fn summarize_stderr(stderr: &str) -> Option<String> {
  let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
  let line = lines
    .iter()
    .find(|l| l.contains("Error") && !l.starts_with("Traceback"))
    .or_else(|| lines.last())?;
  Some(trunc_for_log(line, 200))
}
