use std::{
  fmt,
  process::Command,
  time::{Duration, Instant},
};

use anyhow::Result;
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::ext::{ChildExt, CommandExt};

/// Stands in for stderr when an operation was killed for running too long.
pub const TIMEOUT_MARKER: &str = "Timeout";

/// Stands in for stderr when a tool was never run because the host lacks it.
pub const UNAVAILABLE_MARKER: &str = "unavailable";

/// One timed unit of work: a command line with a description and a budget.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
  description: String,
  argv: Vec<String>,
  timeout: Duration,
}

impl Operation {
  pub fn new(description: impl Into<String>, argv: Vec<String>, timeout: Duration) -> Result<Self> {
    if argv.is_empty() {
      anyhow::bail!("empty command line");
    }

    Ok(Self {
      description: description.into(),
      argv,
      timeout,
    })
  }

  pub fn command_line(&self) -> String {
    self.argv.join(" ")
  }
}

/// How an operation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Status {
  Success,
  /// Ran to completion with a non-zero exit. `code` is `None` when the process
  /// was terminated by a signal, or when waiting on it failed.
  Failed { code: Option<i32> },
  TimedOut,
  /// The executable could not be started at all.
  LaunchFailed { reason: String },
  /// Never attempted: the tool is missing from the host.
  Unavailable,
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Status::Success => write!(f, "ok"),
      Status::Failed { code: Some(code) } => write!(f, "exit {code}"),
      Status::Failed { code: None } => write!(f, "failed"),
      Status::TimedOut => write!(f, "timeout"),
      Status::LaunchFailed { .. } => write!(f, "launch failed"),
      Status::Unavailable => write!(f, "unavailable"),
    }
  }
}

/// The recorded result of executing one [`Operation`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
  pub description: String,
  #[serde(rename = "duration_secs", serialize_with = "as_secs")]
  pub duration: Duration,
  pub status: Status,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub stdout: String,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub stderr: String,
}

fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_f64(duration.as_secs_f64())
}

impl Outcome {
  pub fn success(&self) -> bool {
    self.status == Status::Success
  }

  pub fn secs(&self) -> f64 {
    self.duration.as_secs_f64()
  }

  /// Why the operation failed, if it did.
  pub fn detail(&self) -> Option<&str> {
    match &self.status {
      Status::Success => None,
      Status::LaunchFailed { reason } => Some(reason),
      _ => Some(self.stderr.trim()),
    }
  }

  /// Sentinel for a tool that was skipped because the host lacks it.
  pub fn unavailable(description: impl Into<String>) -> Self {
    Self {
      description: description.into(),
      duration: Duration::ZERO,
      status: Status::Unavailable,
      stdout: String::new(),
      stderr: UNAVAILABLE_MARKER.to_string(),
    }
  }

  fn launch_failed(op: &Operation, reason: String) -> Self {
    Self {
      description: op.description.clone(),
      duration: Duration::ZERO,
      status: Status::LaunchFailed { reason },
      stdout: String::new(),
      stderr: String::new(),
    }
  }

  fn timed_out(op: &Operation) -> Self {
    Self {
      description: op.description.clone(),
      duration: op.timeout,
      status: Status::TimedOut,
      stdout: String::new(),
      stderr: TIMEOUT_MARKER.to_string(),
    }
  }
}

/// Runs `op` as a child process and records how it went. Never fails: launch
/// errors, timeouts and non-zero exits all come back as an [`Outcome`].
///
/// The clock starts right before the spawn and stops as soon as the process
/// is reaped. A timed out operation is charged exactly its timeout so totals
/// stay bounded.
pub fn execute(op: &Operation) -> Outcome {
  info!("{}", op.description);
  debug!(command = %op.command_line());

  let Some((program, args)) = op.argv.split_first() else {
    return Outcome::launch_failed(op, "empty command line".to_string());
  };

  let start = Instant::now();
  let mut child = match Command::new(program).args(args).spawn_captured() {
    Ok(child) => child,
    Err(err) => {
      warn!("could not launch {program:?}: {err}");
      return Outcome::launch_failed(op, err.to_string());
    }
  };

  let drain = child.drain();

  let status = match child.wait_or_kill(op.timeout) {
    Ok(Some(status)) => status,
    Ok(None) => {
      // the killed child may have left grandchildren holding the pipes, so
      // the drain is abandoned rather than joined
      warn!("timed out after {:.2}s: {}", op.timeout.as_secs_f64(), op.description);
      return Outcome::timed_out(op);
    }
    Err(err) => {
      let duration = start.elapsed();
      warn!("lost track of {program:?}: {err:#}");
      if let Err(err) = child.kill_and_reap() {
        warn!("could not stop {program:?}: {err:#}");
      }

      return Outcome {
        description: op.description.clone(),
        duration,
        status: Status::Failed { code: None },
        stdout: String::new(),
        stderr: format!("{err:#}"),
      };
    }
  };

  let duration = start.elapsed();
  let (stdout, stderr) = drain.join();

  let status = if status.success() {
    info!("ok in {:.2}s", duration.as_secs_f64());
    Status::Success
  } else {
    warn!("{} failed ({status}): {}", op.description, stderr.trim());
    Status::Failed { code: status.code() }
  };

  debug!(%stdout, %stderr);

  Outcome {
    description: op.description.clone(),
    duration,
    status,
    stdout,
    stderr,
  }
}
