use std::{
  io::{self, Read},
  process::{Child, Command, ExitStatus, Stdio},
  thread::{self, JoinHandle},
  time::Duration,
};

use anyhow::{Context, Result};
use tracing::warn;
use wait_timeout::ChildExt as WaitExt;

/// Background readers for a child's stdout and stderr.
pub struct Drain {
  stdout: JoinHandle<String>,
  stderr: JoinHandle<String>,
}

impl Drain {
  /// Blocks until both pipes hit EOF and returns `(stdout, stderr)`.
  pub fn join(self) -> (String, String) {
    (
      self.stdout.join().unwrap_or_default(),
      self.stderr.join().unwrap_or_default(),
    )
  }
}

fn read_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
  thread::spawn(move || {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
      // a read error just truncates what we captured
      let _ = pipe.read_to_end(&mut buf);
    }

    String::from_utf8_lossy(&buf).into_owned()
  })
}

#[extend::ext]
pub impl Command {
  /// Spawns the command with stdin closed and stdout/stderr piped.
  fn spawn_captured(&mut self) -> io::Result<Child> {
    self
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
  }
}

#[extend::ext]
pub impl Child {
  /// Starts draining stdout and stderr so a chatty child never blocks on a
  /// full pipe while we wait on it.
  fn drain(&mut self) -> Drain {
    Drain {
      stdout: read_pipe(self.stdout.take()),
      stderr: read_pipe(self.stderr.take()),
    }
  }

  /// Waits for the child to exit. On timeout, kills and reaps it, returning
  /// `Ok(None)` even if the kill itself failed. An error means waiting failed
  /// and the child may still be running.
  fn wait_or_kill(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
    if let Some(status) = self.wait_timeout(timeout).context("wait")? {
      return Ok(Some(status));
    }

    if let Err(err) = self.kill_and_reap() {
      warn!("could not stop child {} after timeout: {err:#}", self.id());
    }

    Ok(None)
  }

  fn kill_and_reap(&mut self) -> Result<()> {
    self.kill().context("kill")?;
    self.wait().context("wait after kill")?;

    Ok(())
  }
}
