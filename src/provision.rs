use std::{
  collections::BTreeSet,
  fs, io,
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::{
  exec::{self, Operation, Outcome},
  scenario::ScenarioKind,
  tool::{Params, Template},
};

/// Names a target: one per tool per scenario, so no two tools ever share an
/// environment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetId {
  pub scenario: ScenarioKind,
  pub tool: String,
}

impl TargetId {
  pub fn new(scenario: ScenarioKind, tool: impl Into<String>) -> Self {
    Self {
      scenario,
      tool: tool.into(),
    }
  }
}

/// An isolated installation environment on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
  pub id: TargetId,
  pub path: PathBuf,
}

impl Target {
  pub fn exists(&self) -> bool {
    self.path.exists()
  }
}

/// Creates and removes targets under a run-scoped root directory.
///
/// Every target handed out is remembered until it is torn down, and whatever
/// is still around when the provisioner is dropped gets removed then, so a
/// run that bails early leaves nothing behind.
pub struct Provisioner {
  root: PathBuf,
  live: BTreeSet<TargetId>,
  /// Owns the root when no work directory was given.
  _tempdir: Option<TempDir>,
}

impl Provisioner {
  pub fn new(work_dir: Option<&Path>) -> Result<Self> {
    let (root, tempdir) = match work_dir {
      Some(dir) => {
        fs::create_dir_all(dir).with_context(|| format!("create work dir {dir:?}"))?;
        let root = dir.canonicalize().with_context(|| format!("canonicalize {dir:?}"))?;
        (root, None)
      }
      None => {
        let tempdir = TempDir::with_prefix("pm-bench-").context("tempdir")?;
        (tempdir.path().to_path_buf(), Some(tempdir))
      }
    };

    debug!("targets live under {root:?}");

    Ok(Self {
      root,
      live: BTreeSet::new(),
      _tempdir: tempdir,
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn path(&self, id: &TargetId) -> PathBuf {
    self.root.join(id.scenario.slug()).join(&id.tool)
  }

  /// Removes whatever is at the target's path. Missing paths are fine; any
  /// other failure is logged and otherwise ignored.
  pub fn ensure_clean(&self, id: &TargetId) {
    remove(&self.path(id));
  }

  /// Runs a tool's own environment-creation command against a clean target
  /// path. The target counts as live even if creation failed, since a failed
  /// command can still leave files behind.
  pub fn create(&mut self, id: &TargetId, template: &Template, timeout: Duration) -> Result<(Outcome, Target)> {
    self.ensure_clean(id);

    let path = self.path(id);
    let parent = path.parent().context("target has no parent")?;
    fs::create_dir_all(parent).with_context(|| format!("create {parent:?}"))?;

    let argv = template
      .render(&Params {
        target: Some(&path),
        packages: &[],
      })
      .with_context(|| format!("render create command for {}", id.tool))?;
    let op = Operation::new(
      format!("{} creating {} environment", id.tool, id.scenario.slug()),
      argv,
      timeout,
    )?;

    self.live.insert(id.clone());
    let outcome = exec::execute(&op);

    Ok((outcome, Target { id: id.clone(), path }))
  }

  /// Removes the target, then its scenario directory once no other target is
  /// left in it.
  pub fn teardown(&mut self, id: &TargetId) {
    self.ensure_clean(id);
    self.live.remove(id);

    let path = self.path(id);
    if let Some(parent) = path.parent().filter(|p| *p != self.root) {
      // fails while other targets remain
      let _ = fs::remove_dir(parent);
    }
  }

  /// Best-effort removal of every named target.
  pub fn teardown_all<'a, I: IntoIterator<Item = &'a TargetId>>(&mut self, ids: I) {
    for id in ids {
      self.teardown(id);
    }
  }

  /// Removes every target created and not yet torn down.
  pub fn teardown_live(&mut self) {
    let live = std::mem::take(&mut self.live);
    if !live.is_empty() {
      info!("cleaning up {} environment(s)", live.len());
    }

    self.teardown_all(&live);
  }
}

impl Drop for Provisioner {
  fn drop(&mut self) {
    self.teardown_live();
  }
}

fn remove(path: &Path) {
  let result = match fs::symlink_metadata(path) {
    Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
    Ok(_) => fs::remove_file(path),
    Err(err) => Err(err),
  };

  match result {
    Ok(()) => debug!("removed {path:?}"),
    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
    Err(err) => warn!("could not clean {path:?}: {err}"),
  }
}
