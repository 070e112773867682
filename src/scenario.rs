use std::{fmt, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
  exec::{self, Operation, Outcome},
  provision::{Provisioner, TargetId},
  stats::{ScenarioResult, ToolRun},
  tool::{Params, Tool},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
  /// Create one fresh environment per tool.
  EnvCreate,
  /// Install each package with its own invocation.
  Individual,
  /// Install every package with a single invocation.
  Bulk,
}

impl ScenarioKind {
  pub const ALL: [ScenarioKind; 3] = [ScenarioKind::EnvCreate, ScenarioKind::Individual, ScenarioKind::Bulk];

  pub fn slug(self) -> &'static str {
    match self {
      ScenarioKind::EnvCreate => "env-create",
      ScenarioKind::Individual => "individual",
      ScenarioKind::Bulk => "bulk",
    }
  }

  pub fn title(self) -> &'static str {
    match self {
      ScenarioKind::EnvCreate => "environment creation",
      ScenarioKind::Individual => "individual installation",
      ScenarioKind::Bulk => "bulk installation",
    }
  }
}

impl fmt::Display for ScenarioKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.slug())
  }
}

/// Everything a scenario needs besides the tools and the provisioner.
#[derive(Debug, Clone, Copy)]
pub struct Scenario<'a> {
  pub kind: ScenarioKind,
  /// Ignored for environment creation.
  pub packages: &'a [String],
  pub timeout: Duration,
}

impl Scenario<'_> {
  /// Runs every tool through the scenario, one after the other. Tools that
  /// are not available get a sentinel outcome and nothing is launched for
  /// them. Every target the scenario created is removed before returning.
  pub fn run(&self, tools: &[Tool], provisioner: &mut Provisioner) -> Result<ScenarioResult> {
    info!("running {} scenario", self.kind.title());

    let ids: Vec<TargetId> = tools.iter().map(|t| TargetId::new(self.kind, t.name())).collect();
    let result = self.run_tools(tools, &ids, provisioner);
    provisioner.teardown_all(&ids);

    result
  }

  fn run_tools(&self, tools: &[Tool], ids: &[TargetId], provisioner: &mut Provisioner) -> Result<ScenarioResult> {
    let packages = match self.kind {
      ScenarioKind::EnvCreate => Vec::new(),
      _ => self.packages.to_vec(),
    };

    let mut runs = Vec::with_capacity(tools.len());
    for (tool, id) in tools.iter().zip(ids) {
      if !tool.available {
        warn!("skipping {}: not available", tool.name());
        runs.push(ToolRun::unavailable(tool.name()));
        continue;
      }

      let run = self
        .run_tool(tool, id, provisioner)
        .with_context(|| format!("{} {}", tool.name(), self.kind))?;
      runs.push(run);
    }

    Ok(ScenarioResult {
      kind: self.kind,
      packages,
      runs,
    })
  }

  fn run_tool(&self, tool: &Tool, id: &TargetId, provisioner: &mut Provisioner) -> Result<ToolRun> {
    let (setup, target) = provisioner.create(id, &tool.spec.create, self.timeout)?;

    if setup.success() && !target.exists() {
      warn!("{}: creation succeeded but {:?} does not exist", target.id.tool, target.path);
    }

    if self.kind == ScenarioKind::EnvCreate {
      return Ok(ToolRun::ran(tool.name(), vec![setup]));
    }

    if !setup.success() {
      warn!("{}: could not prepare environment, skipping installs", tool.name());
      return Ok(ToolRun::setup_failed(tool.name(), setup));
    }

    let install = |packages: &[String], description: String| -> Result<Outcome> {
      let argv = tool.spec.install.render(&Params {
        target: Some(&target.path),
        packages,
      })?;

      Ok(exec::execute(&Operation::new(description, argv, self.timeout)?))
    };

    let outcomes = match self.kind {
      ScenarioKind::Individual => self
        .packages
        .iter()
        .map(|package| install(std::slice::from_ref(package), format!("{} installing {package}", tool.name())))
        .collect::<Result<Vec<_>>>()?,
      _ => vec![install(
        self.packages,
        format!("{} installing {} packages at once", tool.name(), self.packages.len()),
      )?],
    };

    Ok(ToolRun::ran(tool.name(), outcomes))
  }
}
