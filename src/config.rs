use std::{
  collections::BTreeSet,
  fs,
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{scenario::ScenarioKind, tool::ToolSpec};

/// Everything that determines what a run does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  /// Tool every other tool is compared against.
  pub baseline: String,
  pub scenarios: Vec<ScenarioKind>,
  /// Installed one per invocation in the individual scenario.
  pub packages: Vec<String>,
  /// Installed with a single invocation in the bulk scenario.
  pub bulk_packages: Vec<String>,
  /// Speedups at or above these get a banner in the report.
  pub banner_thresholds: Vec<f64>,
  /// Where targets are created. A temporary directory when unset.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub work_dir: Option<PathBuf>,
  pub timeouts: Timeouts,
  pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
  /// Environment creation and package installs.
  pub install_secs: u64,
  /// Availability probes.
  pub quick_secs: u64,
}

impl Default for Timeouts {
  fn default() -> Self {
    Self {
      install_secs: 300,
      quick_secs: 120,
    }
  }
}

impl Timeouts {
  pub fn install(&self) -> Duration {
    Duration::from_secs(self.install_secs)
  }

  pub fn quick(&self) -> Duration {
    Duration::from_secs(self.quick_secs)
  }
}

fn strings(items: &[&str]) -> Vec<String> {
  items.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
  fn default() -> Self {
    Self {
      baseline: "pip".to_string(),
      scenarios: ScenarioKind::ALL.to_vec(),
      packages: strings(&[
        "requests==2.31.0",
        "click==8.1.7",
        "colorama==0.4.6",
        "tqdm==4.66.1",
        "packaging==23.2",
      ]),
      bulk_packages: strings(&[
        "requests",
        "click",
        "colorama",
        "tqdm",
        "packaging",
        "urllib3",
        "certifi",
        "idna",
      ]),
      banner_thresholds: vec![2.0, 5.0, 10.0],
      work_dir: None,
      timeouts: Timeouts::default(),
      tools: ToolSpec::builtin(),
    }
  }
}

impl Config {
  pub fn load(path: &Path) -> Result<Self> {
    let content = fs::read_to_string(path).with_context(|| format!("read {path:?}"))?;

    toml::from_str(&content).with_context(|| format!("parse {path:?}"))
  }

  pub fn to_toml(&self) -> Result<String> {
    toml::to_string_pretty(self).context("serialize config")
  }

  /// Keeps only the named tools, in their configured order. The baseline is
  /// always kept.
  pub fn retain_tools(&mut self, names: &[String]) -> Result<()> {
    if names.is_empty() {
      return Ok(());
    }

    if let Some(unknown) = names.iter().find(|n| !self.tools.iter().any(|t| &t.name == *n)) {
      anyhow::bail!("unknown tool {unknown:?}");
    }

    let baseline = &self.baseline;
    self.tools.retain(|t| &t.name == baseline || names.contains(&t.name));

    Ok(())
  }

  pub fn validate(&self) -> Result<()> {
    if self.tools.is_empty() {
      anyhow::bail!("no tools configured");
    }

    let mut names = BTreeSet::new();
    for tool in &self.tools {
      let name = &tool.name;
      let path_safe = !name.is_empty()
        && name != "."
        && name != ".."
        && name.chars().all(|c| c.is_ascii_alphanumeric() || "-_.".contains(c));
      if !path_safe {
        anyhow::bail!("tool name {name:?} must be non-empty and only use [A-Za-z0-9_.-]");
      }

      if !names.insert(name.as_str()) {
        anyhow::bail!("tool {name:?} is configured twice");
      }

      if let Some(probe) = &tool.probe {
        probe.check().with_context(|| format!("{name} probe"))?;

        // probes run before any target exists
        if let Some(placeholder) = ["{target}", "{venv_python}", "{packages}"]
          .into_iter()
          .find(|p| probe.mentions(p))
        {
          anyhow::bail!("{name} probe command cannot use {placeholder}");
        }
      }

      tool.create.check().with_context(|| format!("{name} create"))?;
      tool.install.check().with_context(|| format!("{name} install"))?;

      if !tool.create.mentions("{target}") {
        anyhow::bail!("{name} create command must mention {{target}}");
      }
    }

    if !names.contains(self.baseline.as_str()) {
      anyhow::bail!("baseline {:?} is not a configured tool", self.baseline);
    }

    if self.scenarios.is_empty() {
      anyhow::bail!("no scenarios selected");
    }

    if self.scenarios.contains(&ScenarioKind::Individual) && self.packages.is_empty() {
      anyhow::bail!("individual scenario needs at least one package");
    }

    if self.scenarios.contains(&ScenarioKind::Bulk) && self.bulk_packages.is_empty() {
      anyhow::bail!("bulk scenario needs at least one package");
    }

    if self.timeouts.install_secs == 0 || self.timeouts.quick_secs == 0 {
      anyhow::bail!("timeouts must be at least one second");
    }

    if let Some(bad) = self.banner_thresholds.iter().find(|t| !(t.is_finite() && **t > 0.0)) {
      anyhow::bail!("banner threshold {bad} must be positive");
    }

    Ok(())
  }
}
