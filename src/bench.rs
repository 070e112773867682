use anyhow::{Context, Result};
use tracing::info;

use crate::{
  compare::{self, ComparisonReport},
  config::Config,
  provision::{Provisioner, TargetId},
  scenario::{Scenario, ScenarioKind},
  stats::ScenarioResult,
  tool::Tool,
};

pub struct Bench {
  config: Config,
  /// Tools resolved for this run, in configured order.
  tools: Vec<Tool>,
  /// Owns every target; dropping it removes whatever is left.
  provisioner: Provisioner,
  /// Results collected for each scenario, in run order.
  pub results: Vec<ScenarioResult>,
}

impl Bench {
  pub fn new(config: Config) -> Result<Self> {
    config.validate().context("invalid config")?;
    let provisioner = Provisioner::new(config.work_dir.as_deref()).context("Provisioner::new")?;

    Ok(Self {
      config,
      tools: Vec::new(),
      provisioner,
      results: Vec::new(),
    })
  }

  pub fn bench(&mut self) -> Result<()> {
    info!("environments go under {:?}", self.provisioner.root());
    self.clean();
    self.tools = probe(&self.config).context("probe")?;

    let result = self.run_all();
    self.provisioner.teardown_live();

    result
  }

  pub fn report(&self) -> ComparisonReport {
    compare::aggregate(&self.results, &self.config.baseline)
  }

  /// Removes anything an earlier run left at this run's target paths.
  fn clean(&self) {
    for kind in &self.config.scenarios {
      for tool in &self.config.tools {
        self.provisioner.ensure_clean(&TargetId::new(*kind, &tool.name));
      }
    }
  }

  fn run_all(&mut self) -> Result<()> {
    for kind in self.config.scenarios.clone() {
      let packages: &[String] = match kind {
        ScenarioKind::EnvCreate => &[],
        ScenarioKind::Individual => &self.config.packages,
        ScenarioKind::Bulk => &self.config.bulk_packages,
      };

      let scenario = Scenario {
        kind,
        packages,
        timeout: self.config.timeouts.install(),
      };

      let result = scenario
        .run(&self.tools, &mut self.provisioner)
        .with_context(|| format!("scenario {kind}"))?;
      self.results.push(result);
    }

    info!("all scenarios done");

    Ok(())
  }
}

/// Checks which of the configured tools are present on this host.
pub fn probe(config: &Config) -> Result<Vec<Tool>> {
  config
    .tools
    .iter()
    .map(|spec| Tool::probe(spec.clone(), config.timeouts.quick()).with_context(|| format!("probe {}", spec.name)))
    .collect()
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::tool::{Template, ToolSpec};

  fn spec(name: &str, probe: &str, install: &[&str]) -> ToolSpec {
    ToolSpec {
      name: name.to_string(),
      probe: Some(Template::new([probe])),
      create: Template::new(["mkdir", "{target}"]),
      install: Template::new(install.iter().copied()),
    }
  }

  fn config(work_dir: &std::path::Path) -> Config {
    Config {
      baseline: "slow".to_string(),
      packages: vec!["a".to_string(), "b".to_string()],
      bulk_packages: vec!["a".to_string(), "b".to_string(), "c".to_string()],
      work_dir: Some(work_dir.to_path_buf()),
      tools: vec![
        spec("slow", "true", &["sleep", "0.2"]),
        spec("fast", "true", &["true"]),
        spec("missing", "false", &["true"]),
      ],
      ..Config::default()
    }
  }

  #[test]
  fn full_run_leaves_no_targets() {
    let dir = tempfile::tempdir().unwrap();
    let mut bench = Bench::new(config(dir.path())).unwrap();

    bench.bench().unwrap();

    assert_eq!(bench.results.len(), 3);
    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().path()).collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");

    let report = bench.report();
    let individual = report.scenario(ScenarioKind::Individual).unwrap();
    assert!(individual.tool("fast").unwrap().speedup.is_some_and(|s| s > 1.0));
    assert_eq!(individual.tool("missing").unwrap().speedup, None);
    assert_eq!(individual.per_package.len(), 2);
  }

  #[test]
  fn stale_targets_are_cleaned_first() {
    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("env-create").join("fast");
    std::fs::create_dir_all(&stale).unwrap();

    let mut config = config(dir.path());
    config.scenarios = vec![ScenarioKind::EnvCreate];
    let mut bench = Bench::new(config).unwrap();
    bench.bench().unwrap();

    // `mkdir` would have failed on the stale directory
    let report = bench.report();
    let fast = report.scenarios[0].tool("fast").unwrap();
    assert!(fast.summary.complete());
  }

  #[test]
  fn invalid_config_aborts_before_anything_runs() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.baseline = "nope".to_string();

    assert!(Bench::new(config).is_err());
  }

  #[test]
  fn availability_check_needing_a_target_is_rejected_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("checked");
    let mut config = config(&dir.path().join("work"));
    config.tools[0].probe = Some(Template::new(["touch", marker.to_str().unwrap()]));
    config.tools[1].probe = Some(Template::new(["test", "-d", "{target}"]));

    assert!(Bench::new(config).is_err());
    assert!(!marker.exists());
  }
}
