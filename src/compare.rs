//! Turns raw outcomes into per-tool summaries and cross-tool ratios.
//!
//! Ratios are only reported for complete runs: a tool whose operations did
//! not all succeed has no scenario-level speedup or throughput. Per-package
//! ratios apply the same rule to each single operation.

use serde::Serialize;

use crate::{
  exec::Outcome,
  scenario::ScenarioKind,
  stats::{Participation, ScenarioResult, ToolRun},
};

/// Derived statistics over one tool's outcomes in one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
  pub count: usize,
  pub successes: usize,
  pub total_secs: f64,
  /// `None` when there were no operations.
  pub average_secs: Option<f64>,
  /// `None` when there were no operations.
  pub success_rate: Option<f64>,
}

impl Summary {
  pub fn of(outcomes: &[Outcome]) -> Self {
    let count = outcomes.len();
    let successes = outcomes.iter().filter(|o| o.success()).count();
    let total_secs = outcomes.iter().map(Outcome::secs).sum::<f64>();

    let (average_secs, success_rate) = if count == 0 {
      (None, None)
    } else {
      (Some(total_secs / count as f64), Some(successes as f64 / count as f64))
    };

    Self {
      count,
      successes,
      total_secs,
      average_secs,
      success_rate,
    }
  }

  /// At least one operation, and every one of them succeeded.
  pub fn complete(&self) -> bool {
    self.count > 0 && self.successes == self.count
  }
}

/// `baseline / other`, defined only when both are strictly positive.
pub fn ratio(baseline_secs: f64, other_secs: f64) -> Option<f64> {
  let defined = baseline_secs > 0.0 && other_secs > 0.0 && baseline_secs.is_finite() && other_secs.is_finite();

  defined.then(|| baseline_secs / other_secs)
}

/// How many times faster `other` was than `baseline` in total.
pub fn speedup(baseline: &Summary, other: &Summary) -> Option<f64> {
  if !baseline.complete() || !other.complete() {
    return None;
  }

  ratio(baseline.total_secs, other.total_secs)
}

/// Packages installed per second.
pub fn throughput(summary: &Summary, packages: usize) -> Option<f64> {
  if !summary.complete() || packages == 0 || summary.total_secs <= 0.0 {
    return None;
  }

  Some(packages as f64 / summary.total_secs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Availability {
  Ran,
  Unavailable,
  SetupFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolComparison {
  pub tool: String,
  pub availability: Availability,
  /// The failed environment creation, when that is why nothing ran.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub setup: Option<Outcome>,
  pub summary: Summary,
  /// Relative to the baseline tool.
  pub speedup: Option<f64>,
  pub throughput: Option<f64>,
  pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageTime {
  pub tool: String,
  pub secs: Option<f64>,
  pub success: bool,
  pub speedup: Option<f64>,
}

/// One row of the per-package breakdown, tools in run order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageComparison {
  pub package: String,
  pub times: Vec<PackageTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioComparison {
  pub kind: ScenarioKind,
  pub packages: Vec<String>,
  pub tools: Vec<ToolComparison>,
  /// Only filled in for individual installation.
  pub per_package: Vec<PackageComparison>,
}

impl ScenarioComparison {
  pub fn tool(&self, name: &str) -> Option<&ToolComparison> {
    self.tools.iter().find(|t| t.tool == name)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
  pub baseline: String,
  pub scenarios: Vec<ScenarioComparison>,
}

impl ComparisonReport {
  #[cfg(test)]
  pub fn scenario(&self, kind: ScenarioKind) -> Option<&ScenarioComparison> {
    self.scenarios.iter().find(|s| s.kind == kind)
  }

  /// Every tool that shows up in any scenario, first appearance first.
  pub fn tools(&self) -> Vec<&str> {
    let mut tools: Vec<&str> = Vec::new();
    for tool in self.scenarios.iter().flat_map(|s| &s.tools) {
      if !tools.contains(&tool.tool.as_str()) {
        tools.push(&tool.tool);
      }
    }

    tools
  }
}

pub fn aggregate(results: &[ScenarioResult], baseline: &str) -> ComparisonReport {
  ComparisonReport {
    baseline: baseline.to_string(),
    scenarios: results.iter().map(|r| compare_scenario(r, baseline)).collect(),
  }
}

fn compare_scenario(result: &ScenarioResult, baseline: &str) -> ScenarioComparison {
  let baseline_run = result.run(baseline);
  let baseline_summary = baseline_run.map(|run| Summary::of(run.measured()));

  let tools = result
    .runs
    .iter()
    .map(|run| {
      let summary = Summary::of(run.measured());
      let (availability, setup) = match &run.participation {
        Participation::Ran => (Availability::Ran, None),
        Participation::Unavailable => (Availability::Unavailable, None),
        Participation::SetupFailed(setup) => (Availability::SetupFailed, Some(setup.clone())),
      };

      ToolComparison {
        tool: run.tool.clone(),
        availability,
        setup,
        summary,
        speedup: baseline_summary.and_then(|b| speedup(&b, &summary)),
        throughput: match result.kind {
          ScenarioKind::EnvCreate => None,
          _ => throughput(&summary, result.packages.len()),
        },
        outcomes: run.outcomes.clone(),
      }
    })
    .collect();

  let per_package = if result.kind == ScenarioKind::Individual {
    breakdown(result, baseline_run)
  } else {
    Vec::new()
  };

  ScenarioComparison {
    kind: result.kind,
    packages: result.packages.clone(),
    tools,
    per_package,
  }
}

fn breakdown(result: &ScenarioResult, baseline: Option<&ToolRun>) -> Vec<PackageComparison> {
  result
    .packages
    .iter()
    .enumerate()
    .map(|(i, package)| {
      let baseline = baseline.and_then(|run| run.measured().get(i));

      let times = result
        .runs
        .iter()
        .map(|run| {
          let outcome = run.measured().get(i);
          let speedup = match (baseline, outcome) {
            (Some(b), Some(o)) if b.success() && o.success() => ratio(b.secs(), o.secs()),
            _ => None,
          };

          PackageTime {
            tool: run.tool.clone(),
            secs: outcome.map(Outcome::secs),
            success: outcome.is_some_and(Outcome::success),
            speedup,
          }
        })
        .collect();

      PackageComparison {
        package: package.clone(),
        times,
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::exec::Status;

  fn outcome(secs: f64, success: bool) -> Outcome {
    Outcome {
      description: "op".to_string(),
      duration: Duration::from_secs_f64(secs),
      status: if success {
        Status::Success
      } else {
        Status::Failed { code: Some(1) }
      },
      stdout: String::new(),
      stderr: String::new(),
    }
  }

  fn ok(secs: &[f64]) -> Vec<Outcome> {
    secs.iter().map(|&s| outcome(s, true)).collect()
  }

  fn packages(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("pkg{i}")).collect()
  }

  #[test]
  fn totals_are_additive() {
    let outcomes = ok(&[0.25, 1.5, 3.0, 0.125]);
    let summary = Summary::of(&outcomes);

    assert_eq!(summary.total_secs, outcomes.iter().map(Outcome::secs).sum::<f64>());
    assert_eq!(summary.total_secs, 4.875);
    assert_eq!(summary.count, 4);
  }

  #[test]
  fn empty_summary_has_no_data() {
    let summary = Summary::of(&[]);

    assert_eq!(summary.total_secs, 0.0);
    assert_eq!(summary.average_secs, None);
    assert_eq!(summary.success_rate, None);
    assert!(!summary.complete());
  }

  #[test]
  fn success_rate_counts_failures() {
    let summary = Summary::of(&[outcome(1.0, true), outcome(1.0, false), outcome(2.0, true), outcome(0.0, false)]);

    assert_eq!(summary.success_rate, Some(0.5));
    assert_eq!(summary.average_secs, Some(1.0));
  }

  #[test]
  fn speedup_of_twice_as_slow_baseline() {
    let results = [ScenarioResult {
      kind: ScenarioKind::Individual,
      packages: packages(3),
      runs: vec![ToolRun::ran("x", ok(&[1.0, 2.0, 3.0])), ToolRun::ran("y", ok(&[2.0, 4.0, 6.0]))],
    }];

    let report = aggregate(&results, "x");
    let scenario = report.scenario(ScenarioKind::Individual).unwrap();
    let x = scenario.tool("x").unwrap();
    let y = scenario.tool("y").unwrap();

    assert_eq!(x.summary.total_secs, 6.0);
    assert_eq!(y.summary.total_secs, 12.0);
    assert_eq!(speedup(&y.summary, &x.summary), Some(2.0));
    assert_eq!(y.speedup, Some(0.5));

    let report = aggregate(&results, "y");
    let x = report.scenario(ScenarioKind::Individual).unwrap().tool("x").unwrap();
    assert_eq!(x.speedup, Some(2.0));
  }

  #[test]
  fn speedup_is_undefined_for_zero_time() {
    let zero = Summary::of(&ok(&[0.0]));
    let some = Summary::of(&ok(&[1.0]));

    assert_eq!(speedup(&zero, &some), None);
    assert_eq!(speedup(&some, &zero), None);
    assert_eq!(ratio(1.0, 0.0), None);
    assert_eq!(ratio(0.0, 0.0), None);
  }

  #[test]
  fn speedup_is_undefined_for_incomplete_runs() {
    let partial = Summary::of(&[outcome(1.0, true), outcome(0.5, false)]);
    let full = Summary::of(&ok(&[3.0]));

    assert_eq!(speedup(&full, &partial), None);
    assert_eq!(speedup(&partial, &full), None);
  }

  #[test]
  fn bulk_throughput() {
    let results = [ScenarioResult {
      kind: ScenarioKind::Bulk,
      packages: packages(8),
      runs: vec![ToolRun::ran("pip", ok(&[4.0]))],
    }];

    let report = aggregate(&results, "pip");
    let pip = report.scenario(ScenarioKind::Bulk).unwrap().tool("pip").unwrap();

    assert_eq!(pip.throughput, Some(2.0));
    assert_eq!(throughput(&Summary::of(&[outcome(4.0, false)]), 8), None);
  }

  #[test]
  fn unavailable_and_setup_failed_tools_have_no_data() {
    let results = [ScenarioResult {
      kind: ScenarioKind::Individual,
      packages: packages(2),
      runs: vec![
        ToolRun::ran("pip", ok(&[1.0, 1.0])),
        ToolRun::unavailable("uv"),
        ToolRun::setup_failed("mint", outcome(0.5, false)),
      ],
    }];

    let report = aggregate(&results, "pip");
    let scenario = &report.scenarios[0];

    let uv = scenario.tool("uv").unwrap();
    assert_eq!(uv.availability, Availability::Unavailable);
    assert_eq!(uv.summary.count, 0);
    assert_eq!(uv.speedup, None);

    let mint = scenario.tool("mint").unwrap();
    assert_eq!(mint.availability, Availability::SetupFailed);
    assert!(mint.setup.is_some());
    assert_eq!(mint.summary.average_secs, None);

    assert!(scenario.per_package.iter().all(|row| row.times[1].secs.is_none()));
  }

  #[test]
  fn per_package_keeps_order_and_skips_failures() {
    let results = [ScenarioResult {
      kind: ScenarioKind::Individual,
      packages: packages(3),
      runs: vec![
        ToolRun::ran("pip", ok(&[2.0, 3.0, 4.0])),
        ToolRun::ran("uv", vec![outcome(0.5, true), outcome(1.0, false), outcome(0.25, true)]),
      ],
    }];

    let report = aggregate(&results, "pip");
    let rows = &report.scenarios[0].per_package;

    assert_eq!(rows.iter().map(|r| r.package.as_str()).collect::<Vec<_>>(), ["pkg0", "pkg1", "pkg2"]);
    assert_eq!(rows[0].times[1].speedup, Some(4.0));
    assert_eq!(rows[1].times[1].speedup, None);
    assert_eq!(rows[1].times[1].secs, Some(1.0));
    assert_eq!(rows[2].times[1].speedup, Some(16.0));

    // one failed package leaves the scenario-level ratio undefined
    assert_eq!(report.scenarios[0].tool("uv").unwrap().speedup, None);
  }

  #[test]
  fn missing_baseline_means_no_ratios() {
    let results = [ScenarioResult {
      kind: ScenarioKind::EnvCreate,
      packages: Vec::new(),
      runs: vec![ToolRun::ran("uv", ok(&[0.1]))],
    }];

    let report = aggregate(&results, "pip");

    assert_eq!(report.scenarios[0].tools[0].speedup, None);
    assert_eq!(report.scenarios[0].tools[0].throughput, None);
    assert_eq!(report.tools(), ["uv"]);
  }
}
