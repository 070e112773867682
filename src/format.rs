use std::fmt::Write;

use anyhow::Result;

use crate::{
  compare::{Availability, ComparisonReport, ScenarioComparison, ToolComparison},
  scenario::ScenarioKind,
};

const COLUMN_WIDTH: usize = 14;
const COLUMN_PADDING: &str = "  ";
const UNDEFINED: &str = "n/a";

/// Rows of cells, each column as wide as its widest cell and never narrower
/// than `COLUMN_WIDTH`.
struct Table {
  rows: Vec<Vec<String>>,
}

impl Table {
  fn new<I: IntoIterator<Item = S>, S: Into<String>>(header: I) -> Self {
    Self {
      rows: vec![header.into_iter().map(Into::into).collect()],
    }
  }

  fn row<I: IntoIterator<Item = S>, S: Into<String>>(&mut self, cols: I) {
    self.rows.push(cols.into_iter().map(Into::into).collect());
  }

  fn widths(&self) -> Vec<usize> {
    let mut widths: Vec<usize> = Vec::new();
    for row in &self.rows {
      for (i, col) in row.iter().enumerate() {
        let len = col.chars().count().max(COLUMN_WIDTH);
        match widths.get_mut(i) {
          Some(width) => *width = len.max(*width),
          None => widths.push(len),
        }
      }
    }

    widths
  }

  /// Header, `=` underline, then one line per row.
  fn render(&self) -> Result<String> {
    let widths = self.widths();
    let mut out = String::new();

    for (i, row) in self.rows.iter().enumerate() {
      let line = format_row(row, &widths);
      writeln!(out, "{line}")?;
      if i == 0 {
        writeln!(out, "{}", "=".repeat(line.chars().count()))?;
      }
    }

    Ok(out)
  }
}

/// First column left-aligned, the rest right-aligned.
fn format_row(cols: &[String], widths: &[usize]) -> String {
  cols
    .iter()
    .zip(widths)
    .enumerate()
    .map(|(i, (col, &width))| {
      if i == 0 {
        format!("{col:<width$}")
      } else {
        format!("{col:>width$}")
      }
    })
    .collect::<Vec<_>>()
    .join(COLUMN_PADDING)
}

fn format_title(title: &str) -> String {
  format!("{title}\n{}\n", "=".repeat(title.len()))
}

fn secs(value: Option<f64>) -> String {
  value.map_or_else(|| UNDEFINED.to_string(), |v| format!("{v:.2}s"))
}

fn rate(value: Option<f64>) -> String {
  value.map_or_else(|| UNDEFINED.to_string(), |v| format!("{v:.2}/s"))
}

fn percent(value: Option<f64>) -> String {
  value.map_or_else(|| UNDEFINED.to_string(), |v| format!("{:.1}%", v * 100.0))
}

fn times(value: Option<f64>) -> String {
  value.map_or_else(|| UNDEFINED.to_string(), |v| format!("{v:.1}x"))
}

fn status(tool: &ToolComparison) -> String {
  match tool.availability {
    Availability::Unavailable => "unavailable".to_string(),
    Availability::SetupFailed => "setup failed".to_string(),
    Availability::Ran => match tool.outcomes.as_slice() {
      [only] => only.status.to_string(),
      _ if tool.summary.complete() => "ok".to_string(),
      _ => format!("{}/{} ok", tool.summary.successes, tool.summary.count),
    },
  }
}

/// Time column, or the reason there is no time.
fn elapsed(tool: &ToolComparison) -> String {
  match tool.availability {
    Availability::Ran => secs(Some(tool.summary.total_secs)),
    _ => UNDEFINED.to_string(),
  }
}

fn vs(tool: &str, baseline: &str) -> String {
  format!("{tool} vs {baseline}")
}

fn format_tools(scenario: &ScenarioComparison) -> Result<String> {
  let table = match scenario.kind {
    ScenarioKind::EnvCreate => {
      let mut table = Table::new(["tool", "time", "status"]);
      for tool in &scenario.tools {
        table.row([tool.tool.clone(), elapsed(tool), status(tool)]);
      }
      table
    }
    ScenarioKind::Individual => {
      let mut table = Table::new(["tool", "total", "average", "success", "pkg/s"]);
      for tool in &scenario.tools {
        let success = match tool.availability {
          Availability::Ran => percent(tool.summary.success_rate),
          _ => status(tool),
        };

        table.row([
          tool.tool.clone(),
          elapsed(tool),
          secs(tool.summary.average_secs),
          success,
          rate(tool.throughput),
        ]);
      }
      table
    }
    ScenarioKind::Bulk => {
      let mut table = Table::new(["tool", "time", "pkg/s", "status"]);
      for tool in &scenario.tools {
        table.row([tool.tool.clone(), elapsed(tool), rate(tool.throughput), status(tool)]);
      }
      table
    }
  };

  table.render()
}

fn format_per_package(scenario: &ScenarioComparison, baseline: &str) -> Result<String> {
  let tools: Vec<&str> = scenario.tools.iter().map(|t| t.tool.as_str()).collect();
  let others: Vec<&str> = tools.iter().copied().filter(|t| *t != baseline).collect();

  let header = ["package".to_string()]
    .into_iter()
    .chain(tools.iter().map(|t| t.to_string()))
    .chain(others.iter().map(|t| vs(t, baseline)));
  let mut table = Table::new(header);

  for row in &scenario.per_package {
    let cells = row.times.iter().map(|time| match time.secs {
      Some(_) if !time.success => "failed".to_string(),
      secs_taken => secs(secs_taken),
    });
    let speedups = row
      .times
      .iter()
      .filter(|time| time.tool != baseline)
      .map(|time| times(time.speedup));

    table.row([row.package.clone()].into_iter().chain(cells).chain(speedups));
  }

  table.render()
}

fn format_speedups(report: &ComparisonReport) -> Result<String> {
  let others: Vec<&str> = report
    .tools()
    .into_iter()
    .filter(|t| *t != report.baseline)
    .collect();

  let header = ["scenario".to_string()]
    .into_iter()
    .chain(others.iter().map(|t| vs(t, &report.baseline)));
  let mut table = Table::new(header);

  for scenario in &report.scenarios {
    table.row(
      [scenario.kind.slug().to_string()]
        .into_iter()
        .chain(others.iter().map(|t| times(scenario.tool(t).and_then(|t| t.speedup)))),
    );
  }

  table.render()
}

/// One line per tool and scenario whose speedup reaches one of `thresholds`,
/// naming the highest threshold reached.
pub fn banners(report: &ComparisonReport, thresholds: &[f64]) -> Vec<String> {
  let mut banners = Vec::new();

  for scenario in &report.scenarios {
    for tool in scenario.tools.iter().filter(|t| t.tool != report.baseline) {
      let Some(speedup) = tool.speedup else {
        continue;
      };

      let reached = thresholds
        .iter()
        .copied()
        .filter(|t| speedup >= *t)
        .max_by(f64::total_cmp);

      if let Some(threshold) = reached {
        banners.push(format!(
          "{} is {threshold}x+ faster than {} at {} ({speedup:.1}x)",
          tool.tool,
          report.baseline,
          scenario.kind.title(),
        ));
      }
    }
  }

  banners
}

pub fn format(report: &ComparisonReport, thresholds: &[f64]) -> Result<String> {
  let mut out = String::new();

  for scenario in &report.scenarios {
    writeln!(out, "{}", format_title(scenario.kind.title()))?;
    writeln!(out, "{}", format_tools(scenario)?)?;

    if !scenario.per_package.is_empty() {
      writeln!(out, "{}", format_per_package(scenario, &report.baseline)?)?;
    }
  }

  writeln!(out, "{}", format_title("speedup"))?;
  writeln!(out, "{}", format_speedups(report)?)?;

  for banner in banners(report, thresholds) {
    writeln!(out, "{banner}")?;
  }

  Ok(out)
}
