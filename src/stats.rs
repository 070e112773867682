use crate::{exec::Outcome, scenario::ScenarioKind};

/// Whether, and how far, a tool got through a scenario.
#[derive(Debug, Clone, PartialEq)]
pub enum Participation {
  Ran,
  /// Skipped without launching anything; the host lacks the tool.
  Unavailable,
  /// The target could not be prepared, so no operations were attempted.
  SetupFailed(Outcome),
}

/// Raw outcomes of one tool within one scenario, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRun {
  pub tool: String,
  pub participation: Participation,
  pub outcomes: Vec<Outcome>,
}

impl ToolRun {
  pub fn ran(tool: impl Into<String>, outcomes: Vec<Outcome>) -> Self {
    Self {
      tool: tool.into(),
      participation: Participation::Ran,
      outcomes,
    }
  }

  pub fn unavailable(tool: impl Into<String>) -> Self {
    let tool = tool.into();

    Self {
      outcomes: vec![Outcome::unavailable(format!("{tool} is not installed"))],
      participation: Participation::Unavailable,
      tool,
    }
  }

  pub fn setup_failed(tool: impl Into<String>, setup: Outcome) -> Self {
    Self {
      tool: tool.into(),
      participation: Participation::SetupFailed(setup),
      outcomes: Vec::new(),
    }
  }

  /// Outcomes of operations that were actually launched.
  pub fn measured(&self) -> &[Outcome] {
    match self.participation {
      Participation::Ran => &self.outcomes,
      _ => &[],
    }
  }
}

/// Everything collected for one scenario, tools in the order they ran.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioResult {
  pub kind: ScenarioKind,
  pub packages: Vec<String>,
  pub runs: Vec<ToolRun>,
}

impl ScenarioResult {
  pub fn run(&self, tool: &str) -> Option<&ToolRun> {
    self.runs.iter().find(|run| run.tool == tool)
  }
}
