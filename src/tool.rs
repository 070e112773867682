use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
  exec::{self, Operation},
  host,
};

const PYTHON: &str = "{python}";
const TARGET: &str = "{target}";
const VENV_PYTHON: &str = "{venv_python}";
const PACKAGES: &str = "{packages}";

/// A command line with placeholders, rendered once per operation.
///
/// `{packages}` must stand alone as a token and expands to one token per
/// package. `{python}`, `{target}` and `{venv_python}` may be embedded in a
/// larger token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Template(Vec<String>);

/// What a template is rendered against.
#[derive(Debug, Clone, Copy, Default)]
pub struct Params<'a> {
  pub target: Option<&'a Path>,
  pub packages: &'a [String],
}

impl Template {
  pub fn new<I, S>(tokens: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self(tokens.into_iter().map(Into::into).collect())
  }

  pub fn mentions(&self, placeholder: &str) -> bool {
    self.0.iter().any(|token| token.contains(placeholder))
  }

  /// Checks the shape of the template without rendering it.
  pub fn check(&self) -> Result<()> {
    if self.0.is_empty() {
      anyhow::bail!("template is empty");
    }

    if let Some(token) = self.0.iter().find(|t| t.contains(PACKAGES) && t.as_str() != PACKAGES) {
      anyhow::bail!("{PACKAGES} must be a whole token, found {token:?}");
    }

    Ok(())
  }

  pub fn render(&self, params: &Params) -> Result<Vec<String>> {
    let target = params.target.map(|t| t.display().to_string());
    let venv_python = params.target.map(|t| host::venv_python(t).display().to_string());

    let mut argv = Vec::with_capacity(self.0.len() + params.packages.len());
    for token in &self.0 {
      if token == PACKAGES {
        argv.extend(params.packages.iter().cloned());
        continue;
      }

      let mut token = token.replace(PYTHON, host::host_python());

      if token.contains(VENV_PYTHON) {
        let venv_python = venv_python.as_deref().with_context(|| format!("{VENV_PYTHON} needs a target"))?;
        token = token.replace(VENV_PYTHON, venv_python);
      }

      if token.contains(TARGET) {
        let target = target.as_deref().with_context(|| format!("{TARGET} needs a target"))?;
        token = token.replace(TARGET, target);
      }

      argv.push(token);
    }

    Ok(argv)
  }
}

/// How to drive one package manager through each kind of operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSpec {
  pub name: String,
  /// Command that exits zero when the tool is usable. Without one the tool is
  /// assumed to be present.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub probe: Option<Template>,
  /// Creates a fresh environment at `{target}`.
  pub create: Template,
  /// Installs `{packages}` into the environment at `{target}`.
  pub install: Template,
}

impl ToolSpec {
  pub fn builtin() -> Vec<ToolSpec> {
    let mint = |args: &[&str]| {
      Template::new(
        [PYTHON, "mint_py/mint/cli.py"]
          .into_iter()
          .chain(args.iter().copied()),
      )
    };

    vec![
      ToolSpec {
        name: "mint".to_string(),
        probe: Some(mint(&["--help"])),
        create: mint(&["venv-create", TARGET]),
        install: mint(&["install", PACKAGES, "-v", TARGET]),
      },
      ToolSpec {
        name: "pip".to_string(),
        probe: Some(Template::new([PYTHON, "-m", "pip", "--version"])),
        create: Template::new([PYTHON, "-m", "venv", TARGET]),
        install: Template::new([VENV_PYTHON, "-m", "pip", "install", PACKAGES]),
      },
      ToolSpec {
        name: "uv".to_string(),
        probe: Some(Template::new(["uv", "--version"])),
        create: Template::new(["uv", "venv", TARGET]),
        install: Template::new(["uv", "pip", "install", "-p", TARGET, PACKAGES]),
      },
    ]
  }
}

/// A tool resolved for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Tool {
  pub spec: ToolSpec,
  pub available: bool,
}

impl Tool {
  /// Runs the tool's probe command to decide whether it takes part in the run.
  pub fn probe(spec: ToolSpec, timeout: Duration) -> Result<Self> {
    let Some(probe) = &spec.probe else {
      return Ok(Self { spec, available: true });
    };

    let argv = probe.render(&Params::default()).context("render probe")?;
    let op = Operation::new(format!("probing {}", spec.name), argv, timeout)?;
    let outcome = exec::execute(&op);

    if outcome.success() {
      info!("{} is available", spec.name);
    } else {
      warn!("{} not available, it will be skipped: {}", spec.name, outcome.detail().unwrap_or_default());
    }

    Ok(Self {
      available: outcome.success(),
      spec,
    })
  }

  pub fn name(&self) -> &str {
    &self.spec.name
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use super::*;

  fn packages() -> Vec<String> {
    vec!["click==8.1.7".to_string(), "tqdm".to_string()]
  }

  #[test]
  fn packages_expand_in_place() {
    let target = PathBuf::from("/work/bulk/uv");
    let template = Template::new(["uv", "pip", "install", "-p", TARGET, PACKAGES, "--quiet"]);
    let argv = template
      .render(&Params {
        target: Some(&target),
        packages: &packages(),
      })
      .unwrap();

    assert_eq!(
      argv,
      ["uv", "pip", "install", "-p", "/work/bulk/uv", "click==8.1.7", "tqdm", "--quiet"]
    );
  }

  #[test]
  fn embedded_placeholders_are_substituted() {
    let target = PathBuf::from("env");
    let argv = Template::new(["tool", "--prefix={target}"])
      .render(&Params {
        target: Some(&target),
        packages: &[],
      })
      .unwrap();

    assert_eq!(argv, ["tool", "--prefix=env"]);
  }

  #[test]
  fn target_placeholders_need_a_target() {
    assert!(Template::new(["uv", "venv", TARGET]).render(&Params::default()).is_err());
    assert!(Template::new([VENV_PYTHON, "-V"]).render(&Params::default()).is_err());
  }

  #[test]
  fn venv_python_resolves_inside_target() {
    let target = PathBuf::from("envs/pip");
    let argv = Template::new([VENV_PYTHON, "-m", "pip"])
      .render(&Params {
        target: Some(&target),
        packages: &[],
      })
      .unwrap();

    assert_eq!(argv[0], host::venv_python(&target).display().to_string());
  }

  #[test]
  fn check_rejects_bad_shapes() {
    assert!(Template::new(Vec::<String>::new()).check().is_err());
    assert!(Template::new(["pip", "install", "--pkgs={packages}"]).check().is_err());
    assert!(Template::new(["pip", "install", PACKAGES]).check().is_ok());
  }

  #[test]
  fn builtin_tools_render() {
    let target = PathBuf::from("t");
    let pkgs = packages();
    for spec in ToolSpec::builtin() {
      let params = Params {
        target: Some(&target),
        packages: &pkgs,
      };
      spec.create.render(&params).unwrap();
      let install = spec.install.render(&params).unwrap();
      assert!(install.contains(&"tqdm".to_string()), "{}", spec.name);
    }
  }

  #[cfg(unix)]
  #[test]
  fn probe_decides_availability() {
    let mut spec = ToolSpec::builtin().remove(0);

    spec.probe = Some(Template::new(["true"]));
    assert!(Tool::probe(spec.clone(), Duration::from_secs(10)).unwrap().available);

    spec.probe = Some(Template::new(["pm-bench-definitely-not-installed"]));
    assert!(!Tool::probe(spec.clone(), Duration::from_secs(10)).unwrap().available);

    spec.probe = None;
    assert!(Tool::probe(spec, Duration::from_secs(10)).unwrap().available);
  }
}
