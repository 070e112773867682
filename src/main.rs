mod bench;
mod compare;
mod config;
mod exec;
mod ext;
mod format;
mod host;
mod provision;
mod scenario;
mod stats;
mod tool;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use self::{bench::Bench, config::Config, scenario::ScenarioKind};

#[derive(Parser)]
#[command(about = "Compare how fast package managers create environments and install packages")]
struct Args {
  /// More logging on stderr (-v info, -vv debug, -vvv trace). `RUST_LOG`
  /// takes precedence.
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run the benchmark scenarios and print a comparison.
  Bench {
    /// TOML file to read the configuration from.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory to create environments in, instead of a temporary one.
    #[arg(long)]
    work_dir: Option<PathBuf>,
    /// Which scenarios to run, in order.
    #[arg(short, long, value_enum)]
    scenario: Vec<ScenarioKind>,
    /// Only benchmark these tools (the baseline is always included).
    #[arg(short, long)]
    tool: Vec<String>,
    /// Tool the others are compared against.
    #[arg(short, long)]
    baseline: Option<String>,
    /// Package to install in the individual scenario.
    #[arg(short, long)]
    package: Vec<String>,
    /// Package to install in the bulk scenario.
    #[arg(long)]
    bulk_package: Vec<String>,
    /// Print the comparison as JSON.
    #[arg(long)]
    json: bool,
  },
  /// Check which tools are installed.
  Probe {
    #[arg(short, long)]
    config: Option<PathBuf>,
  },
  /// Print the default configuration.
  Config,
}

fn init_logging(verbose: u8) {
  let level = match verbose {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
    .with_writer(std::io::stderr)
    .with_target(false)
    .init();
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
  match path {
    Some(path) => Config::load(&path),
    None => Ok(Config::default()),
  }
}

fn main() -> Result<()> {
  let args = Args::parse();
  init_logging(args.verbose);

  match args.command {
    Command::Bench {
      config,
      work_dir,
      scenario,
      tool,
      baseline,
      package,
      bulk_package,
      json,
    } => {
      let mut config = load_config(config).context("config")?;

      if let Some(baseline) = baseline {
        config.baseline = baseline;
      }
      if work_dir.is_some() {
        config.work_dir = work_dir;
      }
      if !scenario.is_empty() {
        config.scenarios = scenario;
      }
      if !package.is_empty() {
        config.packages = package;
      }
      if !bulk_package.is_empty() {
        config.bulk_packages = bulk_package;
      }
      config.retain_tools(&tool).context("--tool")?;

      let thresholds = config.banner_thresholds.clone();

      let mut bench = Bench::new(config).context("Bench::new")?;
      bench.bench().context("bench")?;

      let report = bench.report();
      if json {
        println!("{}", serde_json::to_string_pretty(&report).context("json")?);
      } else {
        println!("{}", format::format(&report, &thresholds).context("format")?);
      }
    }
    Command::Probe { config } => {
      let config = load_config(config).context("config")?;
      config.validate().context("invalid config")?;

      for tool in bench::probe(&config).context("probe")? {
        let state = if tool.available { "available" } else { "unavailable" };
        println!("{:<14}  {state}", tool.name());
      }
    }
    Command::Config => {
      print!("{}", Config::default().to_toml()?);
    }
  }

  Ok(())
}
