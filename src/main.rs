//! peer-harness: runs golden-file scenarios against two instances of a peer-to-peer program.

use clap::Parser;
use peer_harness::{
    ConfigError, HarnessConfig, Launcher, ProcessScenarioExecutor, ScenarioRunner, Suite,
    load_suite, logging,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "peer-harness", about = "Golden-file test harness for btide peers")]
#[command(version, long_about = None)]
struct Cli {
    /// Harness configuration file (TOML)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Suite file replacing the configured scenarios
    #[arg(long, short)]
    suite: Option<PathBuf>,

    /// Target program, overriding the configuration
    #[arg(long)]
    program: Option<PathBuf>,

    /// Directory the target runs in, overriding the configuration
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Only run the scenario with this name (repeatable)
    #[arg(long = "only", value_name = "NAME")]
    only: Vec<String>,
}

impl Cli {
    fn config(&self) -> Result<HarnessConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::load(path)?,
            None => HarnessConfig::default(),
        };
        if let Some(program) = &self.program {
            config.program = program.clone();
        }
        if let Some(dir) = &self.working_dir {
            config.working_dir = dir.clone();
        }
        Ok(config)
    }

    fn suite(&self, config: &HarnessConfig) -> Result<Suite, ConfigError> {
        match &self.suite {
            Some(path) => load_suite(path),
            None => Ok(config.suite()),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let cli = Cli::parse();

    let (config, suite) = match cli.config().and_then(|c| cli.suite(&c).map(|s| (c, s))) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(2);
        }
    };

    if suite.is_empty() {
        eprintln!("Error: the suite has no scenarios");
        return ExitCode::from(2);
    }

    for name in &cli.only {
        if !suite.scenarios.iter().any(|s| &s.name == name) {
            tracing::warn!(name, "No scenario with this name");
        }
    }
    let selected = suite.select(&cli.only);
    if selected.is_empty() {
        eprintln!("Error: no scenarios to run");
        return ExitCode::from(2);
    }

    let launcher = Launcher::new(&config.program).working_dir(&config.working_dir);
    tracing::info!(
        program = %launcher.program().display(),
        working_dir = %config.working_dir.display(),
        scenarios = selected.len(),
        "Starting run"
    );
    let executor = ProcessScenarioExecutor::new(launcher, &config.working_dir, config.timeouts);
    let report = ScenarioRunner::new(executor).run(&selected).await;

    print!("{report}");
    ExitCode::from(report.exit_code())
}
