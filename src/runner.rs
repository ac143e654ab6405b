//! Running scenarios one after another and reporting their outcomes.

use crate::collector::collect;
use crate::config::Timeouts;
use crate::error::ScenarioError;
use crate::golden::{self, Comparison};
use crate::injector::inject;
use crate::launcher::Launcher;
use crate::scenario::Scenario;
use crate::termination::{send_quit, terminate_all};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tracing::Instrument;

/// How a single scenario ended.
#[derive(Debug)]
pub enum ScenarioOutcome {
    /// The captured output matched the golden file.
    Passed,

    /// The scenario ran to completion, but its output differs from the golden file (or one of
    /// the files could not be read).
    Failed(Comparison),

    /// The harness could not drive the scenario to completion.
    Errored(ScenarioError),
}

impl ScenarioOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, ScenarioOutcome::Passed)
    }
}

pub type ScenarioFuture = Pin<Box<dyn Future<Output = ScenarioOutcome> + Send + 'static>>;

/// Executes a single scenario to completion.
///
/// Implementations must never leave a process of the scenario running once the returned future
/// resolved, as the next scenario reuses the same port.
#[cfg_attr(test, mockall::automock)]
pub trait ScenarioExecutor {
    fn execute(&self, number: usize, scenario: Scenario) -> ScenarioFuture;
}

/// Executes scenarios by launching two real instances of the target program.
#[derive(Debug, Clone)]
pub struct ProcessScenarioExecutor {
    launcher: Launcher,
    working_dir: PathBuf,
    timeouts: Timeouts,
}

impl ProcessScenarioExecutor {
    /// Scenario paths are resolved against `working_dir`, which should be the directory the
    /// `launcher` starts its processes in.
    pub fn new(launcher: Launcher, working_dir: impl Into<PathBuf>, timeouts: Timeouts) -> Self {
        Self {
            launcher,
            working_dir: working_dir.into(),
            timeouts,
        }
    }

    async fn run(self, scenario: Scenario) -> Result<Comparison, ScenarioError> {
        let timeouts = self.timeouts;

        let mut server = self.launcher.spawn("server", &scenario.server_config)?;
        // Always drained, so the server never blocks on a full output pipe.
        let server_drain = match scenario.server_output {
            Some(_) => server.output_mut().capture()?,
            None => server.output_mut().discard()?,
        };

        let mut client = match self.launcher.spawn("client", &scenario.client_config) {
            Ok(client) => client,
            Err(err) => {
                terminate_all(&mut [&mut server], timeouts.kill_grace).await;
                return Err(err.into());
            }
        };
        let client_drain = client.output_mut().capture()?;

        if let Err(err) = inject(
            &mut server,
            &scenario.server_commands,
            timeouts.command_write,
        )
        .await
        {
            tracing::warn!(error = %err, "Stopped injecting into server");
        }
        if let Err(err) = inject(
            &mut client,
            &scenario.client_commands,
            timeouts.command_write,
        )
        .await
        {
            tracing::warn!(error = %err, "Stopped injecting into client");
        }

        send_quit(&mut [&mut client, &mut server], timeouts.command_write).await;

        let output = self.working_dir.join(&scenario.output);
        let server_output = scenario
            .server_output
            .as_ref()
            .map(|path| self.working_dir.join(path));
        let collected = collect(
            &mut client,
            client_drain,
            &mut server,
            server_drain,
            &output,
            server_output.as_deref(),
            &timeouts,
        )
        .await?;
        tracing::debug!(
            client_status = ?collected.client_status,
            server_status = ?collected.server_status,
            "Both instances exited"
        );

        let expected = self.working_dir.join(&scenario.expected);
        Ok(golden::compare(&output, &expected).await)
    }
}

impl ScenarioExecutor for ProcessScenarioExecutor {
    fn execute(&self, _number: usize, scenario: Scenario) -> ScenarioFuture {
        let executor = self.clone();
        Box::pin(async move {
            match executor.run(scenario).await {
                Ok(Comparison::Equal) => ScenarioOutcome::Passed,
                Ok(comparison) => ScenarioOutcome::Failed(comparison),
                Err(err) => ScenarioOutcome::Errored(err),
            }
        })
    }
}

/// The outcome of one scenario, together with its position in the suite.
#[derive(Debug)]
pub struct ScenarioResult {
    pub number: usize,
    pub name: String,
    pub outcome: ScenarioOutcome,
}

impl Display for ScenarioResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.outcome {
            ScenarioOutcome::Passed => write!(f, "Test {}: Passed", self.number),
            ScenarioOutcome::Failed(_) => write!(f, "Test {}: Failed", self.number),
            ScenarioOutcome::Errored(err) => write!(f, "Test {}: Error ({err})", self.number),
        }
    }
}

/// All scenario results of a run, in execution order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub results: Vec<ScenarioResult>,
}

impl RunReport {
    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, ScenarioOutcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ScenarioOutcome::Failed(_)))
    }

    pub fn errored(&self) -> usize {
        self.count(|o| matches!(o, ScenarioOutcome::Errored(_)))
    }

    fn count(&self, pred: impl Fn(&ScenarioOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// `0` if everything passed, `1` if outputs mismatched, `2` if the harness itself failed.
    pub fn exit_code(&self) -> u8 {
        if self.errored() > 0 {
            2
        } else if self.failed() > 0 {
            1
        } else {
            0
        }
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for result in &self.results {
            writeln!(f, "{result}")?;
        }
        Ok(())
    }
}

/// Runs scenarios strictly one after another.
///
/// A scenario's failure never keeps the following scenarios from running.
pub struct ScenarioRunner<E> {
    executor: E,
}

impl<E: ScenarioExecutor> ScenarioRunner<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub async fn run(&self, scenarios: &[(usize, &Scenario)]) -> RunReport {
        let mut report = RunReport::default();
        for (number, scenario) in scenarios.iter().copied() {
            let span = tracing::info_span!("scenario", number, name = %scenario.name);
            tracing::info!(parent: &span, "Running scenario");
            let outcome = self
                .executor
                .execute(number, scenario.clone())
                .instrument(span.clone())
                .await;
            match &outcome {
                ScenarioOutcome::Passed => tracing::info!(parent: &span, "Scenario passed"),
                ScenarioOutcome::Failed(comparison) => {
                    tracing::info!(parent: &span, %comparison, "Scenario failed")
                }
                ScenarioOutcome::Errored(err) => {
                    tracing::error!(parent: &span, error = %err, "Scenario errored")
                }
            }
            report.results.push(ScenarioResult {
                number,
                name: scenario.name.clone(),
                outcome,
            });
        }
        tracing::info!(
            passed = report.passed(),
            failed = report.failed(),
            errored = report.errored(),
            "Finished run"
        );
        report
    }
}
