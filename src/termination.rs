//! Shutting target processes down: politely via the sentinel command, forcefully via signals.

use crate::error::{TerminationError, WaitError, WriteError};
use crate::injector::send_line;
use crate::process_handle::{LifecycleState, TargetProcess};
use crate::signal::{self, Escalation};
use std::process::ExitStatus;
use std::time::Duration;

/// The reserved command asking the target to shut down.
pub const QUIT: &str = "QUIT";

/// Sends [QUIT] to every process, in the given order.
///
/// By convention the client comes first, so it can tear down its outbound connections while
/// the server it depends on is still alive. Sending does not wait for an exit.
///
/// A failed write is terminal for that process only: the remaining processes are still asked to
/// quit. The returned results line up with `processes`.
pub async fn send_quit(
    processes: &mut [&mut TargetProcess],
    write_timeout: Duration,
) -> Vec<Result<(), WriteError>> {
    let mut results = Vec::with_capacity(processes.len());
    for process in processes.iter_mut() {
        let result = send_line(process, QUIT, write_timeout).await;
        match &result {
            Ok(()) => {
                tracing::debug!(process = %process.name, "Sent shutdown command");
                process.mark_terminating();
            }
            Err(err) => {
                tracing::warn!(process = %process.name, error = %err, "Could not send shutdown command");
            }
        }
        results.push(result);
    }
    results
}

impl TargetProcess {
    /// Forcefully terminates the process, unless it already exited.
    ///
    /// Escalates from SIGINT to SIGTERM to SIGKILL, giving the process `grace` to exit after
    /// each step.
    pub async fn terminate(&mut self, grace: Duration) -> Result<ExitStatus, TerminationError> {
        if let LifecycleState::Exited(exit_status) = self.state() {
            return Ok(exit_status);
        }
        self.mark_terminating();

        let mut failures = [String::new(), String::new()];
        for (step, failure) in [Escalation::Interrupt, Escalation::Terminate]
            .into_iter()
            .zip(failures.iter_mut())
        {
            *failure = match signal::deliver(self.child(), step) {
                Ok(()) => match self.wait_for_exit(grace).await {
                    Ok(exit_status) => return Ok(exit_status),
                    Err(err) => err.to_string(),
                },
                Err(err) => err.to_string(),
            };
            tracing::warn!(
                process = %self.name,
                signal = %step,
                error = %failure,
                "Signal did not terminate the process, escalating"
            );
        }
        let [sigint_error, sigterm_error] = failures;

        if let Err(sigkill_error) = self.kill().await {
            return Err(TerminationError::TerminationFailed {
                process_name: self.name.clone(),
                sigint_error,
                sigterm_error,
                sigkill_error,
            });
        }
        self.wait_for_exit(grace)
            .await
            .map_err(|source: WaitError| TerminationError::NoExitAfterKill {
                process_name: self.name.clone(),
                source,
            })
    }
}

/// Terminates every process that did not exit yet, logging failures instead of returning them.
///
/// Used when a scenario is abandoned, so that no instance survives into the next scenario.
pub async fn terminate_all(processes: &mut [&mut TargetProcess], grace: Duration) {
    for process in processes.iter_mut() {
        if process.state().has_exited() {
            continue;
        }
        match process.terminate(grace).await {
            Ok(exit_status) => {
                tracing::debug!(process = %process.name, ?exit_status, "Terminated process");
            }
            Err(err) => {
                tracing::error!(process = %process.name, error = %err, "Could not terminate process");
            }
        }
    }
}
