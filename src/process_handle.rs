use crate::error::{WaitError, WriteError};
use crate::merged_output::MergedOutput;
use std::borrow::Cow;
use std::fmt::Debug;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::{Child, ChildStdin};

/// Lifecycle of a target process as seen by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Process is running and accepts commands.
    Running,

    /// The shutdown command was sent (or the input broke), but no exit was observed yet.
    Terminating,

    /// Process has terminated with the given exit status.
    Exited(ExitStatus),
}

impl LifecycleState {
    pub fn has_exited(&self) -> bool {
        matches!(self, LifecycleState::Exited(_))
    }
}

/// A live target process with an exclusively owned input stream and a merged output stream.
///
/// Handles are never shared between scenarios. Dropping a handle kills the process, so a
/// failing scenario cannot leave an instance behind that still holds the target's port.
#[derive(Debug)]
pub struct TargetProcess {
    pub(crate) name: Cow<'static, str>,
    child: Child,
    stdin: Option<ChildStdin>,
    output: MergedOutput,
    state: LifecycleState,
}

impl TargetProcess {
    pub(crate) fn new(
        name: Cow<'static, str>,
        mut child: Child,
        output: MergedOutput,
    ) -> Self {
        let stdin = child.stdin.take();
        Self {
            name,
            child,
            stdin,
            output,
            state: LifecycleState::Running,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the OS-assigned process identifier, or `None` once the exit was observed.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Returns the current lifecycle state, polling the OS for an exit without blocking.
    pub fn state(&mut self) -> LifecycleState {
        if self.state.has_exited() {
            return self.state;
        }
        match self.child.try_wait() {
            Ok(Some(exit_status)) => {
                self.state = LifecycleState::Exited(exit_status);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(process = %self.name, error = %err, "Could not poll process state");
            }
        }
        self.state
    }

    pub fn output_mut(&mut self) -> &mut MergedOutput {
        &mut self.output
    }

    pub(crate) fn stdin_mut(&mut self) -> Result<&mut ChildStdin, WriteError> {
        self.stdin.as_mut().ok_or_else(|| WriteError::StdinClosed {
            process_name: self.name.clone(),
        })
    }

    /// Whether commands can still be written.
    pub fn accepts_input(&self) -> bool {
        self.stdin.is_some()
    }

    /// Closes the input stream. The process observes end-of-file on its next read.
    pub fn close_stdin(&mut self) {
        if self.stdin.take().is_some() {
            tracing::debug!(process = %self.name, "Closed input stream");
        }
    }

    pub(crate) fn mark_terminating(&mut self) {
        if self.state == LifecycleState::Running {
            self.state = LifecycleState::Terminating;
        }
    }

    /// Waits for the process to exit, for at most `timeout`.
    ///
    /// The input stream is closed before waiting, so that a process blocked in a read observes
    /// end-of-file rather than waiting for a command that will never come.
    pub async fn wait_for_exit(&mut self, timeout: Duration) -> Result<ExitStatus, WaitError> {
        if let LifecycleState::Exited(exit_status) = self.state {
            return Ok(exit_status);
        }
        self.close_stdin();
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(exit_status)) => {
                tracing::debug!(process = %self.name, ?exit_status, "Process exited");
                self.state = LifecycleState::Exited(exit_status);
                Ok(exit_status)
            }
            Ok(Err(source)) => Err(WaitError::Io {
                process_name: self.name.clone(),
                source,
            }),
            Err(_elapsed) => Err(WaitError::Timeout {
                process_name: self.name.clone(),
                timeout,
            }),
        }
    }

    pub(crate) fn child(&self) -> &Child {
        &self.child
    }

    pub(crate) async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }
}
