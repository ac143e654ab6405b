//! Error types for harness operations.
//!
//! Every error is scoped to the scenario that produced it. The runner turns them into an
//! `Errored` outcome instead of letting them abort the run.

use std::borrow::Cow;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when launching a target process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The program could not be found.
    #[error("Program '{}' for process '{process_name}' was not found: {source}", .program.display())]
    ProgramNotFound {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The program that was looked up.
        program: PathBuf,
        /// The underlying IO error.
        source: io::Error,
    },

    /// The program exists but may not be executed.
    #[error("Program '{}' for process '{process_name}' is not executable: {source}", .program.display())]
    NotExecutable {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The program that was attempted.
        program: PathBuf,
        /// The underlying IO error.
        source: io::Error,
    },

    /// Failed to spawn the process for any other reason.
    #[error("Failed to spawn process '{process_name}': {source}")]
    SpawnFailed {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The pipe carrying the merged output could not be set up.
    #[error("Failed to create the output pipe for process '{process_name}': {source}")]
    PipeCreation {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Errors that can occur when writing to a process's input stream.
///
/// A write error is terminal for the affected process: its input is marked closed and further
/// writes fail with [WriteError::StdinClosed] without touching the pipe again.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The input stream was already closed, either by us or after an earlier failed write.
    #[error("Input stream of process '{process_name}' is closed")]
    StdinClosed {
        /// The name of the process.
        process_name: Cow<'static, str>,
    },

    /// Writing or flushing a command failed.
    #[error("Failed to write '{command}' to process '{process_name}': {source}")]
    WriteFailed {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The command that could not be delivered.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Delivering a command did not complete in time.
    #[error("Writing '{command}' to process '{process_name}' did not complete within {timeout:?}")]
    Timeout {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The command that could not be delivered.
        command: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },
}

/// Errors that can occur when waiting for a process to exit.
#[derive(Debug, Error)]
pub enum WaitError {
    /// Polling the process for its exit status failed.
    #[error("Could not wait for process '{process_name}': {source}")]
    Io {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Wait operation timed out.
    #[error("Process '{process_name}' did not exit within {timeout:?}")]
    Timeout {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },
}

/// Errors that can occur when forcefully terminating a process.
#[derive(Debug, Error)]
pub enum TerminationError {
    /// Neither SIGINT, SIGTERM nor a kill got rid of the process.
    #[error(
        "Could not stop process '{process_name}' (SIGINT: {sigint_error}; SIGTERM: {sigterm_error}; kill: {sigkill_error})"
    )]
    TerminationFailed {
        process_name: Cow<'static, str>,
        sigint_error: String,
        sigterm_error: String,
        #[source]
        sigkill_error: io::Error,
    },

    /// The process was killed but still did not report its exit.
    #[error("Process '{process_name}' was killed but did not exit: {source}")]
    NoExitAfterKill {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The failed wait.
        #[source]
        source: WaitError,
    },
}

/// Errors that can occur when collecting the output of a process.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The output stream was already handed to another drain.
    #[error("Output of process '{process_name}' is already being drained")]
    AlreadyTaken {
        /// The name of the process.
        process_name: Cow<'static, str>,
    },

    /// Reading from the output pipe failed.
    #[error("Could not read output of process '{process_name}': {source}")]
    ReadFailed {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The drain task could not be joined.
    #[error("The drain task could not be joined/terminated: {0}")]
    TaskJoin(#[source] tokio::task::JoinError),

    /// The output stream was not closed in time.
    #[error("Output of process '{process_name}' did not reach end-of-stream within {timeout:?}")]
    Timeout {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// The timeout duration that was exceeded.
        timeout: Duration,
        /// Everything read before the timeout hit.
        partial: bytes::Bytes,
    },

    /// The captured output could not be written to its file.
    #[error("Could not persist captured output to '{}': {source}", .path.display())]
    Persist {
        /// The output file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A process did not exit after its output was collected.
    #[error(transparent)]
    Wait(#[from] WaitError),
}

/// Any infrastructure failure within a single scenario.
///
/// Kept apart from an output mismatch, so that a report can tell "the target printed something
/// else" from "the harness could not even get an answer".
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Launch failed: {0}")]
    Launch(#[from] LaunchError),

    #[error("Output collection failed: {0}")]
    Collect(#[from] CollectError),
}
