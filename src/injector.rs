//! Writes commands into a target's input, one line at a time.

use crate::error::WriteError;
use crate::process_handle::TargetProcess;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Writes `command` followed by a line terminator and flushes it.
///
/// The command is delivered to the pipe before this returns, the way a user typing into an
/// interactive session hands over one line at a time. No response is awaited.
///
/// Any failure is terminal for the process's input: it is closed, the process is marked as
/// terminating, and subsequent writes fail with [WriteError::StdinClosed].
pub async fn send_line(
    process: &mut TargetProcess,
    command: &str,
    timeout: Duration,
) -> Result<(), WriteError> {
    let mut line = Vec::with_capacity(command.len() + 1);
    line.extend_from_slice(command.as_bytes());
    line.push(b'\n');

    let stdin = process.stdin_mut()?;
    let write = async {
        stdin.write_all(&line).await?;
        stdin.flush().await
    };

    let result = match tokio::time::timeout(timeout, write).await {
        Ok(Ok(())) => {
            tracing::trace!(process = %process.name, command, "Delivered command");
            return Ok(());
        }
        Ok(Err(source)) => WriteError::WriteFailed {
            process_name: process.name.clone(),
            command: command.to_owned(),
            source,
        },
        Err(_elapsed) => WriteError::Timeout {
            process_name: process.name.clone(),
            command: command.to_owned(),
            timeout,
        },
    };

    tracing::warn!(process = %process.name, error = %result, "Input stream is unusable, closing it");
    process.close_stdin();
    process.mark_terminating();
    Err(result)
}

/// Writes all `commands` in order, each fully delivered before the next one starts.
///
/// Stops at the first failure. Returns the number of delivered commands.
pub async fn inject<I, S>(
    process: &mut TargetProcess,
    commands: I,
    timeout: Duration,
) -> Result<usize, WriteError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut delivered = 0;
    for command in commands {
        send_line(process, command.as_ref(), timeout).await?;
        delivered += 1;
    }
    tracing::debug!(process = %process.name, delivered, "Injected commands");
    Ok(delivered)
}
