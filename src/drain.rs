use crate::error::CollectError;
use crate::merged_output::ChunkReceiver;
use std::borrow::Cow;
use std::io;
use std::time::Duration;
use tokio::sync::oneshot::Sender;
use tokio::task::JoinHandle;

/// Everything a [Drain] read from a process's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    /// The captured bytes. Empty when the output was discarded.
    pub bytes: bytes::Bytes,

    /// Number of bytes read, whether kept or not.
    pub total_bytes: usize,

    /// `false` if the drain was cancelled before the stream closed.
    pub reached_eof: bool,
}

impl Captured {
    /// The captured output decoded as UTF-8. Invalid sequences are replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// A background task reading a process's merged output until end-of-stream.
///
/// For proper cleanup, call
/// - `wait()`, which waits (bounded) for the task to observe end-of-stream.
/// - `cancel()`, which sends a termination signal and then collects what was read so far.
///
/// If not cleaned up, the termination signal will be sent when dropping this drain,
/// but the task will be aborted (forceful, not waiting for its regular completion).
pub struct Drain {
    process_name: Cow<'static, str>,
    keep: bool,
    task: Option<JoinHandle<io::Result<Captured>>>,
    task_termination_sender: Option<Sender<()>>,
}

impl Drain {
    pub(crate) fn spawn(
        process_name: Cow<'static, str>,
        mut receiver: ChunkReceiver,
        keep: bool,
    ) -> Self {
        let (term_sig_tx, mut term_sig_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut buf = bytes::BytesMut::new();
            let mut total_bytes = 0;
            let reached_eof = loop {
                tokio::select! {
                    out = receiver.recv() => {
                        match out {
                            Some(Ok(chunk)) => {
                                total_bytes += chunk.len();
                                if keep {
                                    buf.extend_from_slice(&chunk);
                                }
                            }
                            Some(Err(err)) => return Err(err),
                            // All readers are gone, the write side was closed.
                            None => break true,
                        }
                    }
                    _msg = &mut term_sig_rx => break false,
                }
            };
            Ok(Captured {
                bytes: buf.freeze(),
                total_bytes,
                reached_eof,
            })
        });
        Self {
            process_name,
            keep,
            task: Some(task),
            task_termination_sender: Some(term_sig_tx),
        }
    }

    /// Checks if this task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// Waits for the output to reach end-of-stream.
    ///
    /// When `timeout` elapses first, the drain is cancelled and [CollectError::Timeout] carries
    /// whatever was read up to that point.
    pub async fn wait(mut self, timeout: Duration) -> Result<Captured, CollectError> {
        let Some(mut task) = self.task.take() else {
            return Err(CollectError::AlreadyTaken {
                process_name: self.process_name.clone(),
            });
        };

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => {
                let captured = self.finish(joined)?;
                if !self.keep {
                    tracing::debug!(
                        process = %self.process_name,
                        total_bytes = captured.total_bytes,
                        "Discarded output"
                    );
                }
                Ok(captured)
            }
            Err(_elapsed) => {
                tracing::warn!(
                    process = %self.process_name,
                    ?timeout,
                    "Output did not reach end-of-stream in time, cancelling drain"
                );
                if let Some(sender) = self.task_termination_sender.take() {
                    // Sending fails if the task finished in the meantime, which is fine.
                    let _res = sender.send(());
                }
                let partial = self.finish(task.await)?;
                Err(CollectError::Timeout {
                    process_name: self.process_name.clone(),
                    timeout,
                    partial: partial.bytes,
                })
            }
        }
    }

    /// Sends a cancellation event to the drain and returns what was read so far.
    pub async fn cancel(mut self) -> Result<Captured, CollectError> {
        if let Some(sender) = self.task_termination_sender.take() {
            // We ignore any potential error here.
            // Sending may fail if the task is already terminated (for example, by reaching EOF),
            // which in turn dropped the receiver end!
            let _res = sender.send(());
        }
        let Some(task) = self.task.take() else {
            return Err(CollectError::AlreadyTaken {
                process_name: self.process_name.clone(),
            });
        };
        self.finish(task.await)
    }

    fn finish(
        &self,
        joined: Result<io::Result<Captured>, tokio::task::JoinError>,
    ) -> Result<Captured, CollectError> {
        joined
            .map_err(CollectError::TaskJoin)?
            .map_err(|source| CollectError::ReadFailed {
                process_name: self.process_name.clone(),
                source,
            })
    }
}

impl std::fmt::Debug for Drain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drain")
            .field("process_name", &self.process_name)
            .field("keep", &self.keep)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Drop for Drain {
    fn drop(&mut self) {
        if let Some(task_termination_sender) = self.task_termination_sender.take() {
            let _res = task_termination_sender.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
