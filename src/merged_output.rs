use crate::drain::Drain;
use crate::error::{CollectError, LaunchError};
use std::borrow::Cow;
use std::fmt::{Debug, Formatter};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Default size of a single chunk read from the output pipe.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024; // 16 kb

/// Default number of chunks buffered between the pipe reader and the drain.
///
/// Together with [DEFAULT_CHUNK_SIZE] this bounds the memory held for an undrained process:
/// 16 kb * 128 = 2 mb.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 128;

pub(crate) type ChunkSender = tokio::sync::mpsc::Sender<io::Result<bytes::Bytes>>;
pub(crate) type ChunkReceiver = tokio::sync::mpsc::Receiver<io::Result<bytes::Bytes>>;

/// The merged stdout and stderr of a target process.
///
/// Reading starts right at spawn time in background tasks, which forward chunks into a bounded
/// channel. When that channel is full, the readers stop reading and the process's own pipe
/// buffer fills up, so a process nobody drains will eventually block on its next write.
/// Call [MergedOutput::capture] or [MergedOutput::discard] early to prevent that.
///
/// End-of-stream is observed once every reader hit EOF, i.e. once the process (and any child it
/// passed the pipe on to) closed the write side.
pub struct MergedOutput {
    process_name: Cow<'static, str>,

    /// Tasks reading the pipe(s) and forwarding chunks. One on unix, two elsewhere.
    stream_readers: Vec<JoinHandle<()>>,

    /// Wrapped in an `Option` so that it can be moved into a drain task exactly once.
    receiver: Option<ChunkReceiver>,
}

impl Drop for MergedOutput {
    fn drop(&mut self) {
        for reader in &self.stream_readers {
            reader.abort();
        }
    }
}

impl Debug for MergedOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedOutput")
            .field("process_name", &self.process_name)
            .field("stream_readers", &self.stream_readers.len())
            .field(
                "receiver",
                &"non-debug < tokio::sync::mpsc::Receiver<io::Result<bytes::Bytes>> >",
            )
            .finish()
    }
}

fn read_chunked<R: AsyncRead + Unpin + Send + 'static>(
    mut reader: R,
    chunk_size: usize,
    sender: ChunkSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = bytes::BytesMut::with_capacity(chunk_size);
        loop {
            buf.reserve(chunk_size);
            match reader.read_buf(&mut buf).await {
                Ok(0) => {
                    // EOF. Dropping our sender lets the drain observe end-of-stream once all
                    // readers are gone.
                    break;
                }
                Ok(_bytes_read) => {
                    if sender.send(Ok(buf.split().freeze())).await.is_err() {
                        // The drain was dropped. Nobody is interested in newer chunks anymore.
                        break;
                    }
                }
                Err(err) => {
                    let _ = sender.send(Err(err)).await;
                    break;
                }
            }
        }
    })
}

impl MergedOutput {
    /// Wires both output channels of `cmd` into one stream.
    ///
    /// Must be called before spawning. The returned [PendingOutput] has to be finished with
    /// [PendingOutput::start] after the spawn, and `cmd` must be dropped by then, as it holds the
    /// parent's copy of the pipe's write side. Otherwise, end-of-stream is never observed.
    pub(crate) fn wire(
        process_name: &Cow<'static, str>,
        cmd: &mut Command,
    ) -> Result<PendingOutput, LaunchError> {
        let pipe_err = |source: io::Error| LaunchError::PipeCreation {
            process_name: process_name.clone(),
            source,
        };

        #[cfg(unix)]
        {
            // A single pipe handed out as both stdout and stderr keeps the exact interleaving
            // the process produced.
            let (reader, writer) = io::pipe().map_err(pipe_err)?;
            let writer_clone = writer.try_clone().map_err(pipe_err)?;
            cmd.stdout(writer_clone);
            cmd.stderr(writer);
            Ok(PendingOutput::Pipe(reader))
        }

        #[cfg(not(unix))]
        {
            let _ = pipe_err;
            cmd.stdout(std::process::Stdio::piped());
            cmd.stderr(std::process::Stdio::piped());
            Ok(PendingOutput::Separate)
        }
    }

    /// Whether this output was not yet handed to a drain.
    pub fn is_available(&self) -> bool {
        self.receiver.is_some()
    }

    fn take_receiver(&mut self) -> Result<ChunkReceiver, CollectError> {
        self.receiver.take().ok_or_else(|| CollectError::AlreadyTaken {
            process_name: self.process_name.clone(),
        })
    }

    /// Starts draining the output to end-of-stream, keeping every byte.
    #[must_use = "If not at least assigned to a variable, the return value will be dropped immediately, which in turn cancels the drain task and leaves the output undrained."]
    pub fn capture(&mut self) -> Result<Drain, CollectError> {
        let receiver = self.take_receiver()?;
        Ok(Drain::spawn(self.process_name.clone(), receiver, true))
    }

    /// Starts draining the output to end-of-stream, only counting bytes.
    ///
    /// This keeps a process from blocking on a full pipe when its output is of no interest.
    #[must_use = "If not at least assigned to a variable, the return value will be dropped immediately, which in turn cancels the drain task and leaves the output undrained."]
    pub fn discard(&mut self) -> Result<Drain, CollectError> {
        let receiver = self.take_receiver()?;
        Ok(Drain::spawn(self.process_name.clone(), receiver, false))
    }

    pub(crate) fn from_readers(
        process_name: Cow<'static, str>,
        readers: Vec<Box<dyn AsyncRead + Unpin + Send>>,
        chunk_size: usize,
        channel_capacity: usize,
    ) -> Self {
        let (sender, receiver) = tokio::sync::mpsc::channel(channel_capacity);
        let stream_readers = readers
            .into_iter()
            .map(|reader| read_chunked(reader, chunk_size, sender.clone()))
            .collect();
        Self {
            process_name,
            stream_readers,
            receiver: Some(receiver),
        }
    }
}

/// Output wiring that was set up on a command but not yet attached to its spawned child.
pub(crate) enum PendingOutput {
    #[cfg(unix)]
    Pipe(io::PipeReader),
    #[cfg(not(unix))]
    Separate,
}

impl PendingOutput {
    pub(crate) fn start(
        self,
        process_name: Cow<'static, str>,
        child: &mut tokio::process::Child,
        chunk_size: usize,
        channel_capacity: usize,
    ) -> Result<MergedOutput, LaunchError> {
        let readers: Vec<Box<dyn AsyncRead + Unpin + Send>> = match self {
            #[cfg(unix)]
            PendingOutput::Pipe(reader) => {
                let _ = &child;
                let fd = std::os::fd::OwnedFd::from(reader);
                let receiver = tokio::net::unix::pipe::Receiver::from_owned_fd(fd).map_err(
                    |source| LaunchError::PipeCreation {
                        process_name: process_name.clone(),
                        source,
                    },
                )?;
                vec![Box::new(receiver)]
            }
            #[cfg(not(unix))]
            PendingOutput::Separate => {
                let mut readers: Vec<Box<dyn AsyncRead + Unpin + Send>> = Vec::with_capacity(2);
                if let Some(stdout) = child.stdout.take() {
                    readers.push(Box::new(stdout));
                }
                if let Some(stderr) = child.stderr.take() {
                    readers.push(Box::new(stderr));
                }
                readers
            }
        };
        Ok(MergedOutput::from_readers(
            process_name,
            readers,
            chunk_size,
            channel_capacity,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::time::sleep;

    #[tokio::test]
    async fn chunks_from_all_readers_end_up_in_one_stream() {
        let (out_read, mut out_write) = tokio::io::duplex(64);
        let (err_read, mut err_write) = tokio::io::duplex(64);
        let mut output = MergedOutput::from_readers(
            "test".into(),
            vec![Box::new(out_read), Box::new(err_read)],
            DEFAULT_CHUNK_SIZE,
            DEFAULT_CHANNEL_CAPACITY,
        );

        let drain = output.capture().unwrap();

        out_write.write_all(b"from stdout\n").await.unwrap();
        sleep(Duration::from_millis(50)).await;
        err_write.write_all(b"from stderr\n").await.unwrap();
        drop(out_write);
        drop(err_write);

        let captured = drain.wait(Duration::from_secs(5)).await.unwrap();
        assert_that(captured.reached_eof).is_true();
        assert_that(captured.text()).is_equal_to("from stdout\nfrom stderr\n");
    }

    #[tokio::test]
    async fn output_can_only_be_drained_once() {
        let (read, _write) = tokio::io::duplex(64);
        let mut output = MergedOutput::from_readers(
            "once".into(),
            vec![Box::new(read)],
            DEFAULT_CHUNK_SIZE,
            DEFAULT_CHANNEL_CAPACITY,
        );

        let _drain = output.discard().unwrap();
        assert_that(output.is_available()).is_false();

        match output.capture() {
            Err(CollectError::AlreadyTaken { process_name }) => {
                assert_that(process_name).is_equal_to("once");
            }
            other => panic!("Expected AlreadyTaken, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn small_chunk_sizes_do_not_lose_data() {
        let (read, mut write) = tokio::io::duplex(8);
        let mut output =
            MergedOutput::from_readers("small".into(), vec![Box::new(read)], 3, 1);

        let drain = output.capture().unwrap();
        let producer = tokio::spawn(async move {
            for line in ["ADDPACKAGE pkg1.bpkg\n", "PACKAGES\n", "QUIT\n"] {
                write.write_all(line.as_bytes()).await.unwrap();
            }
        });
        producer.await.unwrap();

        let captured = drain.wait(Duration::from_secs(5)).await.unwrap();
        assert_that(captured.text()).is_equal_to("ADDPACKAGE pkg1.bpkg\nPACKAGES\nQUIT\n");
        assert_that(captured.total_bytes).is_equal_to(35);
    }
}
