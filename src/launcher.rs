//! Builder API for spawning target-program instances.

use crate::error::LaunchError;
use crate::merged_output::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHUNK_SIZE, MergedOutput};
use crate::process_handle::TargetProcess;
use std::borrow::Cow;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Launches instances of the target program, one per configuration file.
///
/// Every instance is started as `<program> <config-file>`, with its input as a pipe owned by
/// the harness and its stdout and stderr merged into a single capturable stream.
///
/// # Examples
///
/// ```no_run
/// use peer_harness::Launcher;
/// use std::path::Path;
///
/// # async fn launch() -> Result<(), peer_harness::LaunchError> {
/// let server = Launcher::new("./btide")
///     .working_dir("fixtures")
///     .spawn("server", Path::new("config2.cfg"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Launcher {
    program: PathBuf,
    working_dir: Option<PathBuf>,
    chunk_size: usize,
    channel_capacity: usize,
}

impl Launcher {
    /// Creates a launcher for `program`.
    ///
    /// A bare name (`btide`) is looked up in `PATH`. A relative path (`./btide`) is resolved
    /// against the working directory, if one is set.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            working_dir: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Sets the directory every instance is started in.
    ///
    /// Relative configuration paths are interpreted by the target relative to this directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the size of a single read from the output pipe.
    ///
    /// Default is [DEFAULT_CHUNK_SIZE].
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sets how many chunks may be buffered before reading the output pipe pauses.
    ///
    /// Default is [DEFAULT_CHANNEL_CAPACITY].
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The program as it will be handed to the OS.
    ///
    /// Whether a relative path with a separator is resolved against the parent's or the child's
    /// directory is platform-specific, so we resolve it ourselves. The working directory is made
    /// absolute first: the child changes into it before the program is looked up.
    fn resolved_program(&self) -> io::Result<PathBuf> {
        let has_separator = self.program.components().count() > 1;
        match &self.working_dir {
            Some(dir) if has_separator && self.program.is_relative() => {
                Ok(std::path::absolute(dir)?.join(&self.program))
            }
            _ => Ok(self.program.clone()),
        }
    }

    /// Spawns one instance with `config` as its sole argument.
    pub fn spawn(
        &self,
        name: impl Into<Cow<'static, str>>,
        config: &Path,
    ) -> Result<TargetProcess, LaunchError> {
        let name = name.into();
        let program = self
            .resolved_program()
            .map_err(|source| LaunchError::SpawnFailed {
                process_name: name.clone(),
                source,
            })?;

        let mut cmd = Command::new(&program);
        cmd.arg(config)
            .stdin(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        let pending_output = MergedOutput::wire(&name, &mut cmd)?;

        let spawned = cmd.spawn();
        // `cmd` still holds our copy of the output pipe's write side. It has to go before the
        // output is read, or end-of-stream would never be observed.
        drop(cmd);

        let mut child = spawned.map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => LaunchError::ProgramNotFound {
                process_name: name.clone(),
                program: program.clone(),
                source,
            },
            io::ErrorKind::PermissionDenied => LaunchError::NotExecutable {
                process_name: name.clone(),
                program: program.clone(),
                source,
            },
            _ => LaunchError::SpawnFailed {
                process_name: name.clone(),
                source,
            },
        })?;

        tracing::debug!(
            process = %name,
            program = %program.display(),
            config = %config.display(),
            pid = ?child.id(),
            "Launched target process"
        );

        let output =
            pending_output.start(name.clone(), &mut child, self.chunk_size, self.channel_capacity)?;
        Ok(TargetProcess::new(name, child, output))
    }
}
