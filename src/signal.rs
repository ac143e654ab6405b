use std::fmt::{Display, Formatter};
use std::io;
use tokio::process::Child;

/// The polite steps of the termination escalation. Killing is left to [Child::start_kill].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Escalation {
    /// SIGINT, as if the user pressed `Ctrl+C` in the target's terminal.
    Interrupt,

    /// SIGTERM, as if the OS asked the target to shut down.
    Terminate,
}

impl Display for Escalation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Escalation::Interrupt => write!(f, "SIGINT"),
            Escalation::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Delivers `step` to `child`. A child that was already reaped is left alone.
///
/// Fails with [io::ErrorKind::Unsupported] on non-unix platforms, so the caller escalates to a
/// kill right away.
pub(crate) fn deliver(child: &Child, step: Escalation) -> io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };

    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let signal = match step {
            Escalation::Interrupt => Signal::SIGINT,
            Escalation::Terminate => Signal::SIGTERM,
        };
        kill(Pid::from_raw(pid as i32), signal).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    {
        let _ = (pid, step);
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use assertr::prelude::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Stdio;
    use std::time::Duration;

    #[tokio::test]
    async fn each_step_delivers_its_signal() {
        for (step, signo) in [(Escalation::Interrupt, 2), (Escalation::Terminate, 15)] {
            let mut child = tokio::process::Command::new("sleep")
                .arg("30")
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .unwrap();

            deliver(&child, step).unwrap();
            let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
                .await
                .unwrap()
                .unwrap();

            assert_that(status.signal())
                .with_detail_message(format!("step: {step}"))
                .is_equal_to(Some(signo));
        }
    }

    #[tokio::test]
    async fn reaped_children_are_left_alone() {
        let mut child = tokio::process::Command::new("true").spawn().unwrap();
        child.wait().await.unwrap();

        assert_that(deliver(&child, Escalation::Terminate).is_ok()).is_true();
    }
}
