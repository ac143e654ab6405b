//! Drive two instances of a line-oriented peer-to-peer program (a "server" and a "client"), type
//! commands into them, shut them down and compare the client's merged output against a golden
//! file.
//!
//! A scenario goes through these steps:
//! 1. [Launcher::spawn] starts both instances, each with stdout and stderr merged into one stream.
//! 2. [inject] types the scenario's commands, server first.
//! 3. [send_quit] asks the client, then the server, to shut down.
//! 4. [collect] drains the client's output to end-of-stream, persists it, and awaits both exits.
//! 5. [compare] checks the persisted output against its golden file.
//!
//! [ScenarioRunner] runs a [Suite] of such scenarios strictly one after another.

mod collector;
mod config;
mod drain;
mod error;
mod golden;
mod injector;
mod launcher;
pub mod logging;
mod merged_output;
mod process_handle;
mod runner;
mod scenario;
mod signal;
mod termination;

pub use collector::{CollectedOutput, collect, persist};
pub use config::{ConfigError, HarnessConfig, Timeouts, load_suite};
pub use drain::{Captured, Drain};
pub use error::{
    CollectError, LaunchError, ScenarioError, TerminationError, WaitError, WriteError,
};
pub use golden::{Comparison, compare, compare_files, compare_text};
pub use injector::{inject, send_line};
pub use launcher::Launcher;
pub use merged_output::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHUNK_SIZE, MergedOutput};
pub use process_handle::{LifecycleState, TargetProcess};
pub use runner::{
    ProcessScenarioExecutor, RunReport, ScenarioExecutor, ScenarioFuture, ScenarioOutcome,
    ScenarioResult, ScenarioRunner,
};
pub use scenario::{Scenario, Suite};
pub use termination::{QUIT, send_quit, terminate_all};

#[cfg(test)]
mod test {
    use crate::{
        Comparison, Launcher, LifecycleState, ProcessScenarioExecutor, ScenarioExecutor,
        ScenarioRunner, Suite, Timeouts, collect, compare, inject, send_quit,
    };
    use assertr::prelude::*;
    use std::path::Path;
    use std::time::Duration;

    /// A peer that reports what it was told, including a message on stderr per unknown command.
    const PEER: &str = r#"count=0
while IFS= read -r line; do
  case "$line" in
    QUIT) exit 0 ;;
    ADDPACKAGE*) count=$((count + 1)); echo "Package has been added" ;;
    PACKAGES) echo "Packages: $count" ;;
    *) echo "Invalid Input." >&2 ;;
  esac
done
"#;

    #[tokio::test]
    async fn full_scenario_by_hand() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("peer.cfg"), PEER).unwrap();
        std::fs::write(
            dir.path().join("test1.expected"),
            "Package has been added\nPackages: 1\nInvalid Input.\n",
        )
        .unwrap();
        let launcher = Launcher::new("sh").working_dir(dir.path());
        let timeouts = Timeouts::default();

        let mut server = launcher.spawn("server", Path::new("peer.cfg")).unwrap();
        let mut client = launcher.spawn("client", Path::new("peer.cfg")).unwrap();
        assert_that(client.state()).is_equal_to(LifecycleState::Running);
        let server_drain = server.output_mut().discard().unwrap();
        let client_drain = client.output_mut().capture().unwrap();

        let delivered = inject(
            &mut client,
            ["ADDPACKAGE pkg1.bpkg", "PACKAGES", "RANDOM COMMANDS"],
            timeouts.command_write,
        )
        .await
        .unwrap();
        assert_that(delivered).is_equal_to(3);
        send_quit(&mut [&mut client, &mut server], timeouts.command_write).await;

        let output = dir.path().join("test1.out");
        let collected = collect(
            &mut client,
            client_drain,
            &mut server,
            server_drain,
            &output,
            None,
            &timeouts,
        )
        .await
        .unwrap();

        assert_that(collected.client_status.success()).is_true();
        assert_that(collected.server.bytes.is_empty()).is_true();
        assert_that(compare(&output, &dir.path().join("test1.expected")).await)
            .is_equal_to(Comparison::Equal);
    }

    #[tokio::test]
    async fn suite_from_toml_runs_every_scenario() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config1.cfg"), PEER).unwrap();
        std::fs::write(dir.path().join("config2.cfg"), PEER).unwrap();
        std::fs::create_dir_all(dir.path().join("golden")).unwrap();
        std::fs::write(dir.path().join("golden/a.expected"), "Packages: 0\n").unwrap();
        std::fs::write(dir.path().join("golden/b.expected"), "Packages: 2\n").unwrap();

        let suite: Suite = toml::from_str(
            r#"
            [[scenario]]
            name = "no packages"
            server_config = "config2.cfg"
            client_config = "config1.cfg"
            client_commands = ["PACKAGES"]
            output = "out/a.out"
            expected = "golden/a.expected"

            [[scenario]]
            name = "one package, two expected"
            server_config = "config2.cfg"
            client_config = "config1.cfg"
            client_commands = ["ADDPACKAGE pkg1.bpkg", "PACKAGES"]
            output = "out/b.out"
            expected = "golden/b.expected"
            "#,
        )
        .unwrap();
        let executor = ProcessScenarioExecutor::new(
            Launcher::new("sh").working_dir(dir.path()),
            dir.path(),
            Timeouts {
                output_drain: Duration::from_secs(5),
                ..Timeouts::default()
            },
        );

        let report = ScenarioRunner::new(executor)
            .run(&suite.select(&[]))
            .await;

        assert_that(report.to_string()).is_equal_to("Test 1: Passed\nTest 2: Failed\n");
        assert_that(report.exit_code()).is_equal_to(1);
        assert_that(std::fs::read_to_string(dir.path().join("out/b.out")).unwrap())
            .is_equal_to("Package has been added\nPackages: 1\n");
    }

    #[tokio::test]
    async fn executor_runs_a_single_scenario() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config1.cfg"), PEER).unwrap();
        std::fs::write(dir.path().join("config2.cfg"), PEER).unwrap();
        std::fs::create_dir_all(dir.path().join("part2_tests/test06")).unwrap();
        std::fs::write(
            dir.path().join("part2_tests/test06/test6.expected"),
            "Invalid Input.\nInvalid Input.\n",
        )
        .unwrap();
        let scenario = Suite::btide()
            .scenarios
            .into_iter()
            .find(|s| s.name == "invalid commands")
            .unwrap();
        let executor = ProcessScenarioExecutor::new(
            Launcher::new("sh").working_dir(dir.path()),
            dir.path(),
            Timeouts::default(),
        );

        let outcome = executor.execute(6, scenario).await;

        assert_that(outcome.is_passed()).is_true();
    }
}
