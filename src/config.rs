//! Harness configuration, loaded from TOML.
//!
//! ```toml
//! program = "./btide"
//! working_dir = "."
//!
//! [timeouts]
//! command_write = 5.0
//! output_drain = 30.0
//! process_exit = 10.0
//! kill_grace = 2.0
//!
//! [[scenario]]
//! name = "invalid commands"
//! # ...
//! ```

use crate::scenario::{Scenario, Suite};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

/// Upper bounds for every operation that waits on a target process.
///
/// Values are given in (fractional) seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    /// Delivering a single command into a process's input.
    #[serde(deserialize_with = "seconds")]
    pub command_write: Duration,

    /// Draining the client's output until the stream is closed.
    #[serde(deserialize_with = "seconds")]
    pub output_drain: Duration,

    /// Awaiting each process's exit after its output was collected.
    #[serde(deserialize_with = "seconds")]
    pub process_exit: Duration,

    /// Time given to a process after each termination signal.
    #[serde(deserialize_with = "seconds")]
    pub kill_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command_write: Duration::from_secs(5),
            output_drain: Duration::from_secs(30),
            process_exit: Duration::from_secs(10),
            kill_grace: Duration::from_secs(2),
        }
    }
}

fn default_program() -> PathBuf {
    PathBuf::from("./btide")
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Everything needed to run a suite against a target program.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// The target program. Relative paths are resolved against `working_dir`.
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Directory both instances run in, and the base for every relative scenario path.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    #[serde(default)]
    pub timeouts: Timeouts,

    /// Inline scenarios. When empty, a suite file or the built-in suite is used instead.
    #[serde(rename = "scenario", default)]
    pub scenarios: Vec<Scenario>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            working_dir: default_working_dir(),
            timeouts: Timeouts::default(),
            scenarios: Vec::new(),
        }
    }
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Resolves a scenario path against the working directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.working_dir.join(path)
    }

    /// The suite to run: inline scenarios if present, the built-in suite otherwise.
    pub fn suite(&self) -> Suite {
        if self.scenarios.is_empty() {
            Suite::btide()
        } else {
            Suite {
                scenarios: self.scenarios.clone(),
            }
        }
    }
}

/// Loads a standalone suite file.
pub fn load_suite(path: &Path) -> Result<Suite, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_owned(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: HarnessConfig = toml::from_str("").unwrap();

        assert_that(config.clone()).is_equal_to(HarnessConfig::default());
        assert_that(config.suite()).is_equal_to(Suite::btide());
    }

    #[test]
    fn timeouts_are_read_as_seconds() {
        let config: HarnessConfig = toml::from_str(
            r#"
            program = "/opt/btide/btide"
            working_dir = "/srv/tests"

            [timeouts]
            output_drain = 1.5
            kill_grace = 0.25
            "#,
        )
        .unwrap();

        assert_that(config.program).is_equal_to(PathBuf::from("/opt/btide/btide"));
        assert_that(config.timeouts.output_drain).is_equal_to(Duration::from_millis(1500));
        assert_that(config.timeouts.kill_grace).is_equal_to(Duration::from_millis(250));
        assert_that(config.timeouts.command_write).is_equal_to(Timeouts::default().command_write);
    }

    #[test]
    fn negative_timeouts_are_rejected() {
        let result = toml::from_str::<HarnessConfig>("[timeouts]\nprocess_exit = -1.0\n");

        assert_that(result.is_err()).is_true();
    }

    #[test]
    fn inline_scenarios_replace_the_built_in_suite() {
        let config: HarnessConfig = toml::from_str(
            r#"
            [[scenario]]
            name = "peers only"
            server_config = "server.cfg"
            client_config = "client.cfg"
            client_commands = ["PEERS"]
            output = "out/peers.out"
            expected = "golden/peers.expected"
            server_output = "out/server.out"
            "#,
        )
        .unwrap();

        let suite = config.suite();
        assert_that(suite.scenarios.len()).is_equal_to(1);
        let scenario = &suite.scenarios[0];
        assert_that(scenario.server_commands.is_empty()).is_true();
        assert_that(scenario.server_output.clone())
            .is_equal_to(Some(PathBuf::from("out/server.out")));
        assert_that(config.resolve(&scenario.output)).is_equal_to(PathBuf::from("./out/peers.out"));
    }

    #[test]
    fn missing_files_are_reported_with_their_path() {
        let result = HarnessConfig::load(Path::new("/nonexistent/harness.toml"));

        match result {
            Err(ConfigError::Read { path, .. }) => {
                assert_that(path).is_equal_to(PathBuf::from("/nonexistent/harness.toml"));
            }
            other => panic!("Expected a read error, got {other:?}"),
        }
    }
}
