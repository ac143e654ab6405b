use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One harness-driven test case: launch, inject, terminate, collect, compare.
///
/// Scenarios are independent of each other, except that they share the filesystem and the
/// network port the target listens on. The latter is why they never run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Human-readable name, usable to select scenarios from the command line.
    pub name: String,

    /// Configuration file of the instance acting as server.
    pub server_config: PathBuf,

    /// Configuration file of the instance acting as client.
    pub client_config: PathBuf,

    /// Commands typed into the client, in order. `QUIT` is appended by the harness.
    pub client_commands: Vec<String>,

    /// Commands typed into the server before the client gets any. `QUIT` is appended by the
    /// harness.
    #[serde(default)]
    pub server_commands: Vec<String>,

    /// Where the client's captured output is written. Overwritten on every run.
    pub output: PathBuf,

    /// The golden file `output` must match.
    pub expected: PathBuf,

    /// Where the server's output is written. When absent, it is drained and discarded.
    #[serde(default)]
    pub server_output: Option<PathBuf>,
}

impl Scenario {
    /// Starts a scenario between the default configurations, with output written next to its
    /// golden file.
    pub fn new(name: impl Into<String>, dir: impl AsRef<Path>, stem: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            name: name.into(),
            server_config: PathBuf::from("config2.cfg"),
            client_config: PathBuf::from("config1.cfg"),
            client_commands: Vec::new(),
            server_commands: Vec::new(),
            output: dir.join(format!("{stem}.out")),
            expected: dir.join(format!("{stem}.expected")),
            server_output: None,
        }
    }

    pub fn client_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.client_commands = commands.into_iter().map(Into::into).collect();
        self
    }

    pub fn server_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.server_commands = commands.into_iter().map(Into::into).collect();
        self
    }

    pub fn server_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.server_output = Some(path.into());
        self
    }

    pub fn configs(mut self, server: impl Into<PathBuf>, client: impl Into<PathBuf>) -> Self {
        self.server_config = server.into();
        self.client_config = client.into();
        self
    }
}

/// An ordered list of scenarios.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Suite {
    #[serde(rename = "scenario", default)]
    pub scenarios: Vec<Scenario>,
}

impl Suite {
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// The package and peer command suite for the `btide` target.
    pub fn btide() -> Self {
        let scenarios = vec![
            Scenario::new("basic package commands", "part2_tests/test01", "test1")
                .client_commands([
                    "ADDPACKAGE pkg1.bpkg",
                    "PACKAGES",
                    "REMPACKAGE 5105d1a7ffb",
                    "PACKAGES",
                    "REMPACKAGE 3cf007c14ded16ab85d168fcf9d9b20effef7a0b8f89524d72eeaea97832a3193f9aa9528ebd0",
                    "PACKAGES",
                ]),
            Scenario::new("basic peer commands", "part2_tests/test02", "test2").client_commands([
                "PEERS",
                "CONNECT 127.0.0.1:9856",
                "PEERS",
                "DISCONNECT 127.0.0.1:9856",
                "PEERS",
            ]),
            Scenario::new("already connected to peer", "part2_tests/test03", "test3")
                .client_commands([
                    "CONNECT 127.0.0.1:9856",
                    "CONNECT 127.0.0.1:9856",
                    "PEERS",
                ]),
            Scenario::new("fetch data the peer does not have", "part2_tests/test04", "test4")
                .client_commands([
                    "CONNECT 127.0.0.1:9856",
                    "ADDPACKAGE pkg3.bpkg",
                    "FETCH 127.0.0.1:9856 5105d1a7ffbde836fe5aaa6704ecc751857561c6073 2c87207bc909188bb45904db002f7eb6da05e5d3031fbf0834a230d1d3691c61",
                ]),
            Scenario::new("request a chunk that does not exist", "part2_tests/test05", "test5")
                .client_commands([
                    "CONNECT 127.0.0.1:9856",
                    "ADDPACKAGE pkg3.bpkg",
                    "FETCH 127.0.0.1:9856 5105d1a7ffbde836fe5aaa6704ecc751857561c6073 2c8721abc90918ajh45904db002f7eb6da05f5d3031fbf0834a230d1d3691c61",
                ]),
            Scenario::new("invalid commands", "part2_tests/test06", "test6")
                .client_commands(["", "RANDOM COMMANDS"]),
            Scenario::new("valid fetch", "part2_tests/test07", "test7")
                .client_commands([
                    "CONNECT 127.0.0.1:9856",
                    "ADDPACKAGE pkg1.bpkg",
                    "FETCH 127.0.0.1:9856 3cf007c14ded16ab85d168fcf9d9b20effef7a0b8f89524d72eeaea97832a3193f9aa9528ebd0 c22250db8c3cdb65bc5e722dc408651cbb09a87ec3fb1f0555bb26a1fab96892",
                ])
                .server_commands(["ADDPACKAGE btide_test2/pkg1.bpkg"]),
        ];
        Self { scenarios }
    }

    /// Keeps only the scenarios named in `names`, preserving their position in the suite.
    ///
    /// Returns `(number, scenario)` pairs, numbered from 1 by their position in the full suite.
    pub fn select<'a>(&'a self, names: &[String]) -> Vec<(usize, &'a Scenario)> {
        self.scenarios
            .iter()
            .enumerate()
            .map(|(index, scenario)| (index + 1, scenario))
            .filter(|(_, scenario)| names.is_empty() || names.contains(&scenario.name))
            .collect()
    }
}
