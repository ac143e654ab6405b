//! Comparing captured output against golden reference files.

use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};

/// The outcome of comparing an actual output file against its golden file.
///
/// Comparison never fails: an unreadable file is an expected outcome (e.g. the target crashed
/// before producing output) and simply means "not equal".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    /// Same number of lines, every line identical.
    Equal,

    /// The first difference, by 1-based line number.
    ///
    /// `None` on one side means that file ended before this line.
    Mismatch {
        line: usize,
        expected: Option<String>,
        actual: Option<String>,
    },

    /// One of the files could not be read.
    Unreadable { path: PathBuf, reason: String },
}

impl Comparison {
    pub fn is_equal(&self) -> bool {
        matches!(self, Comparison::Equal)
    }
}

impl Display for Comparison {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Comparison::Equal => write!(f, "outputs are equal"),
            Comparison::Mismatch {
                line,
                expected,
                actual,
            } => {
                let show = |l: &Option<String>| match l {
                    Some(l) => format!("{:?}", l),
                    None => "<end of file>".to_owned(),
                };
                write!(
                    f,
                    "line {line} differs: expected {}, got {}",
                    show(expected),
                    show(actual)
                )
            }
            Comparison::Unreadable { path, reason } => {
                write!(f, "could not read '{}': {reason}", path.display())
            }
        }
    }
}

/// Splits text into lines, each keeping its terminator.
///
/// Line endings are normalized the way universal-newline reading does: `\r\n` and a lone `\r`
/// both become `\n`. A last line without terminator stays distinguishable from one with it.
pub fn lines(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split_inclusive('\n')
        .map(str::to_owned)
        .collect()
}

/// Compares two texts line by line.
pub fn compare_text(actual: &str, expected: &str) -> Comparison {
    let actual = lines(actual);
    let expected = lines(expected);

    let longest = actual.len().max(expected.len());
    for index in 0..longest {
        let a = actual.get(index);
        let e = expected.get(index);
        if a != e {
            return Comparison::Mismatch {
                line: index + 1,
                expected: e.cloned(),
                actual: a.cloned(),
            };
        }
    }
    Comparison::Equal
}

async fn read_text(path: &Path) -> Result<String, Comparison> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) => {
            let reason = match err.kind() {
                io::ErrorKind::NotFound => "file does not exist".to_owned(),
                _ => err.to_string(),
            };
            tracing::warn!(path = %path.display(), %reason, "Could not read file for comparison");
            Err(Comparison::Unreadable {
                path: path.to_owned(),
                reason,
            })
        }
    }
}

/// Compares the file at `actual` against the golden file at `expected`.
pub async fn compare(actual: &Path, expected: &Path) -> Comparison {
    let actual_text = match read_text(actual).await {
        Ok(text) => text,
        Err(unreadable) => return unreadable,
    };
    let expected_text = match read_text(expected).await {
        Ok(text) => text,
        Err(unreadable) => return unreadable,
    };

    let comparison = compare_text(&actual_text, &expected_text);
    if let Comparison::Mismatch { .. } = &comparison {
        tracing::debug!(
            actual = %actual.display(),
            expected = %expected.display(),
            %comparison,
            "Output differs from golden file"
        );
    }
    comparison
}

/// Returns whether both files can be read and are equal.
pub async fn compare_files(actual: &Path, expected: &Path) -> bool {
    compare(actual, expected).await.is_equal()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;

    #[test]
    fn lines_keep_terminators_and_normalize_crlf() {
        assert_that(lines("a\r\nb\nc")).is_equal_to(vec![
            "a\n".to_owned(),
            "b\n".to_owned(),
            "c".to_owned(),
        ]);
        assert_that(lines("a\rb\r\n")).is_equal_to(vec!["a\n".to_owned(), "b\n".to_owned()]);
        assert_that(lines("")).is_empty();
    }

    #[test]
    fn compare_text_cases() {
        fn run_test_case(test_name: &str, actual: &str, expected: &str, result: Comparison) {
            assert_that(compare_text(actual, expected))
                .with_detail_message(format!("Test case: {test_name}"))
                .is_equal_to(result);
        }

        run_test_case("Both empty", "", "", Comparison::Equal);
        run_test_case(
            "Identical",
            "Package has been added\nPackages:\n",
            "Package has been added\nPackages:\n",
            Comparison::Equal,
        );
        run_test_case(
            "Line endings are normalized",
            "Connection established with peer\r\n",
            "Connection established with peer\n",
            Comparison::Equal,
        );
        run_test_case(
            "Lone carriage return ends a line",
            "Peers:\r1. 127.0.0.1:9856\n",
            "Peers:\n1. 127.0.0.1:9856\n",
            Comparison::Equal,
        );
        run_test_case(
            "Differing line",
            "Packages:\n1. 5105d1a7ff\n",
            "Packages:\n1. 5105d1a7ffb\n",
            Comparison::Mismatch {
                line: 2,
                expected: Some("1. 5105d1a7ffb\n".to_owned()),
                actual: Some("1. 5105d1a7ff\n".to_owned()),
            },
        );
        run_test_case(
            "Actual is missing a line",
            "Not connected to any peers\n",
            "Not connected to any peers\nConnection established with peer\n",
            Comparison::Mismatch {
                line: 2,
                expected: Some("Connection established with peer\n".to_owned()),
                actual: None,
            },
        );
        run_test_case(
            "Actual has an extra line",
            "Invalid Input.\nInvalid Input.\n",
            "Invalid Input.\n",
            Comparison::Mismatch {
                line: 2,
                expected: None,
                actual: Some("Invalid Input.\n".to_owned()),
            },
        );
        run_test_case(
            "Missing final newline",
            "Peers:\n",
            "Peers:",
            Comparison::Mismatch {
                line: 1,
                expected: Some("Peers:".to_owned()),
                actual: Some("Peers:\n".to_owned()),
            },
        );
    }

    #[tokio::test]
    async fn a_file_always_equals_itself() {
        let dir = tempfile::tempdir().unwrap();
        for (index, content) in ["", "single line", "Peers:\n1. 127.0.0.1:9856\n", "a\r\nb\n\n"]
            .into_iter()
            .enumerate()
        {
            let path = dir.path().join(format!("file{index}.out"));
            std::fs::write(&path, content).unwrap();
            assert_that(compare_files(&path, &path).await)
                .with_detail_message(format!("content: {content:?}"))
                .is_true();
        }
    }

    #[tokio::test]
    async fn missing_expected_file_is_not_equal() {
        let dir = tempfile::tempdir().unwrap();
        let actual = dir.path().join("test1.out");
        std::fs::write(&actual, "Packages:\n").unwrap();
        let expected = dir.path().join("test1.expected");

        let comparison = compare(&actual, &expected).await;

        assert_that(comparison.is_equal()).is_false();
        assert_that(comparison).is_equal_to(Comparison::Unreadable {
            path: expected.clone(),
            reason: "file does not exist".to_owned(),
        });
        assert_that(compare_files(&actual, &expected).await).is_false();
    }

    #[tokio::test]
    async fn missing_actual_file_is_not_equal() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("test2.expected");
        std::fs::write(&expected, "Packages:\n").unwrap();

        let comparison = compare(&dir.path().join("test2.out"), &expected).await;

        assert_that(matches!(comparison, Comparison::Unreadable { .. })).is_true();
    }

    #[test]
    fn mismatch_is_described_by_line() {
        let comparison = compare_text("PEERS\n", "Peers:\n");
        assert_that(comparison.to_string())
            .is_equal_to(r#"line 1 differs: expected "Peers:\n", got "PEERS\n""#);
    }
}
