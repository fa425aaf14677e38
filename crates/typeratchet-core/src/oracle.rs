//! Oracle adapter: runs mypy against a candidate configuration
//!
//! The tightening engine only ever sees the [`CheckOracle`] trait, so tests
//! can drive it with scripted oracles. The real implementation writes the
//! rendered configuration into a temporary directory and invokes `mypy`
//! blocking, one run at a time; each probe's result determines the next
//! probe's input, so there is nothing to parallelize.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use crate::catalog::RuleCatalog;
use crate::config::MypyConfig;
use crate::error::{RatchetError, RatchetResult};

/// One parsed failure line from the checker's output
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Diagnostic {
    pub file_path: String,
    pub line: u32,
    /// Mypy error code, e.g. `no-untyped-def`; empty for the codeless
    /// unused-ignore reports
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    /// Parse a `file:line: severity: message [code]` output line.
    ///
    /// Returns `Ok(None)` for `note:` lines, which are not errors.
    pub fn from_output_line(line: &str) -> RatchetResult<Option<Self>> {
        let mut parts = line.splitn(3, ':');
        let (file_part, line_part, rest) = match (parts.next(), parts.next(), parts.next()) {
            (Some(file), Some(line), Some(rest)) => (file, line, rest),
            _ => {
                return Err(RatchetError::oracle(format!(
                    "unparseable mypy output line: '{line}'"
                )));
            }
        };

        let file_path = file_part.trim().to_string();
        let line_number: u32 = line_part.trim().parse().map_err(|_| {
            RatchetError::oracle(format!("non-numeric line number in mypy output: '{line}'"))
        })?;

        let rest = rest.trim();
        if rest.starts_with("note:") {
            return Ok(None);
        }
        let rest = rest.strip_prefix("error:").map(str::trim).unwrap_or(rest);

        // The unused-ignore reports carry no [code] suffix.
        let (message, code) = match rest.rsplit_once('[') {
            Some((message, code)) => (
                message.trim().to_string(),
                code.trim().trim_end_matches(']').trim().to_string(),
            ),
            None => (rest.to_string(), String::new()),
        };

        Ok(Some(Self {
            file_path,
            line: line_number,
            code,
            message,
        }))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_empty() {
            write!(f, "{}:{}: {}", self.file_path, self.line, self.message)
        } else {
            write!(
                f,
                "{}:{}: {} [{}]",
                self.file_path, self.line, self.message, self.code
            )
        }
    }
}

/// Outcome of one checker run
#[derive(Debug, Clone)]
pub struct CheckReport {
    /// Whether the run exited cleanly (no violations)
    pub passed: bool,
    pub diagnostics: Vec<Diagnostic>,
    /// Raw checker stdout, kept for error reporting
    pub raw_output: String,
}

/// A pass/fail predicate over candidate configurations
pub trait CheckOracle {
    fn check(&self, config: &MypyConfig) -> RatchetResult<CheckReport>;
}

/// Turn a completed mypy run into a report.
///
/// Exit status 0 must end with a `Success:` summary and 1 with a `Found N
/// errors` summary; anything else means the run itself broke and no
/// conclusion about the configuration can be drawn.
pub fn report_from_run_output(
    exit_code: i32,
    stdout: &str,
    stderr: &str,
) -> RatchetResult<CheckReport> {
    let trimmed = stdout.trim();
    let last_line = trimmed.lines().last().unwrap_or("");

    match exit_code {
        0 => {
            if !last_line.starts_with("Success: no issues found") {
                return Err(RatchetError::oracle(format!(
                    "unexpected output for mypy exit code 0: '{trimmed}'"
                )));
            }
            Ok(CheckReport {
                passed: true,
                diagnostics: Vec::new(),
                raw_output: stdout.to_string(),
            })
        }
        1 => {
            if !(last_line.starts_with("Found ") && last_line.contains(" error")) {
                return Err(RatchetError::oracle(format!(
                    "unexpected output for mypy exit code 1. stdout: '{trimmed}', \
                     stderr: '{}'",
                    stderr.trim()
                )));
            }
            let mut diagnostics = Vec::new();
            let error_line_count = trimmed.lines().count().saturating_sub(1);
            for line in trimmed.lines().take(error_line_count) {
                if let Some(diagnostic) = Diagnostic::from_output_line(line)? {
                    diagnostics.push(diagnostic);
                }
            }
            Ok(CheckReport {
                passed: false,
                diagnostics,
                raw_output: stdout.to_string(),
            })
        }
        other => Err(RatchetError::oracle(format!(
            "unexpected mypy exit code {other}. stderr: '{}'",
            stderr.trim()
        ))),
    }
}

/// Oracle backed by the real `mypy` executable
pub struct MypyOracle<'a> {
    catalog: &'a RuleCatalog,
    project_root: PathBuf,
}

impl<'a> MypyOracle<'a> {
    pub fn new(catalog: &'a RuleCatalog, project_root: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            project_root: project_root.into(),
        }
    }
}

impl CheckOracle for MypyOracle<'_> {
    fn check(&self, config: &MypyConfig) -> RatchetResult<CheckReport> {
        let temp_dir = tempfile::Builder::new()
            .prefix("typeratchet-")
            .tempdir()?;
        let config_path = temp_dir.path().join("mypy.ini");
        let config_text = config.render(self.catalog);
        tracing::debug!(config = %config_text, "writing temporary mypy config");
        std::fs::write(&config_path, &config_text)?;

        let output = Command::new("mypy")
            .arg("--config-file")
            .arg(&config_path)
            .arg("--show-error-codes")
            .arg("--error-summary")
            .arg(".")
            .current_dir(&self.project_root)
            .output()
            .map_err(|error| {
                if error.kind() == std::io::ErrorKind::NotFound {
                    RatchetError::oracle(
                        "could not find the 'mypy' executable; is mypy installed and on PATH?",
                    )
                } else {
                    RatchetError::from(error)
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output
            .status
            .code()
            .ok_or_else(|| RatchetError::oracle("mypy was terminated by a signal"))?;
        tracing::debug!(exit_code, "mypy run completed");

        report_from_run_output(exit_code, &stdout, &stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_line_with_code() {
        let diagnostic = Diagnostic::from_output_line(
            "pkg/app.py:12: error: Function is missing a type annotation  [no-untyped-def]",
        )
        .unwrap()
        .unwrap();
        assert_eq!(diagnostic.file_path, "pkg/app.py");
        assert_eq!(diagnostic.line, 12);
        assert_eq!(diagnostic.code, "no-untyped-def");
        assert_eq!(diagnostic.message, "Function is missing a type annotation");
    }

    #[test]
    fn test_parse_error_line_without_code() {
        let diagnostic =
            Diagnostic::from_output_line("pkg/app.py:3: error: unused 'type: ignore' comment")
                .unwrap()
                .unwrap();
        assert_eq!(diagnostic.code, "");
        assert_eq!(diagnostic.message, "unused 'type: ignore' comment");
    }

    #[test]
    fn test_note_lines_are_skipped() {
        let parsed = Diagnostic::from_output_line(
            "pkg/app.py:12: note: Use \"-> None\" if function does not return a value",
        )
        .unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_garbage_line_is_an_error() {
        assert!(Diagnostic::from_output_line("something went wrong").is_err());
    }

    #[test]
    fn test_report_for_clean_exit() {
        let report =
            report_from_run_output(0, "Success: no issues found in 4 source files\n", "").unwrap();
        assert!(report.passed);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_report_for_clean_exit_with_wrong_summary_fails() {
        assert!(report_from_run_output(0, "no summary here\n", "").is_err());
    }

    #[test]
    fn test_report_for_failing_exit() {
        let stdout = "pkg/app.py:12: error: Function is missing a type annotation  \
                      [no-untyped-def]\n\
                      pkg/app.py:20: note: some note\n\
                      Found 1 error in 1 file (checked 4 source files)\n";
        let report = report_from_run_output(1, stdout, "").unwrap();
        assert!(!report.passed);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].code, "no-untyped-def");
    }

    #[test]
    fn test_report_for_failing_exit_without_summary_fails() {
        assert!(report_from_run_output(1, "pkg/app.py:12: error: boom  [misc]\n", "").is_err());
    }

    #[test]
    fn test_report_for_crash_exit_fails() {
        let result = report_from_run_output(2, "", "INTERNAL ERROR");
        assert!(result.is_err());
    }
}
