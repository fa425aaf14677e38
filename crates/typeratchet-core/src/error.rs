//! Error types for typeratchet

use thiserror::Error;

use crate::oracle::Diagnostic;

/// Result type alias for typeratchet operations
pub type RatchetResult<T> = Result<T, RatchetError>;

/// Main error type for typeratchet
#[derive(Error, Debug, Clone)]
pub enum RatchetError {
    /// Configuration related errors (own config, catalog, file state)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The project fails mypy even with only the non-negotiable checks enabled
    #[error(
        "mypy reported errors under the baseline (non-negotiable) checks. These checks cannot \
         be relaxed; please fix the reported errors and run again.\nmypy output:\n{output}"
    )]
    BaselineFailure { output: String },

    /// Mypy reported errors that do not map to any rule this tool knows how to relax
    #[error(
        "mypy reported errors that do not correspond to any relaxable check:\n{}",
        format_diagnostics(.diagnostics)
    )]
    UnknownViolation { diagnostics: Vec<Diagnostic> },

    /// The narrowed configuration still failed its validation run
    #[error(
        "the generated configuration unexpectedly failed validation. This is a bug in \
         typeratchet; please report it along with this output.\nAttempted \
         configuration:\n{config_text}\nmypy output:\n{output}"
    )]
    ValidationFailed { config_text: String, output: String },

    /// The persisted mypy.ini no longer passes against the current sources
    #[error(
        "mypy found errors with the current mypy.ini. Please fix these errors, or regenerate \
         the file with `typeratchet init --overwrite`.\nmypy output:\n{output}"
    )]
    StaleConfig { output: String },

    /// Failures running the checker or making sense of its output
    #[error("mypy runner error: {0}")]
    Oracle(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// A file path or section name did not yield a valid dotted module path
    #[error("Invalid module name: {0}")]
    InvalidModuleName(String),
}

impl RatchetError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new baseline failure carrying the raw checker output
    pub fn baseline_failure(output: impl Into<String>) -> Self {
        Self::BaselineFailure {
            output: output.into(),
        }
    }

    /// Create a new unknown-violation error from the unclassifiable diagnostics
    pub fn unknown_violation(diagnostics: Vec<Diagnostic>) -> Self {
        Self::UnknownViolation { diagnostics }
    }

    /// Create a new validation failure carrying the attempted configuration
    pub fn validation_failed(config_text: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ValidationFailed {
            config_text: config_text.into(),
            output: output.into(),
        }
    }

    /// Create a new stale-config error
    pub fn stale_config(output: impl Into<String>) -> Self {
        Self::StaleConfig {
            output: output.into(),
        }
    }

    /// Create a new oracle error
    pub fn oracle(message: impl Into<String>) -> Self {
        Self::Oracle(message.into())
    }

    /// Create a new invalid module name error
    pub fn invalid_module_name(message: impl Into<String>) -> Self {
        Self::InvalidModuleName(message.into())
    }
}

impl From<std::io::Error> for RatchetError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|diagnostic| format!("  {diagnostic}"))
        .collect::<Vec<_>>()
        .join("\n")
}
