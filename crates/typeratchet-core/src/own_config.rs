//! The tool's own configuration, read from the project's pyproject.toml
//!
//! A `[tool.typeratchet]` table may carry extra global mypy settings that are
//! appended verbatim to every generated configuration:
//!
//! ```toml
//! [tool.typeratchet.mypy_global_config]
//! mypy_path = "stubs"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::catalog::RuleCatalog;
use crate::error::{RatchetError, RatchetResult};

#[derive(Debug, Clone, Default, Deserialize)]
struct PyprojectFile {
    #[serde(default)]
    tool: ToolSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ToolSection {
    #[serde(default)]
    typeratchet: TyperatchetSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TyperatchetSection {
    #[serde(default)]
    mypy_global_config: BTreeMap<String, String>,
}

/// Project-level settings for this tool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Extra global mypy settings, appended verbatim to generated configs
    pub mypy_globals: BTreeMap<String, String>,
}

impl ProjectConfig {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse from pyproject.toml content
    pub fn from_toml_str(text: &str) -> RatchetResult<Self> {
        let file: PyprojectFile = toml::from_str(text)
            .map_err(|error| RatchetError::config(format!("invalid pyproject.toml: {error}")))?;
        Ok(Self {
            mypy_globals: file.tool.typeratchet.mypy_global_config,
        })
    }

    /// Locate and parse the nearest pyproject.toml above `search_path`.
    ///
    /// A missing file or missing `[tool.typeratchet]` table yields the empty
    /// config; an unreadable or invalid file is an error. User keys that
    /// collide with managed rule names are rejected, since they would make
    /// the tightening result ambiguous.
    pub fn load(search_path: &Path, catalog: &RuleCatalog) -> RatchetResult<Self> {
        let Some(pyproject_path) = find_pyproject_toml(search_path) else {
            return Ok(Self::empty());
        };

        let text = std::fs::read_to_string(&pyproject_path).map_err(|error| {
            RatchetError::config(format!(
                "failed to read {}: {error}",
                pyproject_path.display()
            ))
        })?;
        let config = Self::from_toml_str(&text).map_err(|error| {
            RatchetError::config(format!("in {}: {error}", pyproject_path.display()))
        })?;
        config.ensure_no_rule_collisions(catalog)?;
        tracing::debug!(path = %pyproject_path.display(), "loaded project config");
        Ok(config)
    }

    fn ensure_no_rule_collisions(&self, catalog: &RuleCatalog) -> RatchetResult<()> {
        for key in self.mypy_globals.keys() {
            if catalog.rule(key).is_some() || key == "ignore_missing_imports" {
                return Err(RatchetError::config(format!(
                    "pyproject.toml sets '{key}' in mypy_global_config, but that setting \
                     is managed by typeratchet and cannot be overridden there"
                )));
            }
        }
        Ok(())
    }
}

/// Walk from `search_path` upwards looking for a pyproject.toml, stopping at
/// the first directory that looks like a repository root.
pub fn find_pyproject_toml(search_path: &Path) -> Option<PathBuf> {
    let mut current = Some(search_path);
    while let Some(dir) = current {
        let candidate = dir.join("pyproject.toml");
        if candidate.is_file() {
            return Some(candidate);
        }
        if dir.join(".git").is_dir() || dir.join(".hg").is_dir() {
            return None;
        }
        current = dir.parent();
    }
    None
}
