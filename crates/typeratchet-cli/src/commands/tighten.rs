//! `tighten`: re-derive the tightest configuration and compare it with the
//! persisted one
//!
//! The file generation pipeline is deterministic and the persisted
//! configuration is known to pass before the comparison runs, so any
//! difference between the freshly derived configuration and the file can
//! only make the file tighter.

use std::path::Path;

use typeratchet_core::catalog::RuleCatalog;
use typeratchet_core::config::{MypyConfig, configs_equal, has_autogenerated_marker};
use typeratchet_core::engine::TighteningEngine;
use typeratchet_core::error::{RatchetError, RatchetResult};
use typeratchet_core::oracle::{CheckOracle, MypyOracle};
use typeratchet_core::own_config::ProjectConfig;

use super::MYPY_CONFIG_FILE;
use crate::console::CliConsole;

pub fn run(console: &CliConsole, error_if_can_tighten: bool) -> RatchetResult<i32> {
    let project_root = Path::new(".");
    let config_path = project_root.join(MYPY_CONFIG_FILE);

    let current_text = match std::fs::read_to_string(&config_path) {
        Ok(text) => text,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            console.error(
                "Cannot tighten mypy config: no mypy.ini was found in the current directory.",
            );
            return Ok(1);
        }
        Err(error) => return Err(error.into()),
    };

    // Tightening arbitrary hand-written mypy.ini files is unsupported.
    if !has_autogenerated_marker(&current_text) {
        console.error(
            "Cannot tighten mypy config: the mypy.ini file does not appear to have been \
             generated by typeratchet and is therefore unsupported.",
        );
        return Ok(1);
    }

    let catalog = RuleCatalog::standard()?;
    let current = MypyConfig::parse(&current_text, &catalog)?;
    let project = ProjectConfig::load(project_root, &catalog)?;
    let oracle = MypyOracle::new(&catalog, project_root);
    let engine = TighteningEngine::new(&catalog, &oracle, project);

    console.step("Validating the existing mypy.ini against the current sources. Please wait...");
    let report = oracle.check(&current)?;
    if !report.passed {
        return Err(RatchetError::stale_config(report.raw_output));
    }

    console.step("Searching for the tightest passing configuration. Please wait...");
    let tightest = engine.tightest()?;
    let tightest_text = tightest.render(&catalog);

    if configs_equal(&current_text, &tightest_text) {
        console.success("Success: the current mypy config is already the tightest available.");
        return Ok(0);
    }

    if error_if_can_tighten {
        console.error(
            "The current mypy.ini does not contain the tightest available configuration:",
        );
        console.plain(&tightest_text);
        return Ok(1);
    }

    console.step(&format!(
        "Found a tighter mypy configuration ({} lines), updating your mypy.ini file.",
        tightest_text.lines().count()
    ));
    std::fs::write(&config_path, &tightest_text)?;
    console.success("Your mypy.ini file has been updated. Happy type-safe coding!");
    Ok(0)
}
