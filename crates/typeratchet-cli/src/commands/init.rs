//! `init`: generate an initial mypy.ini for the project

use std::path::Path;

use typeratchet_core::catalog::{RuleCatalog, WARN_UNUSED_IGNORES};
use typeratchet_core::config::MypyConfig;
use typeratchet_core::engine::TighteningEngine;
use typeratchet_core::error::RatchetResult;
use typeratchet_core::oracle::MypyOracle;
use typeratchet_core::own_config::ProjectConfig;

use super::MYPY_CONFIG_FILE;
use crate::console::CliConsole;

pub fn run(console: &CliConsole, overwrite: bool) -> RatchetResult<i32> {
    let project_root = Path::new(".");
    let config_path = project_root.join(MYPY_CONFIG_FILE);

    if config_path.exists() {
        if overwrite {
            console.step(
                "A mypy.ini file already exists and will be overwritten since '--overwrite' \
                 was set.",
            );
        } else {
            console.error(
                "A mypy.ini file already exists and cannot be overwritten since '--overwrite' \
                 was not set. Please either move or rename the file, or pass '--overwrite'.",
            );
            return Ok(1);
        }
    }

    let catalog = RuleCatalog::standard()?;
    let project = ProjectConfig::load(project_root, &catalog)?;
    let oracle = MypyOracle::new(&catalog, project_root);
    let engine = TighteningEngine::new(&catalog, &oracle, project);

    console.step(
        "Running mypy once with the non-negotiable baseline checks to establish a baseline. \
         Please wait...",
    );
    engine.check_baseline()?;

    console.step(
        "Collecting mypy errors from the strictest check configuration and narrowing it down. \
         Please wait...",
    );
    let config = engine.tighten_from_strict()?;
    describe(console, &config);

    std::fs::write(&config_path, config.render(&catalog))?;
    console.success(
        "Validation complete. Your mypy.ini file has been updated. Happy type-safe coding!",
    );
    Ok(0)
}

fn describe(console: &CliConsole, config: &MypyConfig) {
    if !config.suppressed_stub_modules.is_empty() {
        console.step(
            "Mypy was unable to find type hints for some 3rd party modules; mypy was \
             configured to ignore them.",
        );
        console.plain(&format!(
            "    Affected modules: {:?}\n",
            config.suppressed_stub_modules.iter().collect::<Vec<_>>()
        ));
    }

    let suppression_count: usize = config.module_overrides.values().map(|rules| rules.len()).sum();
    if suppression_count > 0 {
        console.step(&format!(
            "Constructed {suppression_count} mypy error suppression rules across {} modules.",
            config.module_overrides.len()
        ));
    }

    if !config.enabled.contains(WARN_UNUSED_IGNORES) {
        console.step(
            "Mypy found 'type: ignore' comments that are no longer necessary; \
             warn_unused_ignores was disabled globally. Please strongly consider \
             removing them.",
        );
    }

    if suppression_count == 0
        && config.suppressed_stub_modules.is_empty()
        && config.enabled.contains(WARN_UNUSED_IGNORES)
    {
        console.step(
            "Strict run completed with no errors found. Your mypy.ini gets the strictest \
             settings supported by typeratchet. Congratulations and happy type-safe coding!",
        );
    }
}
