//! End-to-end tightening scenarios driven by a scripted checker
//!
//! The fake oracle models a project as a set of latent defects; each probe
//! reports exactly the defects the probed configuration can still see. This
//! mirrors how mypy behaves as enabled checks vary, without shelling out.

use std::cell::RefCell;
use std::collections::BTreeSet;

use typeratchet_core::catalog::{
    CHECK_UNTYPED_DEFS, DISALLOW_INCOMPLETE_DEFS, DISALLOW_UNTYPED_CALLS, DISALLOW_UNTYPED_DEFS,
    RuleCatalog, WARN_UNUSED_IGNORES,
};
use typeratchet_core::config::{MypyConfig, configs_equal};
use typeratchet_core::engine::TighteningEngine;
use typeratchet_core::error::{RatchetError, RatchetResult};
use typeratchet_core::oracle::{CheckOracle, CheckReport, Diagnostic};
use typeratchet_core::own_config::ProjectConfig;

/// A pretend project described by its latent defects
#[derive(Default)]
struct FakeProject {
    /// (module, rule) pairs: the module violates the rule whenever the rule
    /// is active for it
    rule_defects: Vec<(&'static str, &'static str)>,
    /// (importing module, third-party module) pairs where the import has no
    /// type stubs
    missing_stub_imports: Vec<(&'static str, &'static str)>,
    /// Modules carrying an unnecessary `type: ignore` comment
    unused_ignores: Vec<&'static str>,
    /// Modules with errors that fire under every configuration
    baseline_defects: Vec<&'static str>,
    /// (module, code, message) diagnostics outside the known rule mapping;
    /// these surface once `check_untyped_defs` is active for the module
    unknown_defects: Vec<(&'static str, &'static str, &'static str)>,
}

struct FakeOracle {
    project: FakeProject,
    checks: RefCell<u32>,
}

impl FakeOracle {
    fn new(project: FakeProject) -> Self {
        Self {
            project,
            checks: RefCell::new(0),
        }
    }

    fn check_count(&self) -> u32 {
        *self.checks.borrow()
    }
}

impl CheckOracle for FakeOracle {
    fn check(&self, config: &MypyConfig) -> RatchetResult<CheckReport> {
        *self.checks.borrow_mut() += 1;
        let mut diagnostics = Vec::new();

        for module in &self.project.baseline_defects {
            diagnostics.push(diagnostic(
                module,
                "assignment",
                "Incompatible types in assignment (expression has type \"str\", variable has \
                 type \"int\")",
            ));
        }
        for (module, code, message) in &self.project.unknown_defects {
            if config.rule_active_for(CHECK_UNTYPED_DEFS, module) {
                diagnostics.push(diagnostic(module, code, message));
            }
        }
        for (module, rule) in &self.project.rule_defects {
            if config.rule_active_for(rule, module) {
                let (code, message) = defect_signature(rule);
                diagnostics.push(diagnostic(module, code, &message));
            }
        }
        for (importer, missing) in &self.project.missing_stub_imports {
            if !config.stubs_suppressed_for(missing) {
                diagnostics.push(diagnostic(
                    importer,
                    "import",
                    &format!(
                        "Skipping analyzing '{missing}': found module but no type hints or \
                         library stubs"
                    ),
                ));
            }
        }

        // Mypy only reports unused ignores once every other check passes.
        if diagnostics.is_empty() && config.enabled.contains(WARN_UNUSED_IGNORES) {
            for module in &self.project.unused_ignores {
                diagnostics.push(Diagnostic {
                    file_path: file_for(module),
                    line: 1,
                    code: String::new(),
                    message: "unused 'type: ignore' comment".to_string(),
                });
            }
        }

        let passed = diagnostics.is_empty();
        let raw_output = if passed {
            "Success: no issues found in 10 source files".to_string()
        } else {
            let mut lines: Vec<String> = diagnostics
                .iter()
                .map(ToString::to_string)
                .collect();
            lines.push(format!("Found {} errors in 1 file", lines.len()));
            lines.join("\n")
        };

        Ok(CheckReport {
            passed,
            diagnostics,
            raw_output,
        })
    }
}

fn file_for(module: &str) -> String {
    format!("{}.py", module.replace('.', "/"))
}

fn diagnostic(module: &str, code: &str, message: &str) -> Diagnostic {
    Diagnostic {
        file_path: file_for(module),
        line: 7,
        code: code.to_string(),
        message: message.to_string(),
    }
}

fn defect_signature(rule: &str) -> (&'static str, String) {
    match rule {
        CHECK_UNTYPED_DEFS => ("misc", "Cannot determine type of \"value\"".to_string()),
        DISALLOW_UNTYPED_CALLS => (
            "no-untyped-call",
            "Call to untyped function \"helper\" in typed context".to_string(),
        ),
        DISALLOW_INCOMPLETE_DEFS => (
            "no-untyped-def",
            "Function is missing a type annotation for one or more arguments".to_string(),
        ),
        DISALLOW_UNTYPED_DEFS => (
            "no-untyped-def",
            "Function is missing a type annotation".to_string(),
        ),
        other => panic!("no defect signature for rule {other}"),
    }
}

fn run_tightest(project: FakeProject) -> (RuleCatalog, FakeOracle, MypyConfig) {
    let catalog = RuleCatalog::standard().unwrap();
    let oracle = FakeOracle::new(project);
    let config = {
        let engine = TighteningEngine::new(&catalog, &oracle, ProjectConfig::empty());
        engine.tightest().unwrap()
    };
    (catalog, oracle, config)
}

/// Every configuration the engine returns must pass its own re-check
fn assert_sound(catalog: &RuleCatalog, oracle: &FakeOracle, config: &MypyConfig) {
    let report = oracle.check(config).unwrap();
    assert!(report.passed, "produced configuration does not pass");
    config.validate(catalog).unwrap();
}

#[test]
fn test_clean_project_keeps_every_rule() {
    let (catalog, oracle, config) = run_tightest(FakeProject::default());

    assert_eq!(config.enabled, catalog.all_rule_names());
    assert!(config.module_overrides.is_empty());
    assert!(config.suppressed_stub_modules.is_empty());
    assert!(!config.blanket_ignore_missing_imports);
    assert_sound(&catalog, &oracle, &config);
}

#[test]
fn test_single_violation_narrows_only_that_module() {
    let (catalog, oracle, config) = run_tightest(FakeProject {
        rule_defects: vec![("pkg.views", CHECK_UNTYPED_DEFS)],
        ..FakeProject::default()
    });

    assert_eq!(
        config.module_overrides["pkg.views"],
        [CHECK_UNTYPED_DEFS].into_iter().collect::<BTreeSet<_>>()
    );
    assert_eq!(config.module_overrides.len(), 1);
    // every other module keeps the rule
    assert!(config.rule_active_for(CHECK_UNTYPED_DEFS, "pkg.models"));
    assert!(config.enabled.contains(CHECK_UNTYPED_DEFS));
    assert_sound(&catalog, &oracle, &config);
}

#[test]
fn test_dependent_rule_is_dragged_along() {
    let (catalog, oracle, config) = run_tightest(FakeProject {
        rule_defects: vec![("pkg.views", DISALLOW_INCOMPLETE_DEFS)],
        ..FakeProject::default()
    });

    let disabled = &config.module_overrides["pkg.views"];
    assert!(disabled.contains(DISALLOW_INCOMPLETE_DEFS));
    assert!(disabled.contains(DISALLOW_UNTYPED_DEFS));
    assert_sound(&catalog, &oracle, &config);
}

#[test]
fn test_missing_stubs_are_suppressed_and_stay_suppressed() {
    let (catalog, oracle, config) = run_tightest(FakeProject {
        missing_stub_imports: vec![
            ("pkg.app", "requests"),
            ("pkg.app", "requests.adapters"),
            ("pkg.other", "leftpad"),
        ],
        ..FakeProject::default()
    });

    // minimum covering keeps the ancestor only
    assert_eq!(
        config.suppressed_stub_modules,
        ["leftpad".to_string(), "requests".to_string()]
            .into_iter()
            .collect::<BTreeSet<_>>()
    );
    // once suppressed, a further probe reports nothing for those modules
    let report = oracle.check(&config).unwrap();
    assert!(report.diagnostics.is_empty());
    assert_sound(&catalog, &oracle, &config);
}

#[test]
fn test_baseline_failure_is_fatal() {
    let catalog = RuleCatalog::standard().unwrap();
    let oracle = FakeOracle::new(FakeProject {
        baseline_defects: vec!["pkg.core"],
        ..FakeProject::default()
    });
    let engine = TighteningEngine::new(&catalog, &oracle, ProjectConfig::empty());

    let result = engine.tightest();
    assert!(matches!(result, Err(RatchetError::BaselineFailure { .. })));
    // the run stops at the baseline check
    assert_eq!(oracle.check_count(), 1);
}

#[test]
fn test_unknown_error_code_is_fatal() {
    let catalog = RuleCatalog::standard().unwrap();
    let oracle = FakeOracle::new(FakeProject {
        unknown_defects: vec![(
            "pkg.app",
            "attr-defined",
            "\"Widget\" has no attribute \"frob\"",
        )],
        ..FakeProject::default()
    });
    let engine = TighteningEngine::new(&catalog, &oracle, ProjectConfig::empty());

    match engine.tightest() {
        Err(RatchetError::UnknownViolation { diagnostics }) => {
            assert_eq!(diagnostics.len(), 1);
            assert_eq!(diagnostics[0].code, "attr-defined");
        }
        other => panic!("expected UnknownViolation, got {other:?}"),
    }
}

#[test]
fn test_unused_ignores_disable_the_warning_globally() {
    let (catalog, oracle, config) = run_tightest(FakeProject {
        rule_defects: vec![("pkg.views", CHECK_UNTYPED_DEFS)],
        unused_ignores: vec!["pkg.legacy"],
        ..FakeProject::default()
    });

    assert!(!config.enabled.contains(WARN_UNUSED_IGNORES));
    // the other rules are unaffected
    assert!(config.enabled.contains(DISALLOW_UNTYPED_DEFS));
    assert_sound(&catalog, &oracle, &config);
}

#[test]
fn test_clean_project_keeps_unused_ignore_warning_enabled() {
    let (_, _, config) = run_tightest(FakeProject::default());
    assert!(config.enabled.contains(WARN_UNUSED_IGNORES));
}

#[test]
fn test_runs_are_deterministic_byte_for_byte() {
    let project = || FakeProject {
        rule_defects: vec![
            ("pkg.views", CHECK_UNTYPED_DEFS),
            ("pkg.api", DISALLOW_UNTYPED_CALLS),
            ("pkg.api.handlers", DISALLOW_INCOMPLETE_DEFS),
        ],
        missing_stub_imports: vec![("pkg.app", "requests")],
        unused_ignores: vec!["pkg.legacy"],
        ..FakeProject::default()
    };

    let (catalog_a, _, config_a) = run_tightest(project());
    let (_, _, config_b) = run_tightest(project());
    assert_eq!(config_a.render(&catalog_a), config_b.render(&catalog_a));
}

#[test]
fn test_tightest_config_round_trips_and_compares_equal() {
    let (catalog, _, config) = run_tightest(FakeProject {
        rule_defects: vec![("pkg.views", DISALLOW_INCOMPLETE_DEFS)],
        missing_stub_imports: vec![("pkg.app", "requests")],
        ..FakeProject::default()
    });

    let rendered = config.render(&catalog);
    let reparsed = MypyConfig::parse(&rendered, &catalog).unwrap();
    assert_eq!(reparsed, config);
    // the comparison `tighten` relies on sees them as the same config
    assert!(configs_equal(&rendered, &reparsed.render(&catalog)));
}

#[test]
fn test_stale_configuration_no_longer_passes() {
    // A configuration claiming full strictness, persisted before the defect
    // below crept into the project, fails its re-validation probe.
    let catalog = RuleCatalog::standard().unwrap();
    let strict = MypyConfig {
        enabled: catalog.all_rule_names(),
        ..MypyConfig::default()
    };
    let oracle = FakeOracle::new(FakeProject {
        rule_defects: vec![("pkg.views", CHECK_UNTYPED_DEFS)],
        ..FakeProject::default()
    });

    let report = oracle.check(&strict).unwrap();
    assert!(!report.passed);
}

#[test]
fn test_mixed_project_narrows_each_concern_independently() {
    let (catalog, oracle, config) = run_tightest(FakeProject {
        rule_defects: vec![
            ("pkg.views", CHECK_UNTYPED_DEFS),
            ("pkg.api", DISALLOW_UNTYPED_CALLS),
        ],
        missing_stub_imports: vec![("pkg.app", "requests")],
        ..FakeProject::default()
    });

    assert_eq!(
        config.module_overrides["pkg.views"],
        [CHECK_UNTYPED_DEFS].into_iter().collect::<BTreeSet<_>>()
    );
    assert_eq!(
        config.module_overrides["pkg.api"],
        [DISALLOW_UNTYPED_CALLS].into_iter().collect::<BTreeSet<_>>()
    );
    assert!(config.suppressed_stub_modules.contains("requests"));
    // overrides narrow, they never disable a rule globally
    assert!(config.enabled.contains(CHECK_UNTYPED_DEFS));
    assert!(config.enabled.contains(DISALLOW_UNTYPED_CALLS));
    assert_sound(&catalog, &oracle, &config);
}
