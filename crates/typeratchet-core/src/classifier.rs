//! Failure classifier: maps raw mypy diagnostics to the rules that caused them
//!
//! For each error code, the message substrings below identify the rule whose
//! relaxation hides the error, in order of decreasing selectivity (note that
//! the `no-untyped-def` substrings overlap). A diagnostic that matches no
//! mapping is kept verbatim as unknown; relaxing a check we cannot identify
//! would be unsafe, so unknowns are fatal further down the pipeline.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::catalog::{
    CHECK_UNTYPED_DEFS, DISALLOW_INCOMPLETE_DEFS, DISALLOW_UNTYPED_CALLS,
    DISALLOW_UNTYPED_DECORATORS, DISALLOW_UNTYPED_DEFS, WARN_UNUSED_IGNORES,
};
use crate::modules::{minimum_covering_modules, module_for_path};
use crate::oracle::Diagnostic;

static MISSING_TYPE_HINTS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^Skipping analyzing ["']([a-zA-Z0-9_\.]+)["']: found module but no type hints or library stubs"#,
    )
    .expect("invalid missing-type-hints pattern")
});

static MISSING_IMPLEMENTATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^Cannot find implementation or library stub for module named ["']([a-zA-Z0-9_\.]+)["']"#,
    )
    .expect("invalid missing-implementation pattern")
});

/// Structured view of one probe's diagnostics
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Per-module rule violations: rule -> modules where it failed
    pub rule_modules: BTreeMap<&'static str, BTreeSet<String>>,
    /// Rules violated without a per-module scope (`warn_unused_ignores`)
    pub global_rules: BTreeSet<&'static str>,
    /// Third-party modules missing type stubs, minimum-covered
    pub missing_stubs: BTreeSet<String>,
    /// Diagnostics that map to no known rule; always fatal downstream
    pub unknown: Vec<Diagnostic>,
}

impl Classification {
    /// True when the probe produced no violations of any kind
    pub fn is_clean(&self) -> bool {
        self.rule_modules.is_empty()
            && self.global_rules.is_empty()
            && self.missing_stubs.is_empty()
            && self.unknown.is_empty()
    }

    /// True when the only violations are global unused-ignore reports
    pub fn only_unused_ignores(&self) -> bool {
        !self.global_rules.is_empty()
            && self.rule_modules.is_empty()
            && self.missing_stubs.is_empty()
            && self.unknown.is_empty()
    }
}

/// Classify a probe's diagnostics into rule violations, missing-stub modules,
/// and unknowns.
pub fn classify(diagnostics: &[Diagnostic]) -> Classification {
    let mut classification = Classification::default();
    let mut stub_modules: BTreeSet<String> = BTreeSet::new();

    for diagnostic in diagnostics {
        match diagnostic.code.as_str() {
            "import" => match missing_stub_module(&diagnostic.message) {
                Some(module) => {
                    stub_modules.insert(module);
                }
                None => classification.unknown.push(diagnostic.clone()),
            },
            "misc" => {
                let rule = if diagnostic.message.contains("Untyped decorator") {
                    DISALLOW_UNTYPED_DECORATORS
                } else {
                    CHECK_UNTYPED_DEFS
                };
                record_rule_violation(&mut classification, rule, diagnostic);
            }
            "no-untyped-def" => {
                let rule = if diagnostic
                    .message
                    .contains("Function is missing a type annotation for one or more arguments")
                {
                    DISALLOW_INCOMPLETE_DEFS
                } else if diagnostic
                    .message
                    .contains("Function is missing a type annotation")
                {
                    DISALLOW_UNTYPED_DEFS
                } else {
                    DISALLOW_INCOMPLETE_DEFS
                };
                record_rule_violation(&mut classification, rule, diagnostic);
            }
            "no-untyped-call" => {
                record_rule_violation(&mut classification, DISALLOW_UNTYPED_CALLS, diagnostic);
            }
            "" => {
                if diagnostic.message.contains("unused 'type: ignore' comment") {
                    classification.global_rules.insert(WARN_UNUSED_IGNORES);
                } else {
                    classification.unknown.push(diagnostic.clone());
                }
            }
            _ => classification.unknown.push(diagnostic.clone()),
        }
    }

    classification.missing_stubs = minimum_covering_modules(&stub_modules);
    classification
}

fn record_rule_violation(
    classification: &mut Classification,
    rule: &'static str,
    diagnostic: &Diagnostic,
) {
    match module_for_path(&diagnostic.file_path) {
        Ok(module) => {
            classification
                .rule_modules
                .entry(rule)
                .or_default()
                .insert(module);
        }
        // A path we cannot turn into a module name is as opaque as an
        // unrecognized error code.
        Err(_) => classification.unknown.push(diagnostic.clone()),
    }
}

fn missing_stub_module(message: &str) -> Option<String> {
    if let Some(captures) = MISSING_TYPE_HINTS_PATTERN.captures(message) {
        return Some(captures[1].to_string());
    }
    if let Some(captures) = MISSING_IMPLEMENTATION_PATTERN.captures(message) {
        let module = captures[1].to_string();
        tracing::warn!(
            module = %module,
            "mypy could not find type hints for a module that does not appear to be \
             installed; assuming it has none available"
        );
        return Some(module);
    }
    None
}
