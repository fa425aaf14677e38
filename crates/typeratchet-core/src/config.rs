//! In-memory mypy configuration model with deterministic serialization
//!
//! `tighten` decides whether a freshly computed configuration improves on the
//! persisted one by comparing the two, so equal configurations must always
//! render to identical bytes. All collections are ordered and the writer
//! emits rules in catalog order and module sections in lexicographic order.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::RuleCatalog;
use crate::error::{RatchetError, RatchetResult};
use crate::modules::validate_module_name;

/// First line of every configuration file this tool generates. `tighten`
/// refuses to touch files that do not carry it.
pub const AUTOGENERATED_LINE_PREFIX: &str = "# Autogenerated by typeratchet";

const FIRST_PARTY_COMMENT: &str = "# First party per-module rule relaxations";
const THIRD_PARTY_COMMENT: &str = "# Third-party module rule relaxations";
const IGNORE_MISSING_IMPORTS: &str = "ignore_missing_imports";

/// Which rules are enabled, globally and per module, plus stub suppressions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MypyConfig {
    /// Globally enabled rules; always a superset of the catalog baseline
    pub enabled: BTreeSet<&'static str>,
    /// First-party module -> rules disabled for that module and its children
    pub module_overrides: BTreeMap<String, BTreeSet<&'static str>>,
    /// Third-party modules whose missing type stubs are suppressed
    pub suppressed_stub_modules: BTreeSet<String>,
    /// Global `ignore_missing_imports = True`; used only for probe
    /// configurations, never persisted
    pub blanket_ignore_missing_imports: bool,
    /// Verbatim global settings injected from the project's pyproject.toml
    pub extra_globals: BTreeMap<String, String>,
}

impl MypyConfig {
    /// Whether a rule is in effect for a module, accounting for overrides
    /// declared on the module itself or any of its ancestors.
    pub fn rule_active_for(&self, rule: &str, module: &str) -> bool {
        if !self.enabled.contains(rule) {
            return false;
        }
        !self
            .module_overrides
            .iter()
            .any(|(overridden, rules)| {
                rules.contains(rule) && is_same_or_descendant(module, overridden)
            })
    }

    /// Whether missing stubs are suppressed for a third-party module
    pub fn stubs_suppressed_for(&self, module: &str) -> bool {
        self.blanket_ignore_missing_imports
            || self
                .suppressed_stub_modules
                .iter()
                .any(|suppressed| is_same_or_descendant(module, suppressed))
    }

    /// Render the configuration as deterministic mypy.ini text
    pub fn render(&self, catalog: &RuleCatalog) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{} v{}\n",
            AUTOGENERATED_LINE_PREFIX,
            crate::VERSION
        ));
        out.push_str("[mypy]\n");
        for rule in catalog.rules() {
            out.push_str(&format!(
                "{} = {}\n",
                rule.name,
                py_bool(self.enabled.contains(rule.name))
            ));
        }
        out.push_str(&format!(
            "{} = {}\n",
            IGNORE_MISSING_IMPORTS,
            py_bool(self.blanket_ignore_missing_imports)
        ));
        for (key, value) in &self.extra_globals {
            out.push_str(&format!("{key} = {value}\n"));
        }

        if !self.module_overrides.is_empty() {
            out.push('\n');
            out.push_str(FIRST_PARTY_COMMENT);
            out.push('\n');
            for (module, rules) in &self.module_overrides {
                out.push('\n');
                out.push_str(&format!("[mypy-{module}.*]\n"));
                for rule in rules {
                    out.push_str(&format!("{rule} = False\n"));
                }
            }
        }

        if !self.suppressed_stub_modules.is_empty() {
            out.push('\n');
            out.push_str(THIRD_PARTY_COMMENT);
            out.push('\n');
            for module in &self.suppressed_stub_modules {
                out.push('\n');
                out.push_str(&format!("[mypy-{module}.*]\n"));
                out.push_str(&format!("{IGNORE_MISSING_IMPORTS} = True\n"));
            }
        }

        out
    }

    /// Parse configuration text previously produced by [`MypyConfig::render`].
    ///
    /// The reconstructed value is checked against all configuration
    /// invariants; a file that violates one is rejected, never repaired.
    pub fn parse(text: &str, catalog: &RuleCatalog) -> RatchetResult<Self> {
        if !has_autogenerated_marker(text) {
            return Err(RatchetError::config(format!(
                "configuration file does not start with the '{AUTOGENERATED_LINE_PREFIX}' marker"
            )));
        }

        let mut config = Self::default();
        let mut section: Option<Section> = None;

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') {
                if let Some(previous) = section.take() {
                    previous.commit(&mut config)?;
                }
                section = Some(Section::from_header(line)?);
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                RatchetError::config(format!("malformed configuration line: '{line}'"))
            })?;
            let key = key.trim();
            let value = value.trim();

            match section.as_mut() {
                None => {
                    return Err(RatchetError::config(format!(
                        "configuration line outside of any section: '{line}'"
                    )));
                }
                Some(Section::Global) => parse_global_line(&mut config, catalog, key, value)?,
                Some(Section::Module {
                    rules_disabled,
                    ignore_missing_imports,
                    ..
                }) => {
                    if key == IGNORE_MISSING_IMPORTS {
                        if parse_py_bool(value)? {
                            *ignore_missing_imports = true;
                        } else {
                            return Err(RatchetError::config(format!(
                                "module section sets {IGNORE_MISSING_IMPORTS} = False, \
                                 which has no effect"
                            )));
                        }
                    } else {
                        let rule = catalog.rule(key).ok_or_else(|| {
                            RatchetError::config(format!(
                                "unknown rule '{key}' in module section"
                            ))
                        })?;
                        if parse_py_bool(value)? {
                            return Err(RatchetError::config(format!(
                                "module section enables rule '{key}'; overrides may only \
                                 disable rules"
                            )));
                        }
                        rules_disabled.insert(rule.name);
                    }
                }
            }
        }
        if let Some(previous) = section.take() {
            previous.commit(&mut config)?;
        }

        config.validate(catalog)?;
        Ok(config)
    }

    /// Check every configuration invariant against the catalog
    pub fn validate(&self, catalog: &RuleCatalog) -> RatchetResult<()> {
        for baseline_rule in catalog.baseline() {
            if !self.enabled.contains(baseline_rule) {
                return Err(RatchetError::config(format!(
                    "baseline rule '{baseline_rule}' is not enabled globally"
                )));
            }
        }

        if self.blanket_ignore_missing_imports {
            return Err(RatchetError::config(
                "blanket stub suppression is only valid for probe runs, \
                 never in a persisted configuration",
            ));
        }

        for rule_name in &self.enabled {
            let rule = catalog.rule(rule_name).ok_or_else(|| {
                RatchetError::config(format!("rule '{rule_name}' is not in the catalog"))
            })?;
            for dep in rule.requires {
                if !self.enabled.contains(dep) {
                    return Err(RatchetError::config(format!(
                        "rule '{rule_name}' is enabled but its requirement '{dep}' is not"
                    )));
                }
            }
        }

        for (module, rules) in &self.module_overrides {
            validate_module_name(module)?;
            for rule_name in rules {
                let rule = catalog.rule(rule_name).ok_or_else(|| {
                    RatchetError::config(format!("rule '{rule_name}' is not in the catalog"))
                })?;
                if rule.baseline {
                    return Err(RatchetError::config(format!(
                        "baseline rule '{rule_name}' is disabled for module '{module}'"
                    )));
                }
                if !rule.per_module {
                    return Err(RatchetError::config(format!(
                        "rule '{rule_name}' cannot be overridden per module"
                    )));
                }
                if !self.enabled.contains(rule_name) {
                    return Err(RatchetError::config(format!(
                        "module '{module}' overrides rule '{rule_name}' which is not \
                         enabled globally"
                    )));
                }
            }
        }

        // A rule left active for a module must have all of its requirements
        // active there too, including through ancestor overrides.
        for module in self.module_overrides.keys() {
            for rule in catalog.rules() {
                if !self.rule_active_for(rule.name, module) {
                    continue;
                }
                for dep in rule.requires {
                    if !self.rule_active_for(dep, module) {
                        return Err(RatchetError::config(format!(
                            "rule '{}' is active for module '{module}' but its \
                             requirement '{dep}' is not",
                            rule.name
                        )));
                    }
                }
            }
        }

        for module in &self.suppressed_stub_modules {
            validate_module_name(module)?;
        }

        Ok(())
    }
}

/// Whether configuration text carries the autogenerated marker as its first
/// non-empty line.
pub fn has_autogenerated_marker(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .is_some_and(|line| line.starts_with(AUTOGENERATED_LINE_PREFIX))
}

/// Compare two rendered configurations, ignoring comments and blank lines
pub fn configs_equal(config_a: &str, config_b: &str) -> bool {
    let meaningful = |text: &str| {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect::<Vec<_>>()
    };
    meaningful(config_a) == meaningful(config_b)
}

fn is_same_or_descendant(module: &str, ancestor: &str) -> bool {
    module == ancestor
        || (module.len() > ancestor.len()
            && module.starts_with(ancestor)
            && module.as_bytes()[ancestor.len()] == b'.')
}

fn py_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn parse_py_bool(value: &str) -> RatchetResult<bool> {
    match value {
        "True" => Ok(true),
        "False" => Ok(false),
        other => Err(RatchetError::config(format!(
            "expected 'True' or 'False', got '{other}'"
        ))),
    }
}

fn parse_global_line(
    config: &mut MypyConfig,
    catalog: &RuleCatalog,
    key: &str,
    value: &str,
) -> RatchetResult<()> {
    if key == IGNORE_MISSING_IMPORTS {
        config.blanket_ignore_missing_imports = parse_py_bool(value)?;
        return Ok(());
    }
    if let Some(rule) = catalog.rule(key) {
        if parse_py_bool(value)? {
            config.enabled.insert(rule.name);
        }
        return Ok(());
    }
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(RatchetError::config(format!(
            "malformed global setting name '{key}'"
        )));
    }
    config.extra_globals.insert(key.to_string(), value.to_string());
    Ok(())
}

/// Parser state for the section currently being read
enum Section {
    Global,
    Module {
        name: String,
        rules_disabled: BTreeSet<&'static str>,
        ignore_missing_imports: bool,
    },
}

impl Section {
    fn from_header(line: &str) -> RatchetResult<Self> {
        if line == "[mypy]" {
            return Ok(Self::Global);
        }
        let name = line
            .strip_prefix("[mypy-")
            .and_then(|rest| rest.strip_suffix(".*]"))
            .ok_or_else(|| {
                RatchetError::config(format!("malformed section header: '{line}'"))
            })?;
        validate_module_name(name)?;
        Ok(Self::Module {
            name: name.to_string(),
            rules_disabled: BTreeSet::new(),
            ignore_missing_imports: false,
        })
    }

    /// Fold a finished section into the configuration being built
    fn commit(self, config: &mut MypyConfig) -> RatchetResult<()> {
        match self {
            Self::Global => Ok(()),
            Self::Module {
                name,
                rules_disabled,
                ignore_missing_imports,
            } => match (ignore_missing_imports, rules_disabled.is_empty()) {
                (true, true) => {
                    config.suppressed_stub_modules.insert(name);
                    Ok(())
                }
                (false, false) => {
                    config.module_overrides.insert(name, rules_disabled);
                    Ok(())
                }
                (true, false) => Err(RatchetError::config(format!(
                    "module section '{name}' mixes stub suppression with rule overrides"
                ))),
                (false, true) => Err(RatchetError::config(format!(
                    "module section '{name}' is empty"
                ))),
            },
        }
    }
}
