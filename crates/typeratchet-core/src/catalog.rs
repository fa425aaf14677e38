//! Rule catalog: the fixed set of mypy checks this tool knows how to manage
//!
//! Each rule records whether it is baseline (always on, never relaxable),
//! whether it may be relaxed per module, and which other rules it requires.
//! The catalog precomputes dependency closures in both directions so the
//! tightening engine can answer "what else must be relaxed with this rule"
//! without walking the graph at every step.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{RatchetError, RatchetResult};

pub const NO_IMPLICIT_OPTIONAL: &str = "no_implicit_optional";
pub const STRICT_OPTIONAL: &str = "strict_optional";
pub const WARN_REDUNDANT_CASTS: &str = "warn_redundant_casts";
pub const CHECK_UNTYPED_DEFS: &str = "check_untyped_defs";
pub const DISALLOW_UNTYPED_CALLS: &str = "disallow_untyped_calls";
pub const DISALLOW_INCOMPLETE_DEFS: &str = "disallow_incomplete_defs";
pub const DISALLOW_UNTYPED_DEFS: &str = "disallow_untyped_defs";
pub const DISALLOW_UNTYPED_DECORATORS: &str = "disallow_untyped_decorators";
pub const WARN_UNUSED_IGNORES: &str = "warn_unused_ignores";

/// A single checker rule and its catalog metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    /// Flag name as it appears in mypy.ini
    pub name: &'static str,
    /// Baseline rules are always enabled and never eligible for relaxation
    pub baseline: bool,
    /// Whether the rule may be disabled for individual modules
    pub per_module: bool,
    /// Rules that must stay enabled in any scope where this rule is enabled
    pub requires: &'static [&'static str],
}

/// All rules known to this tool, in the order they are written to mypy.ini.
///
/// `disallow_untyped_defs` requires `disallow_incomplete_defs`: relaxing the
/// incomplete-defs check for a module is only coherent if the untyped-defs
/// check is relaxed there as well.
const RULES: &[Rule] = &[
    Rule {
        name: NO_IMPLICIT_OPTIONAL,
        baseline: true,
        per_module: false,
        requires: &[],
    },
    Rule {
        name: STRICT_OPTIONAL,
        baseline: true,
        per_module: false,
        requires: &[],
    },
    Rule {
        name: WARN_REDUNDANT_CASTS,
        baseline: true,
        per_module: false,
        requires: &[],
    },
    Rule {
        name: CHECK_UNTYPED_DEFS,
        baseline: false,
        per_module: true,
        requires: &[],
    },
    Rule {
        name: DISALLOW_UNTYPED_CALLS,
        baseline: false,
        per_module: true,
        requires: &[],
    },
    Rule {
        name: DISALLOW_INCOMPLETE_DEFS,
        baseline: false,
        per_module: true,
        requires: &[],
    },
    Rule {
        name: DISALLOW_UNTYPED_DEFS,
        baseline: false,
        per_module: true,
        requires: &[DISALLOW_INCOMPLETE_DEFS],
    },
    Rule {
        name: DISALLOW_UNTYPED_DECORATORS,
        baseline: false,
        per_module: true,
        requires: &[],
    },
    Rule {
        name: WARN_UNUSED_IGNORES,
        baseline: false,
        per_module: false,
        requires: &[],
    },
];

/// Immutable registry of rules with precomputed dependency closures
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    rules: Vec<Rule>,
    /// rule -> rule plus everything it transitively requires
    closures: BTreeMap<&'static str, BTreeSet<&'static str>>,
    /// rule -> every rule that transitively requires it
    dependents: BTreeMap<&'static str, BTreeSet<&'static str>>,
}

impl RuleCatalog {
    /// Build a catalog from an explicit rule list.
    ///
    /// Fails if a dependency edge names an unknown rule or the dependency
    /// graph contains a cycle. Both indicate a broken rule table, so this is
    /// checked once here and never again at runtime.
    pub fn new(rules: &[Rule]) -> RatchetResult<Self> {
        let known: BTreeSet<&str> = rules.iter().map(|rule| rule.name).collect();
        for rule in rules {
            for dep in rule.requires {
                if !known.contains(dep) {
                    return Err(RatchetError::config(format!(
                        "rule '{}' requires unknown rule '{}'",
                        rule.name, dep
                    )));
                }
            }
        }

        let mut closures = BTreeMap::new();
        for rule in rules {
            let mut closure = BTreeSet::new();
            let mut stack = vec![rule.name];
            while let Some(name) = stack.pop() {
                if !closure.insert(name) {
                    continue;
                }
                let node = rules
                    .iter()
                    .find(|candidate| candidate.name == name)
                    .ok_or_else(|| {
                        RatchetError::config(format!("rule '{name}' missing from catalog"))
                    })?;
                for dep in node.requires {
                    if *dep == rule.name {
                        return Err(RatchetError::config(format!(
                            "dependency cycle through rule '{}'",
                            rule.name
                        )));
                    }
                    stack.push(*dep);
                }
            }
            closures.insert(rule.name, closure);
        }

        let mut dependents: BTreeMap<&'static str, BTreeSet<&'static str>> =
            rules.iter().map(|rule| (rule.name, BTreeSet::new())).collect();
        for rule in rules {
            for dep in closures[rule.name].iter().filter(|dep| **dep != rule.name) {
                dependents
                    .get_mut(dep)
                    .map(|set| set.insert(rule.name))
                    .ok_or_else(|| {
                        RatchetError::config(format!("rule '{dep}' missing from catalog"))
                    })?;
            }
        }

        Ok(Self {
            rules: rules.to_vec(),
            closures,
            dependents,
        })
    }

    /// The standard mypy rule catalog
    pub fn standard() -> RatchetResult<Self> {
        Self::new(RULES)
    }

    /// All rules in write order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Look up a rule by name
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    /// Names of the baseline (non-negotiable) rules
    pub fn baseline(&self) -> BTreeSet<&'static str> {
        self.rules
            .iter()
            .filter(|rule| rule.baseline)
            .map(|rule| rule.name)
            .collect()
    }

    /// Names of every rule in the catalog
    pub fn all_rule_names(&self) -> BTreeSet<&'static str> {
        self.rules.iter().map(|rule| rule.name).collect()
    }

    /// The rule plus everything it transitively requires
    pub fn closure(&self, name: &str) -> Option<&BTreeSet<&'static str>> {
        self.closures.get(name)
    }

    /// Every rule that transitively requires the given rule.
    ///
    /// Disabling a rule in some scope also disables all of these there.
    pub fn dependents(&self, name: &str) -> Option<&BTreeSet<&'static str>> {
        self.dependents.get(name)
    }
}
