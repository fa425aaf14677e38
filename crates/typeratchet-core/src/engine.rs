//! Tightening engine: finds the strictest configuration a project passes
//!
//! The search runs as a short sequence of states, each issuing exactly one
//! blocking oracle call: baseline check, strict probe, stub resolution,
//! per-module narrowing, validation. Narrowing is a single fixed-point pass
//! over the violations reported by one probe rather than an iterative greedy
//! removal, so the order in which violations are processed cannot change the
//! final configuration. That determinism is what lets `tighten` compare two
//! independently computed configurations byte for byte.

use crate::catalog::{RuleCatalog, WARN_UNUSED_IGNORES};
use crate::classifier::{Classification, classify};
use crate::config::MypyConfig;
use crate::error::{RatchetError, RatchetResult};
use crate::modules::minimum_covering_modules;
use crate::oracle::{CheckOracle, CheckReport};
use crate::own_config::ProjectConfig;

/// Owns the single candidate configuration for the duration of a run and
/// mutates it step by step against oracle feedback.
pub struct TighteningEngine<'a, O: CheckOracle> {
    catalog: &'a RuleCatalog,
    oracle: &'a O,
    project: ProjectConfig,
}

impl<'a, O: CheckOracle> TighteningEngine<'a, O> {
    pub fn new(catalog: &'a RuleCatalog, oracle: &'a O, project: ProjectConfig) -> Self {
        Self {
            catalog,
            oracle,
            project,
        }
    }

    /// Probe configuration with only the non-negotiable rules enabled and
    /// every third-party import suppressed.
    pub fn baseline_config(&self) -> MypyConfig {
        MypyConfig {
            enabled: self.catalog.baseline(),
            blanket_ignore_missing_imports: true,
            extra_globals: self.project.mypy_globals.clone(),
            ..MypyConfig::default()
        }
    }

    /// Probe configuration with every rule enabled except
    /// `warn_unused_ignores`, which mypy only reports once all other checks
    /// pass and is therefore verified during validation instead.
    pub fn strict_config(&self) -> MypyConfig {
        let mut enabled = self.catalog.all_rule_names();
        enabled.remove(WARN_UNUSED_IGNORES);
        MypyConfig {
            enabled,
            extra_globals: self.project.mypy_globals.clone(),
            ..MypyConfig::default()
        }
    }

    /// Verify the project passes the baseline checks at all.
    ///
    /// These cannot be relaxed, so any error here ends the run: no amount of
    /// tightening is possible until the user fixes the reported errors.
    pub fn check_baseline(&self) -> RatchetResult<()> {
        tracing::debug!("running baseline check");
        let report = self.oracle.check(&self.baseline_config())?;
        if report.passed {
            Ok(())
        } else {
            Err(RatchetError::baseline_failure(report.raw_output))
        }
    }

    /// One oracle call plus classification of whatever it reported
    pub fn probe(&self, config: &MypyConfig) -> RatchetResult<(CheckReport, Classification)> {
        let report = self.oracle.check(config)?;
        let classification = classify(&report.diagnostics);
        Ok((report, classification))
    }

    /// Suppress missing stubs for every third-party module the strict probe
    /// flagged, then re-probe once to refresh the violation set.
    ///
    /// This is unconditional: suppressing missing type information for an
    /// unowned third-party module never disables a check on project code.
    pub fn resolve_stubs(
        &self,
        config: &mut MypyConfig,
        classification: Classification,
    ) -> RatchetResult<Classification> {
        if classification.missing_stubs.is_empty() {
            return Ok(classification);
        }

        tracing::info!(
            modules = ?classification.missing_stubs,
            "suppressing missing stubs for third-party modules"
        );
        config
            .suppressed_stub_modules
            .extend(classification.missing_stubs.iter().cloned());
        let (_, refreshed) = self.probe(config)?;
        Ok(refreshed)
    }

    /// Disable exactly the violated rules for exactly the violating modules.
    ///
    /// Disabling a rule for a module also disables every rule that requires
    /// it there; a dependent rule is meaningless without its requirement
    /// active. Module sets are collapsed to minimum covering ancestors
    /// before being written as overrides.
    pub fn narrow(
        &self,
        config: &mut MypyConfig,
        classification: &Classification,
    ) -> RatchetResult<()> {
        if !classification.unknown.is_empty() {
            return Err(RatchetError::unknown_violation(
                classification.unknown.clone(),
            ));
        }

        // Missing stubs can reappear here on the validation retry path; the
        // suppression is as free as it was during stub resolution.
        config
            .suppressed_stub_modules
            .extend(classification.missing_stubs.iter().cloned());

        let mut rule_modules = classification.rule_modules.clone();
        for (rule_name, modules) in &classification.rule_modules {
            let dependents = self.catalog.dependents(rule_name).ok_or_else(|| {
                RatchetError::config(format!("rule '{rule_name}' is not in the catalog"))
            })?;
            for dependent in dependents {
                rule_modules
                    .entry(*dependent)
                    .or_default()
                    .extend(modules.iter().cloned());
            }
        }

        for (rule_name, modules) in &rule_modules {
            let rule = self.catalog.rule(rule_name).ok_or_else(|| {
                RatchetError::config(format!("rule '{rule_name}' is not in the catalog"))
            })?;
            if rule.baseline {
                return Err(RatchetError::baseline_failure(format!(
                    "baseline rule '{rule_name}' was violated in modules {:?}",
                    modules
                )));
            }
            if !rule.per_module {
                tracing::info!(rule = %rule_name, "disabling global-only rule");
                config.enabled.remove(rule.name);
                continue;
            }
            for module in minimum_covering_modules(modules) {
                config
                    .module_overrides
                    .entry(module)
                    .or_default()
                    .insert(rule.name);
            }
        }

        for rule_name in &classification.global_rules {
            tracing::info!(rule = %rule_name, "disabling globally violated rule");
            config.enabled.remove(rule_name);
        }

        Ok(())
    }

    /// Re-run the oracle against the narrowed configuration; it must pass.
    ///
    /// A failure here means either a dependency-closure bug or an oracle
    /// that changed its mind between runs, so the narrowing step is retried
    /// once before giving up with a diagnostic.
    pub fn validate(&self, config: &mut MypyConfig) -> RatchetResult<()> {
        let Some((_, classification)) = self.validation_probe(config)? else {
            return Ok(());
        };

        tracing::warn!("narrowed configuration failed validation, re-narrowing once");
        self.narrow(config, &classification)?;
        match self.validation_probe(config)? {
            None => Ok(()),
            Some((report, _)) => Err(RatchetError::validation_failed(
                config.render(self.catalog),
                report.raw_output,
            )),
        }
    }

    /// The full pipeline minus the baseline check
    pub fn tighten_from_strict(&self) -> RatchetResult<MypyConfig> {
        let mut config = self.strict_config();
        tracing::debug!("running strict probe");
        let (_, classification) = self.probe(&config)?;
        let classification = self.resolve_stubs(&mut config, classification)?;
        self.narrow(&mut config, &classification)?;
        config.enabled.insert(WARN_UNUSED_IGNORES);
        self.validate(&mut config)?;
        Ok(config)
    }

    /// Compute the tightest passing configuration for the project
    pub fn tightest(&self) -> RatchetResult<MypyConfig> {
        self.check_baseline()?;
        self.tighten_from_strict()
    }

    /// Probe during validation, folding in the one relaxation mypy can only
    /// reveal at this stage: unused `type: ignore` comments are reported
    /// once every other check passes. Returns `None` on a passing probe.
    fn validation_probe(
        &self,
        config: &mut MypyConfig,
    ) -> RatchetResult<Option<(CheckReport, Classification)>> {
        let (report, classification) = self.probe(config)?;
        if report.passed {
            return Ok(None);
        }

        if classification.only_unused_ignores() {
            tracing::info!(
                "mypy reported unused 'type: ignore' comments; disabling \
                 warn_unused_ignores globally. Consider removing the unused suppressions."
            );
            config.enabled.remove(WARN_UNUSED_IGNORES);
            let (report, classification) = self.probe(config)?;
            if report.passed {
                return Ok(None);
            }
            return Ok(Some((report, classification)));
        }

        Ok(Some((report, classification)))
    }
}
