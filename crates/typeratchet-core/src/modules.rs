//! Dotted module path handling
//!
//! Mypy reports errors against file paths; the generated configuration is
//! keyed by dotted module paths. The helpers here derive module names from
//! reported file paths and collapse module sets to their minimum covering
//! ancestors, since a `[mypy-foo.*]` section already applies to everything
//! underneath `foo`.

use std::collections::BTreeSet;

use crate::error::{RatchetError, RatchetResult};

const PYTHON_EXTENSIONS: &[&str] = &[".py", ".pyo", ".pyx", ".pyc"];

/// Check that a module name contains only identifier characters and dots,
/// with no leading or trailing dot.
pub fn validate_module_name(module_name: &str) -> RatchetResult<()> {
    let invalid = module_name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '.'));
    if let Some(c) = invalid {
        return Err(RatchetError::invalid_module_name(format!(
            "unexpected character '{c}' in '{module_name}'"
        )));
    }

    if module_name.is_empty() || module_name.starts_with('.') || module_name.ends_with('.') {
        return Err(RatchetError::invalid_module_name(format!(
            "cannot be empty or start or end with a period, got '{module_name}'"
        )));
    }

    Ok(())
}

/// Derive the dotted module path for a reported source file.
///
/// Errors reported in an `__init__.py` belong to the package one level up,
/// not to a submodule named `__init__`.
pub fn module_for_path(file_path: &str) -> RatchetResult<String> {
    let mut remainder = file_path;
    for extension in PYTHON_EXTENSIONS {
        if let Some(stripped) = remainder.strip_suffix(extension) {
            remainder = stripped;
            break;
        }
    }

    if remainder.contains('.') {
        return Err(RatchetError::invalid_module_name(format!(
            "unexpected '.' in file path '{file_path}'"
        )));
    }

    let remainder = remainder.strip_suffix("__init__").unwrap_or(remainder);

    let module_name = remainder
        .replace(['/', '\\'], ".")
        .trim_matches('.')
        .to_string();
    validate_module_name(&module_name)?;
    Ok(module_name)
}

/// Collapse a module set to the minimum set of ancestors covering all of it.
///
/// Walks the modules in sorted order, exploiting the fact that "foo" always
/// sorts lexicographically before "foo.<anything>".
pub fn minimum_covering_modules(module_names: &BTreeSet<String>) -> BTreeSet<String> {
    let mut covering: BTreeSet<String> = BTreeSet::new();

    for module_name in module_names {
        let components: Vec<&str> = module_name.split('.').collect();
        let covered = (1..components.len())
            .any(|count| covering.contains(&components[..count].join(".")));
        if !covered {
            covering.insert(module_name.clone());
        }
    }

    covering
}
