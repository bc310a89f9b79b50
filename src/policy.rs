//! Static admission policy.
//!
//! The catalog is pure data: three disjoint identifier sets plus the
//! forbidden-attribute set, consulted by the analyzer before any code runs.
//! Name matching is case-sensitive and always applies to the top-level
//! package component of a dotted module path (`a.b.c` matches on `a`).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Modules whose import is rejected outright: process control, sys access,
/// dynamic import machinery, filesystem reach, sockets and protocol
/// clients, and object serialization.
const FORBIDDEN_IMPORTS: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "multiprocessing",
    "importlib",
    "runpy",
    "io",
    "pathlib",
    "shutil",
    "tempfile",
    "glob",
    "socket",
    "ssl",
    "urllib",
    "http",
    "requests",
    "ftplib",
    "telnetlib",
    "smtplib",
    "poplib",
    "imaplib",
    "pickle",
    "shelve",
    "marshal",
    "ctypes",
    "pty",
    "fcntl",
    "resource",
    "signal",
    "webbrowser",
];

/// Builtins that act as code-injection or filesystem vectors when called by
/// bare name. The dynamic-attribute trio (getattr/setattr/delattr) is
/// handled separately by the analyzer's call rule.
const FORBIDDEN_BUILTINS: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "__import__",
    "open",
    "input",
    "execfile",
    "reload",
    "breakpoint",
    "exit",
    "quit",
    "help",
];

/// The import whitelist: numeric and symbolic math, statistics, iteration
/// and functional helpers, date/time, text processing, structured-data
/// codecs, and the scientific stack.
const PERMITTED_IMPORTS: &[&str] = &[
    "math",
    "cmath",
    "decimal",
    "fractions",
    "random",
    "statistics",
    "collections",
    "itertools",
    "functools",
    "operator",
    "heapq",
    "bisect",
    "array",
    "datetime",
    "time",
    "calendar",
    "re",
    "string",
    "textwrap",
    "unicodedata",
    "json",
    "csv",
    "copy",
    "enum",
    "dataclasses",
    "typing",
    "abc",
    "numbers",
    "numpy",
    "scipy",
    "sympy",
    "mpmath",
    "pandas",
    "matplotlib",
    "sklearn",
];

/// Introspection hooks that expose the runtime: globals/closure accessors,
/// bytecode accessors, and class-graph walkers.
const FORBIDDEN_ATTRIBUTES: &[&str] = &[
    "__globals__",
    "__builtins__",
    "__closure__",
    "__code__",
    "__class__",
    "__bases__",
    "__subclasses__",
    "__mro__",
    "__getattribute__",
    "__dict__",
];

/// Read-only description of permitted and forbidden constructs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCatalog {
    forbidden_imports: HashSet<String>,
    forbidden_builtins: HashSet<String>,
    permitted_imports: HashSet<String>,
    forbidden_attributes: HashSet<String>,
}

impl Default for PolicyCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyCatalog {
    /// Build the default catalog. The forbidden and permitted import sets
    /// are disjoint by construction; `debug_assert` guards regressions when
    /// the tables are edited.
    pub fn new() -> Self {
        let catalog = Self {
            forbidden_imports: FORBIDDEN_IMPORTS.iter().map(|s| s.to_string()).collect(),
            forbidden_builtins: FORBIDDEN_BUILTINS.iter().map(|s| s.to_string()).collect(),
            permitted_imports: PERMITTED_IMPORTS.iter().map(|s| s.to_string()).collect(),
            forbidden_attributes: FORBIDDEN_ATTRIBUTES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };
        debug_assert!(
            catalog
                .forbidden_imports
                .is_disjoint(&catalog.permitted_imports),
            "forbidden and permitted import sets overlap"
        );
        catalog
    }

    /// Extend the whitelist with an extra top-level module name. The name
    /// is removed from the forbidden set if present, preserving
    /// disjointness.
    pub fn allow_import(mut self, name: &str) -> Self {
        self.forbidden_imports.remove(name);
        self.permitted_imports.insert(name.to_string());
        self
    }

    /// Move a top-level module name to the forbidden set.
    pub fn forbid_import(mut self, name: &str) -> Self {
        self.permitted_imports.remove(name);
        self.forbidden_imports.insert(name.to_string());
        self
    }

    pub fn is_forbidden_import(&self, name: &str) -> bool {
        self.forbidden_imports.contains(top_level(name))
    }

    pub fn is_permitted_import(&self, name: &str) -> bool {
        self.permitted_imports.contains(top_level(name))
    }

    pub fn is_forbidden_builtin(&self, name: &str) -> bool {
        self.forbidden_builtins.contains(name)
    }

    pub fn is_forbidden_attribute(&self, name: &str) -> bool {
        self.forbidden_attributes.contains(name)
    }

    /// Sorted whitelist, for the service descriptor.
    pub fn permitted_imports(&self) -> Vec<String> {
        let mut names: Vec<String> = self.permitted_imports.iter().cloned().collect();
        names.sort();
        names
    }
}

/// Top-level package component of a dotted module path.
fn top_level(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_and_permitted_are_disjoint() {
        let catalog = PolicyCatalog::new();
        for name in catalog.permitted_imports() {
            assert!(
                !catalog.is_forbidden_import(&name),
                "'{name}' is both permitted and forbidden"
            );
        }
    }

    #[test]
    fn dotted_names_match_on_top_level() {
        let catalog = PolicyCatalog::new();
        assert!(catalog.is_forbidden_import("os.path"));
        assert!(catalog.is_forbidden_import("urllib.request"));
        assert!(catalog.is_permitted_import("matplotlib.pyplot"));
        assert!(catalog.is_permitted_import("numpy.linalg"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let catalog = PolicyCatalog::new();
        assert!(!catalog.is_forbidden_import("OS"));
        assert!(!catalog.is_permitted_import("Math"));
    }

    #[test]
    fn builtin_and_attribute_predicates() {
        let catalog = PolicyCatalog::new();
        assert!(catalog.is_forbidden_builtin("eval"));
        assert!(catalog.is_forbidden_builtin("open"));
        assert!(!catalog.is_forbidden_builtin("print"));
        assert!(catalog.is_forbidden_attribute("__globals__"));
        assert!(catalog.is_forbidden_attribute("__subclasses__"));
        assert!(!catalog.is_forbidden_attribute("sqrt"));
    }

    #[test]
    fn allow_import_keeps_sets_disjoint() {
        let catalog = PolicyCatalog::new().allow_import("signal");
        assert!(catalog.is_permitted_import("signal"));
        assert!(!catalog.is_forbidden_import("signal"));
    }

    #[test]
    fn forbid_import_overrides_whitelist() {
        let catalog = PolicyCatalog::new().forbid_import("numpy");
        assert!(catalog.is_forbidden_import("numpy.linalg"));
        assert!(!catalog.is_permitted_import("numpy"));
    }
}
