//! Dependency extraction for one module format.
//!
//! A [`DependencyHost`] only knows how to pull import specifiers out of a
//! single file. [`collect_dependencies`] walks the files of an entry point
//! with it and classifies every specifier through the [`ModuleResolver`].

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::module_resolver::{ModuleResolver, ResolvedModule};
use crate::path_utils::resolve_file_with_postfixes;

/// Postfixes tried when resolving JavaScript files.
pub const JS_POSTFIXES: &[&str] = &["", ".js", "/index.js"];

/// Postfixes tried when resolving type declaration files.
pub const DTS_POSTFIXES: &[&str] = &["", ".d.ts", "/index.d.ts", ".js", "/index.js"];

/// Node.js built-in modules. Imports of these are never reported missing.
const BUILTIN_MODULES: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
    "crypto", "dgram", "dns", "domain", "events", "fs", "http", "http2", "https", "inspector",
    "module", "net", "os", "path", "perf_hooks", "process", "punycode", "querystring",
    "readline", "repl", "stream", "string_decoder", "sys", "timers", "tls", "trace_events",
    "tty", "url", "util", "v8", "vm", "worker_threads", "zlib",
];

/// Extracts module specifiers from files of one format family.
pub trait DependencyHost: Send + Sync {
    /// Every module specifier imported or required by `contents`.
    fn extract_imports(&self, file: &Path, contents: &str) -> Vec<String>;

    /// A cheap pre-check: `true` if `contents` cannot contain any import.
    fn can_skip_file(&self, contents: &str) -> bool;

    /// File postfixes tried when resolving specifiers.
    fn postfixes(&self) -> &'static [&'static str] {
        JS_POSTFIXES
    }

    /// A second specifier to try when `specifier` resolves to nothing.
    fn fallback_specifier(&self, _specifier: &str) -> Option<String> {
        None
    }
}

/// Dependencies of one entry point, split by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyInfo {
    /// Directories of other entry points this one imports.
    pub dependencies: BTreeSet<PathBuf>,
    /// Specifiers that resolved to nothing.
    pub missing: BTreeSet<String>,
    /// Files inside other packages that are not entry points.
    pub deep_imports: BTreeSet<PathBuf>,
}

impl DependencyInfo {
    pub fn merge(&mut self, other: DependencyInfo) {
        self.dependencies.extend(other.dependencies);
        self.missing.extend(other.missing);
        self.deep_imports.extend(other.deep_imports);
    }
}

/// Returns `true` for `fs`, `node:fs`, `fs/promises` and the like.
pub fn is_builtin_module(specifier: &str) -> bool {
    if specifier.starts_with("node:") {
        return true;
    }
    let root = specifier.split('/').next().unwrap_or(specifier);
    BUILTIN_MODULES.contains(&root)
}

/// Collects the dependencies reachable from the file at `entry_file`.
///
/// `entry_file` is resolved with the host's postfixes first; if nothing
/// exists there the result is empty. Relative imports are followed
/// recursively, each file visited once.
pub fn collect_dependencies(
    host: &dyn DependencyHost,
    resolver: &ModuleResolver,
    entry_file: &Path,
) -> DependencyInfo {
    let mut info = DependencyInfo::default();
    let Some(resolved) = resolve_file_with_postfixes(entry_file, host.postfixes()) else {
        return info;
    };

    let mut already_seen = HashSet::new();
    already_seen.insert(resolved.clone());
    let mut pending = vec![resolved];

    while let Some(file) = pending.pop() {
        let Ok(contents) = fs::read_to_string(&file) else {
            trace!("Unable to read {}", file.display());
            continue;
        };
        if host.can_skip_file(&contents) {
            continue;
        }

        for specifier in host.extract_imports(&file, &contents) {
            let resolved = resolver
                .resolve_module_import(&specifier, &file, host.postfixes())
                .or_else(|| {
                    let fallback = host.fallback_specifier(&specifier)?;
                    resolver.resolve_module_import(&fallback, &file, host.postfixes())
                });
            match resolved {
                Some(ResolvedModule::Relative(internal)) => {
                    if already_seen.insert(internal.clone()) {
                        pending.push(internal);
                    }
                }
                Some(ResolvedModule::External(entry_point_path)) => {
                    info.dependencies.insert(entry_point_path);
                }
                Some(ResolvedModule::DeepImport(path)) => {
                    info.deep_imports.insert(path);
                }
                None if is_builtin_module(&specifier) => {}
                None => {
                    info.missing.insert(specifier);
                }
            }
        }
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_builtin_module() {
        assert!(is_builtin_module("fs"));
        assert!(is_builtin_module("fs/promises"));
        assert!(is_builtin_module("node:path"));
        assert!(!is_builtin_module("lodash"));
        assert!(!is_builtin_module("@scope/fs"));
    }
}
