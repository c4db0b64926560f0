//! Node-style resolution of module specifiers.

use std::path::{Path, PathBuf};

use crate::options::PathMappings;
use crate::path_utils::{
    has_package_json, is_relative_specifier, normalize, resolve_file_with_postfixes,
};

/// Where a specifier resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedModule {
    /// A file inside the importing package.
    Relative(PathBuf),
    /// Another entry point, identified by its directory.
    External(PathBuf),
    /// A file inside another package that is not an entry point.
    DeepImport(PathBuf),
}

/// A mapped pattern split around its single `*` wildcard.
#[derive(Debug, Clone)]
struct ProcessedPathMapping {
    prefix: String,
    postfix: String,
    has_wildcard: bool,
    targets: Vec<(String, String)>,
}

/// Resolves module specifiers to files or entry points.
#[derive(Debug, Clone, Default)]
pub struct ModuleResolver {
    base_url: Option<PathBuf>,
    mappings: Vec<ProcessedPathMapping>,
}

impl ModuleResolver {
    pub fn new(path_mappings: Option<&PathMappings>) -> Self {
        let Some(path_mappings) = path_mappings else {
            return Self::default();
        };

        let mut mappings: Vec<ProcessedPathMapping> = path_mappings
            .paths
            .iter()
            .map(|(pattern, targets)| {
                let (prefix, postfix, has_wildcard) = split_on_star(pattern);
                ProcessedPathMapping {
                    prefix,
                    postfix,
                    has_wildcard,
                    targets: targets
                        .iter()
                        .map(|t| {
                            let (p, s, _) = split_on_star(t);
                            (p, s)
                        })
                        .collect(),
                }
            })
            .collect();
        // Exact patterns first, then the longest prefix wins.
        mappings.sort_by(|a, b| {
            a.has_wildcard
                .cmp(&b.has_wildcard)
                .then_with(|| b.prefix.len().cmp(&a.prefix.len()))
        });

        Self {
            base_url: Some(path_mappings.base_url.clone()),
            mappings,
        }
    }

    /// Resolves `specifier` as imported from the file `from_path`.
    ///
    /// `postfixes` are tried in order when looking for files.
    pub fn resolve_module_import(
        &self,
        specifier: &str,
        from_path: &Path,
        postfixes: &[&str],
    ) -> Option<ResolvedModule> {
        if is_relative_specifier(specifier) {
            return resolve_as_relative_path(specifier, from_path, postfixes);
        }
        self.resolve_by_path_mappings(specifier, from_path, postfixes)
            .or_else(|| resolve_as_entry_point(specifier, from_path, postfixes))
    }

    fn resolve_by_path_mappings(
        &self,
        specifier: &str,
        from_path: &Path,
        postfixes: &[&str],
    ) -> Option<ResolvedModule> {
        let mapped_paths = self.find_mapped_paths(specifier);
        if mapped_paths.is_empty() {
            return None;
        }
        let package_path = find_package_path(from_path)?;

        for mapped_path in mapped_paths {
            if has_package_json(&mapped_path) {
                return Some(ResolvedModule::External(mapped_path));
            }
            if let Some(resolved) = resolve_file_with_postfixes(&mapped_path, postfixes) {
                return Some(if mapped_path.starts_with(&package_path) {
                    ResolvedModule::Relative(resolved)
                } else {
                    ResolvedModule::DeepImport(mapped_path)
                });
            }
        }
        None
    }

    fn find_mapped_paths(&self, specifier: &str) -> Vec<PathBuf> {
        let Some(base_url) = &self.base_url else {
            return Vec::new();
        };

        let Some((mapping, matched)) = self.mappings.iter().find_map(|mapping| {
            if mapping.has_wildcard {
                let rest = specifier.strip_prefix(&mapping.prefix)?;
                let matched = rest.strip_suffix(&mapping.postfix)?;
                Some((mapping, matched))
            } else {
                (specifier == mapping.prefix).then_some((mapping, ""))
            }
        }) else {
            return Vec::new();
        };

        mapping
            .targets
            .iter()
            .map(|(prefix, postfix)| {
                normalize(&base_url.join(format!("{}{}{}", prefix, matched, postfix)))
            })
            .collect()
    }
}

fn split_on_star(pattern: &str) -> (String, String, bool) {
    match pattern.split_once('*') {
        Some((prefix, postfix)) => (prefix.to_string(), postfix.to_string(), true),
        None => (pattern.to_string(), String::new(), false),
    }
}

fn resolve_as_relative_path(
    specifier: &str,
    from_path: &Path,
    postfixes: &[&str],
) -> Option<ResolvedModule> {
    let dir = from_path.parent()?;
    let candidate = normalize(&dir.join(specifier));
    resolve_file_with_postfixes(&candidate, postfixes).map(ResolvedModule::Relative)
}

/// Walks up through `node_modules` directories looking for `specifier`.
fn resolve_as_entry_point(
    specifier: &str,
    from_path: &Path,
    postfixes: &[&str],
) -> Option<ResolvedModule> {
    let mut folder = from_path;
    while let Some(parent) = folder.parent() {
        folder = parent;
        if folder.file_name().is_some_and(|name| name == "node_modules") {
            // `node_modules/node_modules` is never a real layout.
            continue;
        }
        let module_path = folder.join("node_modules").join(specifier);
        if has_package_json(&module_path) {
            return Some(ResolvedModule::External(module_path));
        }
        if resolve_file_with_postfixes(&module_path, postfixes).is_some() {
            return Some(ResolvedModule::DeepImport(module_path));
        }
    }
    None
}

/// The nearest ancestor directory of `path` with a `package.json`.
fn find_package_path(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .skip(1)
        .find(|dir| has_package_json(dir))
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    const JS: &[&str] = &["", ".js", "/index.js"];

    fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_relative_and_external_resolution() {
        let temp = TempDir::new().unwrap();
        let nm = temp.path().join("node_modules");
        touch(&nm.join("a/package.json"), "{}");
        touch(&nm.join("a/index.js"), "");
        touch(&nm.join("a/util.js"), "");
        touch(&nm.join("b/package.json"), "{}");
        touch(&nm.join("c/internal/file.js"), "");

        let resolver = ModuleResolver::new(None);
        let from = nm.join("a/index.js");

        assert_eq!(
            resolver.resolve_module_import("./util", &from, JS),
            Some(ResolvedModule::Relative(nm.join("a/util.js")))
        );
        assert_eq!(
            resolver.resolve_module_import("b", &from, JS),
            Some(ResolvedModule::External(nm.join("b")))
        );
        assert_eq!(
            resolver.resolve_module_import("c/internal/file", &from, JS),
            Some(ResolvedModule::DeepImport(nm.join("c/internal/file")))
        );
        assert_eq!(resolver.resolve_module_import("missing", &from, JS), None);
    }

    #[test]
    fn test_path_mapping_resolution() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        touch(&root.join("package.json"), "{}");
        touch(&root.join("src/app.js"), "");
        touch(&root.join("dist/lib-x/package.json"), "{}");

        let mut paths = BTreeMap::new();
        paths.insert("@local/*".to_string(), vec!["dist/lib-*".to_string()]);
        let mappings = PathMappings {
            base_url: root.to_path_buf(),
            paths,
        };
        let resolver = ModuleResolver::new(Some(&mappings));

        assert_eq!(
            resolver.resolve_module_import("@local/x", &root.join("src/app.js"), JS),
            Some(ResolvedModule::External(root.join("dist/lib-x")))
        );
    }
}
