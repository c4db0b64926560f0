//! Shared path utilities for package discovery and module resolution.

use std::path::{Component, Path, PathBuf};

use crate::package_json::PACKAGE_JSON;

/// Lexically normalizes a path, folding `.` and `..` components.
///
/// Does not touch the filesystem, so symlinks are not resolved.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Returns `true` for `./x`, `../x` and absolute specifiers.
pub fn is_relative_specifier(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier == "."
        || specifier == ".."
        || specifier.starts_with('/')
}

/// Finds the first existing file among `path` + each postfix.
pub fn resolve_file_with_postfixes(path: &Path, postfixes: &[&str]) -> Option<PathBuf> {
    postfixes.iter().find_map(|postfix| {
        let mut candidate = path.as_os_str().to_os_string();
        candidate.push(postfix);
        let candidate = PathBuf::from(candidate);
        candidate.is_file().then_some(candidate)
    })
}

/// Returns `true` if the directory holds a `package.json`.
#[inline]
pub fn has_package_json(path: &Path) -> bool {
    path.join(PACKAGE_JSON).is_file()
}

/// Computes the root directory of the package that contains an entry point.
///
/// Looks below the deepest `node_modules` segment between a base path and
/// the entry point for the first directory with a `package.json`. Falls back
/// to the entry point itself.
pub fn compute_package_path(entry_point_path: &Path, base_paths: &[PathBuf]) -> PathBuf {
    for base_path in base_paths {
        if let Ok(relative) = entry_point_path.strip_prefix(base_path) {
            if let Some(package_path) = package_path_below(base_path, relative) {
                return package_path;
            }
        }
    }

    nearest_node_modules_package(entry_point_path).unwrap_or_else(|| entry_point_path.to_path_buf())
}

fn package_path_below(containing_path: &Path, relative: &Path) -> Option<PathBuf> {
    let segments: Vec<&std::ffi::OsStr> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name),
            _ => None,
        })
        .collect();

    let last_node_modules = segments.iter().rposition(|s| *s == "node_modules");

    let mut package_path = containing_path.to_path_buf();
    let remaining = match last_node_modules {
        None => {
            if has_package_json(&package_path) {
                return Some(package_path);
            }
            &segments[..]
        }
        Some(index) => {
            for segment in &segments[..=index] {
                package_path.push(segment);
            }
            &segments[index + 1..]
        }
    };

    for segment in remaining {
        package_path.push(segment);
        if has_package_json(&package_path) {
            return Some(package_path);
        }
    }

    None
}

fn nearest_node_modules_package(entry_point_path: &Path) -> Option<PathBuf> {
    let mut package_path: Option<PathBuf> = None;
    let mut current = entry_point_path;

    loop {
        if has_package_json(current) {
            package_path = Some(current.to_path_buf());
        }
        let parent = current.parent()?;
        if parent.file_name().is_some_and(|name| name == "node_modules") {
            return package_path;
        }
        current = parent;
    }
}

/// Expresses `to` relative to the directory `from`, as a `./` or `../` path.
///
/// Both paths must be absolute and normalized.
pub fn relative_path(from: &Path, to: &Path) -> String {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<String> = vec!["..".to_string(); from.len() - common];
    parts.extend(
        to[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().to_string()),
    );

    if parts.first().is_some_and(|p| p == "..") {
        parts.join("/")
    } else {
        let joined = parts.join("/");
        format!("./{}", joined)
    }
}
