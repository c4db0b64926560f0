//! Entry point data model and discovery of a single entry point.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Configuration;
use crate::error::Result;
use crate::package_json::{PackageJson, PACKAGE_JSON};
use crate::path_utils::{normalize, resolve_file_with_postfixes};

/// Format properties that can be recompiled, most preferred first.
pub const SUPPORTED_FORMAT_PROPERTIES: &[&str] = &[
    "fesm2015", "fesm5", "es2015", "esm2015", "esm5", "main", "module", "browser",
];

/// Module format of a compiled bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPointFormat {
    Esm5,
    Esm2015,
    Umd,
    CommonJs,
}

impl EntryPointFormat {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryPointFormat::Esm5 => "esm5",
            EntryPointFormat::Esm2015 => "esm2015",
            EntryPointFormat::Umd => "umd",
            EntryPointFormat::CommonJs => "commonjs",
        }
    }
}

impl fmt::Display for EntryPointFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compilable unit: a directory with a `package.json` describing bundles.
///
/// Created once during discovery and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Package name plus the sub-path of a secondary entry point.
    pub name: String,
    /// Absolute path of the entry point directory.
    pub path: PathBuf,
    pub package_name: String,
    /// Absolute path of the containing package's root.
    pub package_path: PathBuf,
    /// Metadata with any configured overrides already merged in.
    pub package_json: PackageJson,
    /// Absolute path of the typings entry file.
    pub typings: PathBuf,
    /// Whether this entry point carries the metadata this tool understands.
    pub compiled_by_target: bool,
    pub ignore_missing_dependencies: bool,
}

impl EntryPoint {
    #[inline]
    pub fn package_json_path(&self) -> PathBuf {
        self.path.join(PACKAGE_JSON)
    }

    /// The bundle path a format property points at, if present.
    #[inline]
    pub fn format_path(&self, property: &str) -> Option<&str> {
        self.package_json.get_str(property)
    }
}

/// Outcome of looking for an entry point at a path.
#[derive(Debug, Clone)]
pub enum EntryPointLookup {
    Found(Box<EntryPoint>),
    /// No `package.json` and no configuration.
    NoEntryPoint,
    /// Configuration says to ignore this entry point.
    Ignored,
    /// A `package.json` exists but is unusable (unparseable or no typings).
    Incompatible,
}

impl EntryPointLookup {
    /// `true` when there is an entry point here, even an ignored one.
    pub fn is_entry_point(&self) -> bool {
        matches!(self, EntryPointLookup::Found(_) | EntryPointLookup::Ignored)
    }
}

/// Reads the entry point at `entry_point_path` inside `package_path`.
pub fn get_entry_point_info(
    config: &Configuration,
    package_path: &Path,
    entry_point_path: &Path,
) -> Result<EntryPointLookup> {
    let package_json_path = entry_point_path.join(PACKAGE_JSON);
    let loaded = load_package_json(&package_json_path);

    let package_name = read_package_name(package_path, loaded.as_ref());
    let version = loaded
        .as_ref()
        .filter(|_| package_path == entry_point_path)
        .and_then(|pj| pj.version().map(str::to_string))
        .or_else(|| read_package_version(package_path));

    let package_config =
        config.get_package_config(&package_name, package_path, version.as_deref())?;
    let entry_point_config = package_config.entry_point(&normalize(entry_point_path));

    let has_config = entry_point_config.is_some();
    if !has_config && !package_json_path.exists() {
        return Ok(EntryPointLookup::NoEntryPoint);
    }
    if entry_point_config.is_some_and(|c| c.ignore) {
        return Ok(EntryPointLookup::Ignored);
    }

    let mut package_json = match (loaded, entry_point_config) {
        (Some(package_json), _) => package_json,
        // Configuration alone may describe an entry point.
        (None, Some(_)) => PackageJson::default(),
        (None, None) => return Ok(EntryPointLookup::Incompatible),
    };
    if let Some(overrides) = entry_point_config
        .map(|c| c.json_overrides())
        .transpose()?
        .flatten()
    {
        package_json.merge(&overrides);
    }

    let Some(typings) = package_json.typings().map(str::to_string) else {
        return Ok(EntryPointLookup::Incompatible);
    };

    let metadata_path =
        entry_point_path.join(format!("{}.metadata.json", typings.trim_end_matches(".d.ts")));
    let compiled_by_target = has_config || metadata_path.exists();

    let name = package_json
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| guess_entry_point_name(&package_name, package_path, entry_point_path));

    Ok(EntryPointLookup::Found(Box::new(EntryPoint {
        name,
        path: entry_point_path.to_path_buf(),
        package_name,
        package_path: package_path.to_path_buf(),
        package_json,
        typings: normalize(&entry_point_path.join(&typings)),
        compiled_by_target,
        ignore_missing_dependencies: entry_point_config
            .is_some_and(|c| c.ignore_missing_dependencies),
    })))
}

fn load_package_json(path: &Path) -> Option<PackageJson> {
    if !path.exists() {
        return None;
    }
    match PackageJson::load(path) {
        Ok(package_json) => Some(package_json),
        Err(e) => {
            warn!("Failed to read entry point info from {}: {}", path.display(), e);
            None
        }
    }
}

fn read_package_name(package_path: &Path, entry_point_json: Option<&PackageJson>) -> String {
    let package_json_path = package_path.join(PACKAGE_JSON);
    let from_package = PackageJson::load(&package_json_path)
        .ok()
        .and_then(|pj| pj.name().map(str::to_string));

    from_package
        .or_else(|| entry_point_json.and_then(|pj| pj.name().map(str::to_string)))
        .unwrap_or_else(|| package_name_from_path(package_path))
}

fn read_package_version(package_path: &Path) -> Option<String> {
    PackageJson::load(&package_path.join(PACKAGE_JSON))
        .ok()
        .and_then(|pj| pj.version().map(str::to_string))
}

/// Derives `name` or `@scope/name` from the last path segments.
fn package_name_from_path(package_path: &Path) -> String {
    let name = package_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let scope = package_path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .filter(|s| s.starts_with('@'));
    match scope {
        Some(scope) => format!("{}/{}", scope, name),
        None => name,
    }
}

fn guess_entry_point_name(
    package_name: &str,
    package_path: &Path,
    entry_point_path: &Path,
) -> String {
    match entry_point_path.strip_prefix(package_path) {
        Ok(relative) if !relative.as_os_str().is_empty() => {
            format!("{}/{}", package_name, relative.to_string_lossy().replace('\\', "/"))
        }
        _ => package_name.to_string(),
    }
}

/// Determines the module format behind a format property.
///
/// `main` and `browser` are sniffed from the bundle contents.
pub fn get_entry_point_format(
    entry_point: &EntryPoint,
    property: &str,
) -> Option<EntryPointFormat> {
    match property {
        "fesm2015" | "es2015" | "esm2015" => Some(EntryPointFormat::Esm2015),
        "fesm5" | "esm5" | "module" => Some(EntryPointFormat::Esm5),
        "main" | "browser" => {
            let bundle = entry_point.format_path(property)?;
            sniff_module_format(&entry_point.path.join(bundle))
        }
        _ => None,
    }
}

static ESM_STATEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(import|export)\s").expect("valid regex"));
static UMD_WRAPPER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"typeof\s+exports\s*===?\s*['\x22]object['\x22]\s*&&\s*typeof\s+module|typeof\s+define\s*===?\s*['\x22]function['\x22]\s*&&\s*define\.amd")
        .expect("valid regex")
});

/// Sniffs whether a bundle is ESM, UMD or CommonJS.
pub fn sniff_module_format(bundle_path: &Path) -> Option<EntryPointFormat> {
    let resolved = resolve_file_with_postfixes(bundle_path, &["", ".js", "/index.js"])?;
    let contents = fs::read_to_string(resolved).ok()?;
    if contents.trim().is_empty() {
        return None;
    }

    if ESM_STATEMENT.is_match(&contents) {
        Some(EntryPointFormat::Esm5)
    } else if UMD_WRAPPER.is_match(&contents) {
        Some(EntryPointFormat::Umd)
    } else {
        Some(EntryPointFormat::CommonJs)
    }
}
