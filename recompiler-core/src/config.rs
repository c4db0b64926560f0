//! TOML configuration overrides for packages and their entry points.
//!
//! Overrides live in `recompiler.toml` files. A project-level file (found by
//! walking up from the packages directory) configures packages by name,
//! optionally restricted to a version range:
//!
//! ```toml
//! [packages."some-lib@^2.0.0".entry_points."./testing"]
//! ignore = true
//! ```
//!
//! A package-level file sits in the package root and configures only that
//! package; it takes precedence over the project-level file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Error, Result};
use crate::path_utils::normalize;

/// Name of both the project-level and package-level configuration file.
pub const CONFIG_FILE: &str = "recompiler.toml";

/// Overrides for a single entry point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryPointConfig {
    /// Skip this entry point entirely; it never enters the dependency graph.
    #[serde(default)]
    pub ignore: bool,
    /// Treat the entry point as valid even if some imports cannot be resolved.
    #[serde(default)]
    pub ignore_missing_dependencies: bool,
    /// Properties merged over the entry point's `package.json`.
    #[serde(default, rename = "override")]
    pub overrides: Option<toml::Table>,
}

impl EntryPointConfig {
    /// The overrides converted to JSON, ready to merge into package metadata.
    pub fn json_overrides(&self) -> Result<Option<Map<String, Value>>> {
        let Some(table) = &self.overrides else {
            return Ok(None);
        };
        match serde_json::to_value(table).map_err(Error::JsonSerialize)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Ok(None),
        }
    }
}

/// Configuration for one package, keyed by entry point path relative to the
/// package root (`"."` is the primary entry point).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageConfig {
    #[serde(default)]
    pub entry_points: HashMap<String, EntryPointConfig>,
}

/// Project-level configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub packages: HashMap<String, PackageConfig>,
}

/// Package configuration with entry point keys resolved to absolute paths.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPackageConfig {
    pub entry_points: HashMap<PathBuf, EntryPointConfig>,
}

impl ResolvedPackageConfig {
    fn resolve(package_path: &Path, config: &PackageConfig) -> Self {
        let entry_points = config
            .entry_points
            .iter()
            .map(|(relative, ep_config)| {
                (normalize(&package_path.join(relative)), ep_config.clone())
            })
            .collect();
        Self { entry_points }
    }

    pub fn entry_point(&self, entry_point_path: &Path) -> Option<&EntryPointConfig> {
        self.entry_points.get(entry_point_path)
    }
}

/// All configuration known to a run.
pub struct Configuration {
    project: ProjectConfig,
    project_config_path: Option<PathBuf>,
    hash: u64,
    cache: DashMap<(PathBuf, Option<String>), Arc<ResolvedPackageConfig>>,
}

impl Configuration {
    /// A configuration with no overrides.
    pub fn empty() -> Self {
        Self {
            project: ProjectConfig::default(),
            project_config_path: None,
            hash: 0,
            cache: DashMap::new(),
        }
    }

    pub fn from_project_config(project: ProjectConfig) -> Self {
        Self {
            project,
            ..Self::empty()
        }
    }

    /// Loads the nearest project-level configuration above `base_path`.
    pub fn load(base_path: &Path) -> Result<Self> {
        let Some(config_path) = Self::find_project_config(base_path) else {
            return Ok(Self::empty());
        };

        let content = fs::read_to_string(&config_path)?;
        let project: ProjectConfig = toml::from_str(&content).map_err(|error| Error::Toml {
            error,
            path: config_path.clone(),
        })?;
        debug!("Loaded project configuration from {}", config_path.display());

        Ok(Self {
            project,
            project_config_path: Some(config_path),
            hash: xxh3_64(content.as_bytes()),
            cache: DashMap::new(),
        })
    }

    fn find_project_config(base_path: &Path) -> Option<PathBuf> {
        let mut current_dir = base_path.parent()?;

        loop {
            let candidate = current_dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }

            if current_dir.join(".git").exists() {
                break;
            }

            match current_dir.parent() {
                Some(parent) if parent != current_dir => current_dir = parent,
                _ => break,
            }
        }

        None
    }

    pub fn project_config_path(&self) -> Option<&Path> {
        self.project_config_path.as_deref()
    }

    /// Hash of the project-level configuration file, zero when there is none.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Looks up the configuration that applies to a package.
    ///
    /// A `recompiler.toml` in the package root wins; otherwise the
    /// project-level entry whose key matches the package name (and version
    /// range, if given) is used.
    pub fn get_package_config(
        &self,
        package_name: &str,
        package_path: &Path,
        version: Option<&str>,
    ) -> Result<Arc<ResolvedPackageConfig>> {
        let cache_key = (package_path.to_path_buf(), version.map(str::to_string));
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(Arc::clone(cached.value()));
        }

        let resolved = match self.load_package_level_config(package_path)? {
            Some(config) => ResolvedPackageConfig::resolve(package_path, &config),
            None => self
                .find_project_package_config(package_name, version)
                .map(|config| ResolvedPackageConfig::resolve(package_path, config))
                .unwrap_or_default(),
        };

        let resolved = Arc::new(resolved);
        self.cache.insert(cache_key, Arc::clone(&resolved));
        Ok(resolved)
    }

    fn load_package_level_config(&self, package_path: &Path) -> Result<Option<PackageConfig>> {
        let config_path = package_path.join(CONFIG_FILE);
        if !config_path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&config_path)?;
        let config = toml::from_str(&content).map_err(|error| Error::Toml {
            error,
            path: config_path,
        })?;
        Ok(Some(config))
    }

    fn find_project_package_config(
        &self,
        package_name: &str,
        version: Option<&str>,
    ) -> Option<&PackageConfig> {
        self.project.packages.iter().find_map(|(key, config)| {
            let (name, range) = split_version_range(key);
            if name != package_name {
                return None;
            }
            match range {
                None => Some(config),
                Some(range) => {
                    let req = semver::VersionReq::parse(range).ok()?;
                    let version = semver::Version::parse(version?).ok()?;
                    req.matches(&version).then_some(config)
                }
            }
        })
    }
}

/// Splits `name@range` keys, leaving the leading `@` of scoped names alone.
fn split_version_range(key: &str) -> (&str, Option<&str>) {
    match key.rfind('@') {
        Some(index) if index > 0 => (&key[..index], Some(&key[index + 1..])),
        _ => (key, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_version_range() {
        assert_eq!(split_version_range("lib"), ("lib", None));
        assert_eq!(split_version_range("lib@^1.0.0"), ("lib", Some("^1.0.0")));
        assert_eq!(split_version_range("@scope/lib"), ("@scope/lib", None));
        assert_eq!(
            split_version_range("@scope/lib@>=2"),
            ("@scope/lib", Some(">=2"))
        );
    }

    #[test]
    fn test_version_range_matching() {
        let project: ProjectConfig = toml::from_str(
            r#"
[packages."lib@^1.0.0".entry_points."."]
ignore = true
"#,
        )
        .unwrap();
        let config = Configuration::from_project_config(project);

        let matching = config
            .get_package_config("lib", Path::new("/nm/lib"), Some("1.4.0"))
            .unwrap();
        assert!(matching.entry_point(Path::new("/nm/lib")).unwrap().ignore);

        let other = config
            .get_package_config("lib", Path::new("/nm/lib"), Some("2.0.0"))
            .unwrap();
        assert!(other.entry_point(Path::new("/nm/lib")).is_none());
    }
}
