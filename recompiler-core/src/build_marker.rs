//! Processed markers stored in package metadata.
//!
//! A package's `package.json` carries a map from format property (plus the
//! reserved `typings` key) to the version of this tool that processed it:
//!
//! ```json
//! "__processed_by_recompiler__": { "fesm2015": "0.1.0", "typings": "0.1.0" }
//! ```

use std::path::Path;

use serde_json::Value;

use crate::error::Result;
use crate::package_json::PackageJson;
use crate::package_json_updater::{PackageJsonUpdate, PackageJsonUpdater};

/// Version stamp written into processed markers.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Key of the processed-marker map inside `package.json`.
pub const PROCESSED_MARKER_KEY: &str = "__processed_by_recompiler__";

/// Reserved marker property for type declaration processing.
pub const TYPINGS_PROPERTY: &str = "typings";

/// Backup key for a `prepublishOnly` script replaced by the publish guard.
pub const PREPUBLISH_ONLY_BACKUP: &str = "prepublishOnly__recompiler_bak";

/// Suffix of format properties pointing at relocated compiled bundles.
pub const RECOMPILED_PROPERTY_SUFFIX: &str = "_recompiled";

const PUBLISH_GUARD: &str = "node --eval \"console.error('ERROR: Trying to publish a package that has been recompiled. This is not allowed.\\nPlease delete and rebuild the package before attempting to publish.')\" && exit 1";

/// Returns the version stamp recorded for `property`, if any.
pub fn processed_version<'a>(package_json: &'a PackageJson, property: &str) -> Option<&'a str> {
    package_json
        .get(PROCESSED_MARKER_KEY)
        .and_then(|markers| markers.get(property))
        .and_then(Value::as_str)
}

/// Whether `property` was processed by this version of the tool.
///
/// A marker written by any other version does not count.
pub fn has_been_processed(package_json: &PackageJson, property: &str) -> bool {
    processed_version(package_json, property) == Some(VERSION)
}

/// Whether any marker was written by a different version of the tool.
pub fn needs_cleaning(package_json: &PackageJson) -> bool {
    package_json
        .get(PROCESSED_MARKER_KEY)
        .and_then(Value::as_object)
        .is_some_and(|markers| markers.values().any(|v| v.as_str() != Some(VERSION)))
}

/// Removes all markers, relocated format properties and the publish guard.
///
/// Returns `true` if anything was written.
pub fn clean_package_json(
    updater: &dyn PackageJsonUpdater,
    package_json: &PackageJson,
    package_json_path: &Path,
) -> Result<bool> {
    let mut update = PackageJsonUpdate::new(updater);
    if package_json.get(PROCESSED_MARKER_KEY).is_some() {
        update.remove_property(&[PROCESSED_MARKER_KEY]);
    }
    for key in package_json
        .fields()
        .keys()
        .filter(|key| key.ends_with(RECOMPILED_PROPERTY_SUFFIX))
    {
        update.remove_property(&[key.as_str()]);
    }

    if let Some(scripts) = package_json.get("scripts").and_then(Value::as_object) {
        if let Some(backup) = scripts.get(PREPUBLISH_ONLY_BACKUP) {
            update.add_change(&["scripts", "prepublishOnly"], backup.clone());
            update.remove_property(&["scripts", PREPUBLISH_ONLY_BACKUP]);
        } else if scripts.get("prepublishOnly").and_then(Value::as_str) == Some(PUBLISH_GUARD) {
            update.remove_property(&["scripts", "prepublishOnly"]);
        }
    }

    let changed = !update.is_empty();
    update.write_changes(package_json_path)?;
    Ok(changed)
}

/// Marks `properties` as processed and installs the publish guard.
pub fn mark_as_processed(
    updater: &dyn PackageJsonUpdater,
    package_json: &PackageJson,
    package_json_path: &Path,
    properties: &[String],
) -> Result<()> {
    let mut update = PackageJsonUpdate::new(updater);

    for property in properties {
        update.add_change(
            &[PROCESSED_MARKER_KEY, property.as_str()],
            Value::String(VERSION.to_string()),
        );
    }

    let old_prepublish_only = package_json
        .get("scripts")
        .and_then(|scripts| scripts.get("prepublishOnly"))
        .and_then(Value::as_str);
    if let Some(old) = old_prepublish_only {
        if old != PUBLISH_GUARD {
            update.add_change(
                &["scripts", PREPUBLISH_ONLY_BACKUP],
                Value::String(old.to_string()),
            );
        }
    }
    update.add_change(
        &["scripts", "prepublishOnly"],
        Value::String(PUBLISH_GUARD.to_string()),
    );

    update.write_changes(package_json_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package_json_updater::DirectPackageJsonUpdater;
    use serde_json::json;
    use tempfile::TempDir;

    fn package_json(value: Value) -> PackageJson {
        match value {
            Value::Object(map) => PackageJson::new(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_has_been_processed_requires_current_version() {
        let pj = package_json(json!({
            PROCESSED_MARKER_KEY: { "fesm2015": VERSION, "esm5": "0.0.0-old" }
        }));
        assert!(has_been_processed(&pj, "fesm2015"));
        assert!(!has_been_processed(&pj, "esm5"));
        assert!(!has_been_processed(&pj, "main"));
    }

    #[test]
    fn test_needs_cleaning() {
        let current = package_json(json!({ PROCESSED_MARKER_KEY: { "main": VERSION } }));
        assert!(!needs_cleaning(&current));

        let stale = package_json(json!({ PROCESSED_MARKER_KEY: { "main": "0.0.0-old" } }));
        assert!(needs_cleaning(&stale));

        let untouched = package_json(json!({ "name": "lib" }));
        assert!(!needs_cleaning(&untouched));
    }

    #[test]
    fn test_clean_package_json_restores_prepublish_only() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("package.json");
        let pj = package_json(json!({
            "name": "lib",
            "main_recompiled": "./__recompiled__/index.js",
            "scripts": { "prepublishOnly": PUBLISH_GUARD, PREPUBLISH_ONLY_BACKUP: "npm test" },
            PROCESSED_MARKER_KEY: { "main": "0.0.0-old" }
        }));
        std::fs::write(&path, pj.to_pretty_string().unwrap()).unwrap();
        let updater = DirectPackageJsonUpdater::new();

        assert!(clean_package_json(&updater, &pj, &path).unwrap());

        let cleaned = PackageJson::load(&path).unwrap();
        assert!(cleaned.get(PROCESSED_MARKER_KEY).is_none());
        assert!(cleaned.get("main_recompiled").is_none());
        assert_eq!(cleaned.get("scripts"), Some(&json!({ "prepublishOnly": "npm test" })));
        assert!(!clean_package_json(&updater, &cleaned, &path).unwrap());
    }
}
