//! Package metadata (`package.json`) model.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Name of the metadata file that identifies an entry point.
pub const PACKAGE_JSON: &str = "package.json";

/// The parsed contents of a `package.json` file.
///
/// Kept as an ordered JSON object so that rewriting the file preserves the
/// author's key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageJson {
    fields: Map<String, Value>,
}

impl PackageJson {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Reads and parses a `package.json` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let value: Value = serde_json::from_str(content).map_err(|error| Error::Json {
            error,
            path: path.to_path_buf(),
        })?;
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(Error::Config(format!(
                "{} does not contain a JSON object",
                path.display()
            ))),
        }
    }

    #[inline]
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.fields.get(property)
    }

    /// Returns a property only if it holds a string.
    #[inline]
    pub fn get_str(&self, property: &str) -> Option<&str> {
        self.fields.get(property).and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    pub fn version(&self) -> Option<&str> {
        self.get_str("version")
    }

    /// The typings entry, from `typings` or its `types` alias.
    pub fn typings(&self) -> Option<&str> {
        self.get_str("typings").or_else(|| self.get_str("types"))
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    /// Overlays every top-level key of `overrides` onto this metadata.
    pub fn merge(&mut self, overrides: &Map<String, Value>) {
        for (key, value) in overrides {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    pub fn to_pretty_string(&self) -> Result<String> {
        let mut content =
            serde_json::to_string_pretty(&self.fields).map_err(Error::JsonSerialize)?;
        content.push('\n');
        Ok(content)
    }
}
