use std::path::Path;

use once_cell::sync::Lazy;
use recompiler_core::dependency_host::DependencyHost;
use regex::Regex;

use crate::scan::{dedupe, require_calls, strip_comments};

static DEFINE_DEPS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bdefine\s*\(\s*(?:['"][^'"]*['"]\s*,\s*)?\[([^\]]*)\]"#).expect("valid regex")
});
static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"['"]([^'"]+)['"]"#).expect("valid regex"));

/// AMD pseudo-dependencies provided by the loader itself.
const AMD_BUILTINS: &[&str] = &["require", "exports", "module"];

/// Reads the dependency list of a UMD wrapper.
///
/// Both the AMD `define([...])` branch and the CommonJS `require()` branch
/// are read; they normally agree.
pub struct UmdDependencyHost;

impl DependencyHost for UmdDependencyHost {
    fn extract_imports(&self, _file: &Path, contents: &str) -> Vec<String> {
        let contents = strip_comments(contents);
        let amd: Vec<String> = DEFINE_DEPS
            .captures_iter(&contents)
            .flat_map(|caps| {
                QUOTED
                    .captures_iter(&caps[1])
                    .map(|dep| dep[1].to_string())
                    .collect::<Vec<_>>()
            })
            .filter(|dep| !AMD_BUILTINS.contains(&dep.as_str()))
            .collect();
        let commonjs: Vec<String> = require_calls(&contents).collect();
        dedupe(amd.into_iter().chain(commonjs))
    }

    fn can_skip_file(&self, contents: &str) -> bool {
        !contents.contains("define") && !contents.contains("require")
    }
}
