use std::path::Path;

use once_cell::sync::Lazy;
use recompiler_core::dependency_host::DependencyHost;
use regex::Regex;

use crate::scan::{dedupe, strip_comments};

static STATIC_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[;}\s])(?:import|export)\s+(?:type\s+)?(?:[\w*{}\s,$]+?\s+from\s*)?['"]([^'"]+)['"]"#)
        .expect("valid regex")
});
static DYNAMIC_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bimport\s*\(\s*['"]([^'"]+)['"]\s*\)"#).expect("valid regex")
});

/// Reads `import`/`export ... from` statements and dynamic `import()` calls.
pub struct EsmDependencyHost;

impl EsmDependencyHost {
    pub(crate) fn scan(contents: &str, dynamic: bool) -> Vec<String> {
        let contents = strip_comments(contents);
        let statics = STATIC_IMPORT
            .captures_iter(&contents)
            .map(|caps| caps[1].to_string());
        if !dynamic {
            return dedupe(statics);
        }
        let dynamics = DYNAMIC_IMPORT
            .captures_iter(&contents)
            .map(|caps| caps[1].to_string())
            .collect::<Vec<_>>();
        dedupe(statics.chain(dynamics))
    }
}

impl DependencyHost for EsmDependencyHost {
    fn extract_imports(&self, _file: &Path, contents: &str) -> Vec<String> {
        Self::scan(contents, true)
    }

    fn can_skip_file(&self, contents: &str) -> bool {
        !contents.contains("import") && !contents.contains("export")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imports(contents: &str) -> Vec<String> {
        EsmDependencyHost.extract_imports(Path::new("/x.js"), contents)
    }

    #[test]
    fn test_extracts_static_and_dynamic_imports() {
        let source = r#"
import { a, b } from './a';
import * as core from '@lib/core';
import 'side-effect';
export { c } from "./c";
export * from './d';
const lazy = () => import('./lazy');
const notAnImport = "import x from 'nope'";
"#;
        assert_eq!(
            imports(source),
            vec!["./a", "@lib/core", "side-effect", "./c", "./d", "./lazy"]
        );
    }

    #[test]
    fn test_multiline_import_and_comments() {
        let source = "/* import x from 'commented' */\n// import y from 'also-commented'\nimport {\n  a,\n  b\n} from './multi';\n";
        assert_eq!(imports(source), vec!["./multi"]);
    }

    #[test]
    fn test_can_skip_file() {
        assert!(EsmDependencyHost.can_skip_file("var x = 1;"));
        assert!(!EsmDependencyHost.can_skip_file("export const x = 1;"));
    }
}
