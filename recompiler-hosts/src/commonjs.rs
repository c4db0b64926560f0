use std::path::Path;

use recompiler_core::dependency_host::DependencyHost;

use crate::scan::{dedupe, require_calls, strip_comments};

/// Reads `require('x')` calls.
pub struct CommonJsDependencyHost;

impl DependencyHost for CommonJsDependencyHost {
    fn extract_imports(&self, _file: &Path, contents: &str) -> Vec<String> {
        let contents = strip_comments(contents);
        dedupe(require_calls(&contents))
    }

    fn can_skip_file(&self, contents: &str) -> bool {
        !contents.contains("require")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_require_calls() {
        let source = "var a = require('./a');\nvar b = require(\"b\");\n/* require('c') */\nvar a2 = require('./a');\n";
        assert_eq!(
            CommonJsDependencyHost.extract_imports(Path::new("/x.js"), source),
            vec!["./a", "b"]
        );
    }
}
