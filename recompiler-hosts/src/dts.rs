use std::path::Path;

use recompiler_core::dependency_host::{DependencyHost, DTS_POSTFIXES};

use crate::esm::EsmDependencyHost;

/// Reads the static imports and re-exports of `.d.ts` files.
///
/// A bare specifier that resolves to nothing is retried under `@types/`.
pub struct DtsDependencyHost;

impl DependencyHost for DtsDependencyHost {
    fn extract_imports(&self, _file: &Path, contents: &str) -> Vec<String> {
        EsmDependencyHost::scan(contents, false)
    }

    fn can_skip_file(&self, contents: &str) -> bool {
        !contents.contains("import") && !contents.contains("export")
    }

    fn postfixes(&self) -> &'static [&'static str] {
        DTS_POSTFIXES
    }

    fn fallback_specifier(&self, specifier: &str) -> Option<String> {
        if specifier.starts_with('.')
            || specifier.starts_with('/')
            || specifier.starts_with("@types/")
        {
            return None;
        }
        // `@scope/name` is published as `@types/scope__name`.
        let mangled = specifier.strip_prefix('@').map_or_else(
            || specifier.to_string(),
            |scoped| scoped.replacen('/', "__", 1),
        );
        Some(format!("@types/{}", mangled))
    }
}
