//! Dependency hosts for the module formats that can be recompiled.

pub mod commonjs;
pub mod dts;
pub mod esm;
pub mod umd;

mod scan;

pub use commonjs::CommonJsDependencyHost;
pub use dts::DtsDependencyHost;
pub use esm::EsmDependencyHost;
pub use umd::UmdDependencyHost;

use recompiler_core::dependency_host::DependencyHost;
use recompiler_core::entry_point::EntryPointFormat;

/// Picks the host that understands bundles of `format`.
pub fn get_host(format: &EntryPointFormat) -> Box<dyn DependencyHost> {
    match format {
        EntryPointFormat::Esm5 | EntryPointFormat::Esm2015 => Box::new(EsmDependencyHost),
        EntryPointFormat::Umd => Box::new(UmdDependencyHost),
        EntryPointFormat::CommonJs => Box::new(CommonJsDependencyHost),
    }
}

/// Host for `.d.ts` typings.
pub fn typings_host() -> Box<dyn DependencyHost> {
    Box::new(DtsDependencyHost)
}
