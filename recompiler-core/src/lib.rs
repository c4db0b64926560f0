//! Core library for recompiling installed library packages in dependency order.

pub mod analysis;
pub mod build_marker;
pub mod cleaning;
pub mod command_validator;
pub mod compiler;
pub mod config;
pub mod dependency_host;
pub mod dependency_resolver;
pub mod entry_point;
pub mod entry_point_finder;
pub mod error;
pub mod execution;
pub mod graph;
pub mod locking;
pub mod manifest;
pub mod module_resolver;
pub mod options;
pub mod package_json;
pub mod package_json_updater;
pub mod path_utils;
pub mod planner;
pub mod tasks;
pub mod writing;

pub use analysis::{analyze_entry_points, find_entry_points, get_analyze_entry_points_fn};
pub use compiler::{
    create_compile_fn, BundleCompiler, CommandCompiler, CompileOptions, Diagnostic,
    DiagnosticSeverity, EntryPointBundle, FileToWrite, TransformResult,
};
pub use config::Configuration;
pub use dependency_host::{DependencyHost, DependencyInfo};
pub use dependency_resolver::{DependencyResolver, SortedEntryPointsInfo};
pub use entry_point::{EntryPoint, EntryPointFormat, SUPPORTED_FORMAT_PROPERTIES};
pub use error::{Error, Result};
pub use execution::{
    ClusterExecutor, ExecutionSummary, SingleProcessExecutorAsync, SingleProcessExecutorSync,
};
pub use graph::DependencyGraph;
pub use module_resolver::ModuleResolver;
pub use options::{RecompileOptions, ResolvedOptions};
pub use package_json::PackageJson;
pub use package_json_updater::{DirectPackageJsonUpdater, PackageJsonUpdater};
pub use tasks::{DtsProcessing, Task, TaskQueue};
