//! Recompiles installed library packages in dependency order.
//!
//! [`recompile`] validates the options, finds entry points below the base
//! path, plans one task per format to compile and runs the tasks with the
//! executor matching the options. Work already done by this version is
//! skipped.

use std::sync::Arc;

use recompiler_core::analysis::{
    find_entry_points, get_analyze_entry_points_fn, target_needs_processing,
};
use recompiler_core::execution::{
    ClusterExecutor, CompileFn, CreateCompileFn, ExecutionSummary, SingleProcessExecutorAsync,
    SingleProcessExecutorSync, TaskCompletedCallback,
};
use recompiler_core::locking::{AsyncLocker, LockFile, SyncLocker};
use recompiler_core::package_json_updater::{DirectPackageJsonUpdater, PackageJsonUpdater};
use recompiler_core::{
    create_compile_fn, BundleCompiler, CompileOptions, DependencyResolver, ModuleResolver,
    RecompileOptions, ResolvedOptions, Result, SortedEntryPointsInfo, Task,
};
use tracing::debug;

/// Builds the dependency resolver with the standard hosts.
pub fn create_dependency_resolver(options: &ResolvedOptions) -> DependencyResolver {
    DependencyResolver::new(
        ModuleResolver::new(options.path_mappings.as_ref()),
        recompiler_hosts::get_host,
        Some(recompiler_hosts::typings_host()),
    )
}

/// Finds and sorts entry points without compiling anything.
pub fn discover(options: &ResolvedOptions) -> Result<SortedEntryPointsInfo> {
    let resolver = create_dependency_resolver(options);
    find_entry_points(options, &resolver, options.invalidate_entry_point_manifest)
}

/// One run over the packages below a base path.
pub struct Recompiler {
    options: ResolvedOptions,
    create_compile_fn: CreateCompileFn,
}

impl Recompiler {
    /// Validates `options` and wraps `compiler` into the run's compile function.
    pub fn new(options: RecompileOptions, compiler: Arc<dyn BundleCompiler>) -> Result<Self> {
        let options = options.validate()?;
        let create_compile_fn = create_compile_fn(
            compiler,
            CompileOptions {
                create_new_entry_point_formats: options.create_new_entry_point_formats,
                backup_originals: options.backup_originals,
                error_on_failed_entry_point: options.error_on_failed_entry_point,
            },
        );
        Ok(Self {
            options,
            create_compile_fn,
        })
    }

    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    /// Calls `on_task` after each task was compiled, on the compiling thread.
    pub fn with_progress<F>(mut self, on_task: F) -> Self
    where
        F: Fn(&Task) + Send + Sync + 'static,
    {
        let inner = self.create_compile_fn;
        let on_task = Arc::new(on_task);
        self.create_compile_fn = Arc::new(
            move |updater: Arc<dyn PackageJsonUpdater>, on_task_completed: TaskCompletedCallback| {
                let mut compile = inner(updater, on_task_completed);
                let on_task = Arc::clone(&on_task);
                let wrapped: CompileFn = Box::new(move |task: &Task| {
                    let result = compile(task);
                    on_task(task);
                    result
                });
                wrapped
            },
        );
        self
    }

    /// Runs to completion, blocking the calling thread.
    ///
    /// Async options run the async or cluster executor on a private runtime.
    pub fn run(self) -> Result<ExecutionSummary> {
        if self.options.async_mode {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            return runtime.block_on(self.run_async());
        }

        let resolver = create_dependency_resolver(&self.options);
        if !target_needs_processing(&self.options, &resolver)? {
            debug!("The target entry-point has already been processed");
            return Ok(ExecutionSummary::default());
        }

        let updater: Arc<dyn PackageJsonUpdater> = Arc::new(DirectPackageJsonUpdater::new());
        let executor = SingleProcessExecutorSync::new(
            SyncLocker::new(LockFile::new(&self.options.base_path)),
            updater,
            self.options.error_on_failed_entry_point,
        );
        let analyze = get_analyze_entry_points_fn(self.options, resolver);
        executor.execute(analyze, self.create_compile_fn)
    }

    /// Runs to completion on the current tokio runtime.
    ///
    /// Uses the cluster executor when more than one worker is available.
    pub async fn run_async(self) -> Result<ExecutionSummary> {
        let resolver = create_dependency_resolver(&self.options);
        if !target_needs_processing(&self.options, &resolver)? {
            debug!("The target entry-point has already been processed");
            return Ok(ExecutionSummary::default());
        }

        let updater: Arc<dyn PackageJsonUpdater> = Arc::new(DirectPackageJsonUpdater::new());
        let locker = AsyncLocker::new(
            LockFile::new(&self.options.base_path),
            self.options.lock_retry,
        );
        let in_parallel = self.options.in_parallel();
        let worker_count = self.options.worker_count;
        let error_on_failed_entry_point = self.options.error_on_failed_entry_point;
        let analyze = get_analyze_entry_points_fn(self.options, resolver);

        if in_parallel {
            ClusterExecutor::new(worker_count, locker, updater, error_on_failed_entry_point)
                .execute(analyze, self.create_compile_fn)
                .await
        } else {
            SingleProcessExecutorAsync::new(locker, updater, error_on_failed_entry_point)
                .execute(analyze, self.create_compile_fn)
                .await
        }
    }
}

/// Recompiles everything `options` selects, blocking until done.
pub fn recompile(
    options: RecompileOptions,
    compiler: Arc<dyn BundleCompiler>,
) -> Result<ExecutionSummary> {
    Recompiler::new(options, compiler)?.run()
}

/// Like [`recompile`], for callers already on a tokio runtime.
pub async fn recompile_async(
    options: RecompileOptions,
    compiler: Arc<dyn BundleCompiler>,
) -> Result<ExecutionSummary> {
    Recompiler::new(options, compiler)?.run_async().await
}
