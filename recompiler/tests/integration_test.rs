use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use recompiler::{discover, recompile, recompile_async, Recompiler};
use recompiler_core::build_marker::{has_been_processed, PROCESSED_MARKER_KEY};
use recompiler_core::command_validator::CommandValidator;
use recompiler_core::{CommandCompiler, Error, PackageJson, RecompileOptions};
use tempfile::TempDir;

const BANNER_COMMAND: &str = r#"printf '/* compiled */\n'; cat "$RECOMPILER_BUNDLE""#;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A package with ESM, aliased ESM and UMD bundles.
fn create_test_package(nm: &Path, name: &str, imports: &[&str]) {
    let dir = nm.join(name);
    write(
        &dir.join("package.json"),
        &format!(
            r#"{{
  "name": "{}",
  "version": "1.0.0",
  "typings": "./index.d.ts",
  "fesm2015": "./fesm2015/index.js",
  "es2015": "./fesm2015/index.js",
  "main": "./bundles/index.umd.js"
}}"#,
            name
        ),
    );
    write(&dir.join("index.metadata.json"), "{}");
    write(&dir.join("index.d.ts"), "export declare const value: number;\n");

    let esm: String = imports
        .iter()
        .map(|i| format!("import {{ value as v{} }} from '{}';\n", i.len(), i))
        .collect();
    write(&dir.join("fesm2015/index.js"), &format!("{}export const value = 1;\n", esm));

    let requires: String = imports
        .iter()
        .map(|i| format!(", require('{}')", i))
        .collect();
    write(
        &dir.join("bundles/index.umd.js"),
        &format!(
            "(function (global, factory) {{\n  typeof exports === 'object' && typeof module !== 'undefined' ? factory(exports{}) : factory(global.lib = {{}});\n}}(this, function (exports) {{ exports.value = 1; }}));\n",
            requires
        ),
    );
}

/// `app` depends on `core`; `solo` stands alone.
fn setup() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let nm = fs::canonicalize(temp.path()).unwrap().join("node_modules");
    create_test_package(&nm, "core", &[]);
    create_test_package(&nm, "app", &["core"]);
    create_test_package(&nm, "solo", &[]);
    (temp, nm)
}

fn compiler(command: &str) -> Arc<CommandCompiler> {
    Arc::new(CommandCompiler::new(command, &CommandValidator::new()).unwrap())
}

fn package_json(nm: &Path, name: &str) -> PackageJson {
    PackageJson::load(&nm.join(name).join("package.json")).unwrap()
}

fn read(path: PathBuf) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_recompile_all_formats() {
    let (_temp, nm) = setup();

    let summary = recompile(RecompileOptions::new(&nm), compiler(BANNER_COMMAND)).unwrap();

    // fesm2015 and es2015 share a bundle, so two tasks per package.
    assert_eq!(summary.total_tasks, 6);
    assert_eq!(summary.processed, 6);
    for name in ["core", "app", "solo"] {
        let pj = package_json(&nm, name);
        for property in ["fesm2015", "es2015", "main", "typings"] {
            assert!(has_been_processed(&pj, property), "{}: {} not marked", name, property);
        }
        let bundle = read(nm.join(name).join("fesm2015/index.js"));
        assert_eq!(bundle.matches("/* compiled */").count(), 1);
        assert!(nm.join(name).join("fesm2015/index.js.bak").exists());
    }
    assert!(package_json(&nm, "app")
        .get("scripts")
        .and_then(|s| s.get("prepublishOnly"))
        .is_some());
}

#[test]
fn test_second_run_is_a_no_op() {
    let (_temp, nm) = setup();
    recompile(RecompileOptions::new(&nm), compiler(BANNER_COMMAND)).unwrap();
    let before = read(nm.join("app/package.json"));

    let summary = recompile(RecompileOptions::new(&nm), compiler(BANNER_COMMAND)).unwrap();

    assert_eq!(summary.total_tasks, 0);
    assert_eq!(read(nm.join("app/package.json")), before);
}

#[test]
fn test_first_format_only() {
    let (_temp, nm) = setup();
    let mut options = RecompileOptions::new(&nm);
    options.compile_all_formats = false;
    options.properties_to_consider = vec!["main".to_string(), "fesm2015".to_string()];

    let summary = recompile(options, compiler(BANNER_COMMAND)).unwrap();

    assert_eq!(summary.processed, 3);
    let pj = package_json(&nm, "app");
    assert!(has_been_processed(&pj, "main"));
    assert!(!has_been_processed(&pj, "fesm2015"));
    assert!(read(nm.join("app/bundles/index.umd.js")).starts_with("/* compiled */"));
}

#[test]
fn test_missing_dependency_excludes_dependents_only() {
    let (_temp, nm) = setup();
    create_test_package(&nm, "broken", &["not-installed"]);
    create_test_package(&nm, "user", &["broken"]);

    let summary = recompile(RecompileOptions::new(&nm), compiler(BANNER_COMMAND)).unwrap();

    assert_eq!(summary.total_tasks, 6);
    assert!(package_json(&nm, "broken").get(PROCESSED_MARKER_KEY).is_none());
    assert!(package_json(&nm, "user").get(PROCESSED_MARKER_KEY).is_none());

    let info = discover(&RecompileOptions::new(&nm).validate().unwrap()).unwrap();
    let invalid: Vec<&str> = info
        .invalid_entry_points
        .iter()
        .map(|i| i.entry_point.name.as_str())
        .collect();
    assert_eq!(invalid.len(), 2);
    assert!(invalid.contains(&"broken") && invalid.contains(&"user"));
}

#[test]
fn test_invalid_target_is_an_error() {
    let (_temp, nm) = setup();
    create_test_package(&nm, "broken", &["not-installed"]);

    let mut options = RecompileOptions::new(&nm);
    options.target_entry_point_path = Some(PathBuf::from("broken"));
    let result = recompile(options, compiler(BANNER_COMMAND));

    assert!(matches!(result, Err(Error::InvalidTarget { .. })));
}

#[test]
fn test_target_compiles_its_dependencies() {
    let (_temp, nm) = setup();
    let mut options = RecompileOptions::new(&nm);
    options.target_entry_point_path = Some(PathBuf::from("app"));

    let summary = recompile(options, compiler(BANNER_COMMAND)).unwrap();

    assert_eq!(summary.processed, 4);
    assert!(has_been_processed(&package_json(&nm, "core"), "main"));
    assert!(package_json(&nm, "solo").get(PROCESSED_MARKER_KEY).is_none());
}

#[test]
fn test_failed_compilation_aborts() {
    let (_temp, nm) = setup();
    let command = r#"if [ "$RECOMPILER_ENTRY_POINT" = core ]; then echo "core is broken" >&2; exit 1; fi; cat "$RECOMPILER_BUNDLE""#;

    let result = recompile(RecompileOptions::new(&nm), compiler(command));

    match result {
        Err(Error::TaskExecution { entry_point, message, .. }) => {
            assert_eq!(entry_point, "core");
            assert!(message.contains("core is broken"), "{}", message);
        }
        other => panic!("expected a task failure, got {:?}", other),
    }
    assert!(package_json(&nm, "app").get(PROCESSED_MARKER_KEY).is_none());
}

#[test]
fn test_failed_compilation_continues_when_asked() {
    let (_temp, nm) = setup();
    let command = r#"if [ "$RECOMPILER_ENTRY_POINT" = core ]; then exit 3; fi; cat "$RECOMPILER_BUNDLE""#;
    let mut options = RecompileOptions::new(&nm);
    options.error_on_failed_entry_point = false;

    let summary = recompile(options, compiler(command)).unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.processed, 2);
    assert!(has_been_processed(&package_json(&nm, "solo"), "main"));
}

#[test]
fn test_empty_output_counts_as_already_processed() {
    let (_temp, nm) = setup();
    let original = read(nm.join("solo/fesm2015/index.js"));

    let summary = recompile(RecompileOptions::new(&nm), compiler("true")).unwrap();

    assert_eq!(summary.already_processed, 6);
    assert!(has_been_processed(&package_json(&nm, "solo"), "fesm2015"));
    assert_eq!(read(nm.join("solo/fesm2015/index.js")), original);
}

#[test]
fn test_progress_callback_sees_every_task() {
    let (_temp, nm) = setup();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);

    Recompiler::new(RecompileOptions::new(&nm), compiler(BANNER_COMMAND))
        .unwrap()
        .with_progress(move |task| {
            recorder
                .lock()
                .unwrap()
                .push(format!("{}:{}", task.entry_point.name, task.format_property));
        })
        .run()
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 6);
    let position = |item: &str| seen.iter().position(|x| x == item).unwrap();
    assert!(position("core:fesm2015") < position("app:fesm2015"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parallel_run() {
    let (_temp, nm) = setup();
    let mut options = RecompileOptions::new(&nm);
    options.async_mode = true;
    options.parallelism_hint = Some(4);
    options.max_workers = Some(3);
    options.create_new_entry_point_formats = true;

    let summary = recompile_async(options, compiler(BANNER_COMMAND)).await.unwrap();

    assert_eq!(summary.processed, 6);
    let app = package_json(&nm, "app");
    assert_eq!(app.get_str("main_recompiled"), Some("./__recompiled__/bundles/index.umd.js"));
    assert!(has_been_processed(&app, "main"));
    assert!(read(nm.join("app/__recompiled__/fesm2015/index.js")).starts_with("/* compiled */"));
    assert!(!read(nm.join("app/fesm2015/index.js")).starts_with("/* compiled */"));
}

#[test]
fn test_cli_scan_json() {
    let (_temp, nm) = setup();
    recompile(RecompileOptions::new(&nm), compiler(BANNER_COMMAND)).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_recompiler"))
        .arg("scan")
        .arg("--json")
        .arg("--base-path")
        .arg(&nm)
        .output()
        .unwrap();
    assert!(output.status.success());

    let entry_points: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entry_points = entry_points.as_array().unwrap();
    assert_eq!(entry_points.len(), 3);
    assert_eq!(entry_points[0]["name"], "core");
    assert_eq!(entry_points[0]["formats"]["main"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_cli_run() {
    let (_temp, nm) = setup();

    let output = Command::new(env!("CARGO_BIN_EXE_recompiler"))
        .arg("--base-path")
        .arg(&nm)
        .arg("run")
        .arg("--compiler")
        .arg(BANNER_COMMAND)
        .arg("-p")
        .arg("fesm2015")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    assert!(has_been_processed(&package_json(&nm, "app"), "fesm2015"));
    assert!(!has_been_processed(&package_json(&nm, "app"), "main"));
}
