use std::path::PathBuf;
use std::sync::Arc;

use recompiler_core::build_marker::{PROCESSED_MARKER_KEY, VERSION};
use recompiler_core::planner::{plan_tasks, PlanOptions};
use recompiler_core::{DtsProcessing, EntryPoint, PackageJson};
use serde_json::{json, Value};

fn entry_point(name: &str, package_json: Value) -> Arc<EntryPoint> {
    let path = PathBuf::from("/nm").join(name);
    let package_json = match package_json {
        Value::Object(map) => PackageJson::new(map),
        _ => unreachable!(),
    };
    Arc::new(EntryPoint {
        name: name.to_string(),
        typings: path.join("index.d.ts"),
        package_name: name.to_string(),
        package_path: path.clone(),
        path,
        package_json,
        compiled_by_target: true,
        ignore_missing_dependencies: false,
    })
}

fn options(properties: &[&str], compile_all_formats: bool, typings_only: bool) -> PlanOptions {
    PlanOptions {
        properties_to_consider: properties.iter().map(|s| s.to_string()).collect(),
        compile_all_formats,
        typings_only,
    }
}

#[test]
fn test_typings_go_with_the_first_task() {
    let ep = entry_point(
        "lib",
        json!({
            "typings": "index.d.ts",
            "fesm2015": "./a.js",
            "es2015": "./a.js",
            "main": "./b.js"
        }),
    );

    let planned = plan_tasks(&[ep], &options(&["fesm2015", "es2015", "main"], true, false));

    assert_eq!(planned.tasks.len(), 2);
    assert_eq!(planned.tasks[0].format_property, "fesm2015");
    assert_eq!(planned.tasks[0].process_dts, DtsProcessing::Yes);
    assert_eq!(
        planned.tasks[0].format_properties_to_mark_as_processed.to_vec(),
        vec!["fesm2015".to_string(), "es2015".to_string()]
    );
    assert_eq!(planned.tasks[1].format_property, "main");
    assert_eq!(planned.tasks[1].process_dts, DtsProcessing::No);
    assert!(planned.unprocessable.is_empty());
}

#[test]
fn test_processed_properties_are_not_planned_again() {
    let ep = entry_point(
        "lib",
        json!({
            "typings": "index.d.ts",
            "fesm2015": "./a.js",
            "main": "./b.js",
            PROCESSED_MARKER_KEY: { "fesm2015": VERSION, "typings": VERSION }
        }),
    );

    let planned = plan_tasks(&[ep], &options(&["fesm2015", "main"], true, false));

    assert_eq!(planned.tasks.len(), 1);
    assert_eq!(planned.tasks[0].format_property, "main");
    assert_eq!(planned.tasks[0].process_dts, DtsProcessing::No);
}

#[test]
fn test_fully_processed_entry_point_plans_nothing() {
    let ep = entry_point(
        "lib",
        json!({
            "typings": "index.d.ts",
            "fesm2015": "./a.js",
            PROCESSED_MARKER_KEY: { "fesm2015": VERSION, "typings": VERSION }
        }),
    );

    let planned = plan_tasks(&[ep], &options(&["fesm2015"], true, false));
    assert!(planned.tasks.is_empty());
    assert!(planned.unprocessable.is_empty());
}

#[test]
fn test_stale_marker_counts_as_unprocessed() {
    let ep = entry_point(
        "lib",
        json!({
            "typings": "index.d.ts",
            "fesm2015": "./a.js",
            PROCESSED_MARKER_KEY: { "fesm2015": "0.0.0-old" }
        }),
    );

    let planned = plan_tasks(&[ep], &options(&["fesm2015"], true, false));
    assert_eq!(planned.tasks.len(), 1);
}

#[test]
fn test_first_only_plans_one_task() {
    let ep = entry_point(
        "lib",
        json!({ "typings": "index.d.ts", "module": "./a.js", "main": "./b.js" }),
    );

    let planned = plan_tasks(&[ep], &options(&["module", "main"], false, false));
    assert_eq!(planned.tasks.len(), 1);
    assert_eq!(planned.tasks[0].format_property, "module");
}

#[test]
fn test_typings_only() {
    let ep = entry_point(
        "lib",
        json!({ "typings": "index.d.ts", "fesm2015": "./a.js", "main": "./b.js" }),
    );
    let done = entry_point(
        "done",
        json!({
            "typings": "index.d.ts",
            "main": "./b.js",
            PROCESSED_MARKER_KEY: { "typings": VERSION }
        }),
    );

    let planned = plan_tasks(&[ep, done], &options(&["fesm2015", "main"], true, true));
    assert_eq!(planned.tasks.len(), 1);
    assert_eq!(planned.tasks[0].entry_point.name, "lib");
    assert_eq!(planned.tasks[0].process_dts, DtsProcessing::Only);
}

#[test]
fn test_entry_point_without_requested_property_is_unprocessable() {
    let ep = entry_point("lib", json!({ "typings": "index.d.ts", "main": "./b.js" }));
    let other = entry_point("other", json!({ "typings": "index.d.ts", "fesm2015": "./a.js" }));

    let planned = plan_tasks(&[ep, Arc::clone(&other)], &options(&["fesm2015"], true, false));

    assert_eq!(planned.unprocessable, vec![PathBuf::from("/nm/lib")]);
    assert_eq!(planned.tasks.len(), 1);
    assert_eq!(planned.tasks[0].entry_point, other);
    assert_eq!(planned.tasks[0].id, 0);
}

#[test]
fn test_first_only_marks_aliases_of_the_first_format() {
    let ep = entry_point(
        "lib",
        json!({
            "typings": "index.d.ts",
            "module": "./esm5/index.js",
            "fesm5": "./esm5/index.js",
            "esm5": "./esm5/lib.js"
        }),
    );

    let planned = plan_tasks(&[ep], &options(&["module", "fesm5", "esm5"], false, false));

    assert_eq!(planned.tasks.len(), 1);
    assert_eq!(planned.tasks[0].format_property, "module");
    let mut marked = planned.tasks[0].format_properties_to_mark_as_processed.to_vec();
    marked.sort();
    assert_eq!(marked, vec!["fesm5".to_string(), "module".to_string()]);
}
