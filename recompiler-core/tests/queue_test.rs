use std::path::PathBuf;
use std::sync::Arc;

use recompiler_core::graph::DependencyGraph;
use recompiler_core::tasks::{create_task_queue, TaskQueue};
use recompiler_core::{DtsProcessing, EntryPoint, Error, PackageJson, Task};
use serde_json::json;
use smallvec::smallvec;

fn entry_point(name: &str) -> Arc<EntryPoint> {
    let path = PathBuf::from("/nm").join(name);
    let package_json = match json!({ "name": name, "typings": "index.d.ts" }) {
        serde_json::Value::Object(map) => PackageJson::new(map),
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

fn task(
    id: usize,
    entry_point: &Arc<EntryPoint>,
    property: &str,
    process_dts: DtsProcessing,
) -> Task {
    Task {
        id,
        entry_point: Arc::clone(entry_point),
        format_property: property.to_string(),
        format_properties_to_mark_as_processed: smallvec![property.to_string()],
        process_dts,
    }
}

/// `b` depends on `a`; `c` is unrelated.
fn create_queue(in_parallel: bool) -> Box<dyn TaskQueue> {
    let a = entry_point("a");
    let b = entry_point("b");
    let c = entry_point("c");

    let mut graph = DependencyGraph::new();
    graph.add_node(&a.path);
    graph.add_node(&b.path);
    graph.add_node(&c.path);
    graph.add_dependency(&b.path, &a.path).unwrap();

    let tasks = vec![
        task(0, &a, "fesm2015", DtsProcessing::Yes),
        task(1, &a, "main", DtsProcessing::No),
        task(2, &b, "fesm2015", DtsProcessing::Yes),
        task(3, &c, "fesm2015", DtsProcessing::Yes),
    ];
    create_task_queue(in_parallel, tasks, &graph).unwrap()
}

fn complete(queue: &mut dyn TaskQueue, task_id: usize) {
    queue.mark_as_completed(task_id).unwrap();
}

#[test]
fn test_serial_queue_hands_out_planned_order() {
    let mut queue = create_queue(false);
    let mut order = Vec::new();
    while let Some(task) = queue.get_next_task().unwrap() {
        order.push(task.id);
        complete(queue.as_mut(), task.id);
    }

    assert_eq!(order, vec![0, 1, 2, 3]);
    assert!(queue.all_tasks_completed());
}

#[test]
fn test_serial_queue_rejects_concurrent_tasks() {
    let mut queue = create_queue(false);
    queue.get_next_task().unwrap();
    assert!(matches!(queue.get_next_task(), Err(Error::Invariant(_))));
}

#[test]
fn test_parallel_queue_waits_for_dependencies() {
    let mut queue = create_queue(true);

    // Task 0 unblocks the most work, then the unrelated entry point.
    let first = queue.get_next_task().unwrap().unwrap();
    assert_eq!(first.id, 0);
    let second = queue.get_next_task().unwrap().unwrap();
    assert_eq!(second.id, 3);
    assert!(queue.get_next_task().unwrap().is_none());

    complete(queue.as_mut(), 0);
    assert_eq!(queue.get_next_task().unwrap().unwrap().id, 1);
    assert!(queue.get_next_task().unwrap().is_none());

    complete(queue.as_mut(), 1);
    assert_eq!(queue.get_next_task().unwrap().unwrap().id, 2);

    complete(queue.as_mut(), 2);
    complete(queue.as_mut(), 3);
    assert!(queue.all_tasks_completed());
}

#[test]
fn test_failed_task_skips_dependents() {
    for in_parallel in [false, true] {
        let mut queue = create_queue(in_parallel);
        let first = queue.get_next_task().unwrap().unwrap();
        assert_eq!(first.id, 0);
        queue.mark_as_failed(0).unwrap();
        complete(queue.as_mut(), 0);

        let mut ran = Vec::new();
        while let Some(task) = queue.get_next_task().unwrap() {
            ran.push(task.id);
            complete(queue.as_mut(), task.id);
        }

        assert_eq!(ran, vec![3], "in_parallel = {}", in_parallel);
        assert!(queue.all_tasks_completed());
    }
}

#[test]
fn test_completing_unknown_task_is_an_error() {
    let mut queue = create_queue(true);
    assert!(matches!(queue.mark_as_completed(2), Err(Error::Invariant(_))));
    assert!(matches!(queue.mark_as_failed(2), Err(Error::Invariant(_))));
}

#[test]
fn test_two_typings_tasks_for_one_entry_point_are_rejected() {
    let a = entry_point("a");
    let mut graph = DependencyGraph::new();
    graph.add_node(&a.path);

    let tasks = vec![
        task(0, &a, "fesm2015", DtsProcessing::Yes),
        task(1, &a, "main", DtsProcessing::Yes),
    ];
    assert!(matches!(
        create_task_queue(false, tasks, &graph),
        Err(Error::Invariant(_))
    ));
}
