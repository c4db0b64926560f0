//! Turns sorted entry points into compilation tasks.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use crate::build_marker::{has_been_processed, TYPINGS_PROPERTY};
use crate::entry_point::{EntryPoint, SUPPORTED_FORMAT_PROPERTIES};
use crate::package_json::PackageJson;
use crate::tasks::{DtsProcessing, Task};

/// Format properties to process for one entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertiesToProcess {
    /// One property per distinct bundle, in preference order.
    pub properties: Vec<String>,
    /// For each requested property, every supported property sharing its bundle.
    pub equivalent_properties: HashMap<String, SmallVec<[String; 4]>>,
}

/// Picks the properties to compile from `properties_to_consider`.
///
/// Properties pointing at a bundle already picked are left out. Without
/// `compile_all_formats`, or with `typings_only`, only the first usable
/// property is picked.
pub fn get_properties_to_process(
    package_json: &PackageJson,
    properties_to_consider: &[String],
    compile_all_formats: bool,
    typings_only: bool,
) -> PropertiesToProcess {
    let mut format_paths: HashSet<&str> = HashSet::new();
    let mut properties = Vec::new();

    for property in properties_to_consider {
        let Some(format_path) = package_json.get_str(property) else {
            continue;
        };
        if !format_paths.insert(format_path) {
            continue;
        }
        properties.push(property.clone());
        if !compile_all_formats || typings_only {
            break;
        }
    }

    let mut by_format_path: HashMap<&str, SmallVec<[String; 4]>> = HashMap::new();
    for property in SUPPORTED_FORMAT_PROPERTIES {
        let Some(format_path) = package_json.get_str(property) else {
            continue;
        };
        if format_paths.contains(format_path) {
            by_format_path
                .entry(format_path)
                .or_default()
                .push(property.to_string());
        }
    }

    let equivalent_properties = properties_to_consider
        .iter()
        .filter_map(|property| {
            let format_path = package_json.get_str(property)?;
            let equivalents = by_format_path.get(format_path).cloned().unwrap_or_default();
            Some((property.clone(), equivalents))
        })
        .collect();

    PropertiesToProcess {
        properties,
        equivalent_properties,
    }
}

/// Settings that shape the task list.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub properties_to_consider: Vec<String>,
    pub compile_all_formats: bool,
    pub typings_only: bool,
}

/// Planned tasks plus entry points with no usable property.
#[derive(Debug, Clone, Default)]
pub struct PlannedTasks {
    pub tasks: Vec<Task>,
    pub unprocessable: Vec<PathBuf>,
}

/// Plans tasks for entry points already sorted by dependency.
///
/// Already-processed properties produce no task. Typings are attached to
/// the first task of an entry point unless already processed.
pub fn plan_tasks(entry_points: &[Arc<EntryPoint>], options: &PlanOptions) -> PlannedTasks {
    let mut planned = PlannedTasks::default();

    for entry_point in entry_points {
        let package_json = &entry_point.package_json;
        let to_process = get_properties_to_process(
            package_json,
            &options.properties_to_consider,
            options.compile_all_formats,
            options.typings_only,
        );
        if to_process.properties.is_empty() {
            planned.unprocessable.push(entry_point.path.clone());
            continue;
        }

        let has_processed_typings = has_been_processed(package_json, TYPINGS_PROPERTY);
        if has_processed_typings && options.typings_only {
            debug!("Skipping {} : typings have already been processed.", entry_point.name);
            continue;
        }
        let mut process_dts = if has_processed_typings {
            DtsProcessing::No
        } else if options.typings_only {
            DtsProcessing::Only
        } else {
            DtsProcessing::Yes
        };

        for property in to_process.properties {
            if has_been_processed(package_json, &property) {
                debug!("Skipping {} : {} (already compiled).", entry_point.name, property);
                continue;
            }

            let equivalents = to_process
                .equivalent_properties
                .get(&property)
                .cloned()
                .unwrap_or_else(|| SmallVec::from_vec(vec![property.clone()]));
            planned.tasks.push(Task {
                id: planned.tasks.len(),
                entry_point: Arc::clone(entry_point),
                format_property: property,
                format_properties_to_mark_as_processed: equivalents,
                process_dts,
            });
            process_dts = DtsProcessing::No;
        }
    }

    debug!(
        "Analyzed {} entry-points (Total tasks: {})",
        entry_points.len(),
        planned.tasks.len()
    );
    planned
}
