//! Discovery and inspection commands.

use std::path::PathBuf;

use anyhow::Result;
use owo_colors::OwoColorize;
use recompiler::discover;
use recompiler_core::build_marker::{processed_version, TYPINGS_PROPERTY, VERSION};
use recompiler_core::EntryPoint;
use serde_json::{json, Map, Value};

use super::resolve_options;
use crate::formatting::{print_entry_point_table, print_section_header, SectionStyle};

/// Formats of `entry_point` among `properties`, with their processed state.
fn format_states<'a>(
    entry_point: &'a EntryPoint,
    properties: &'a [String],
) -> Vec<(&'a str, Option<&'a str>)> {
    properties
        .iter()
        .filter(|property| entry_point.format_path(property).is_some())
        .map(|property| {
            (
                property.as_str(),
                processed_version(&entry_point.package_json, property),
            )
        })
        .collect()
}

fn describe_state(version: Option<&str>) -> String {
    match version {
        Some(v) if v == VERSION => "✓".green().to_string(),
        Some(v) => format!("stale ({})", v).yellow().to_string(),
        None => "✗".bright_black().to_string(),
    }
}

pub fn cmd_scan(base_path: PathBuf, json: bool) -> Result<()> {
    let options = resolve_options(base_path)?;
    let info = discover(&options)?;

    if json {
        let entry_points: Vec<Value> = info
            .entry_points
            .iter()
            .map(|ep| {
                let formats: Map<String, Value> = format_states(ep, &options.properties_to_consider)
                    .into_iter()
                    .map(|(property, version)| (property.to_string(), json!(version)))
                    .collect();
                json!({
                    "name": ep.name,
                    "path": ep.path,
                    "package": ep.package_name,
                    "formats": formats,
                    "typings": processed_version(&ep.package_json, TYPINGS_PROPERTY),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entry_points)?);
        return Ok(());
    }

    println!("{}", "[Scanning entry-points...]".bold().cyan());
    println!();
    if info.entry_points.is_empty() {
        println!("  {} No entry-points found", "WARNING:".yellow());
        println!();
        return Ok(());
    }

    println!(
        "  {} Found {} {}",
        "OK".green(),
        info.entry_points.len().to_string().bold().cyan(),
        "entry-points".bold()
    );
    println!();

    let rows: Vec<(String, String, String)> = info
        .entry_points
        .iter()
        .map(|ep| {
            let formats = format_states(ep, &options.properties_to_consider)
                .into_iter()
                .map(|(property, version)| format!("{} {}", property, describe_state(version)))
                .collect::<Vec<_>>()
                .join(", ");
            let typings = describe_state(processed_version(&ep.package_json, TYPINGS_PROPERTY));
            (ep.name.clone(), formats, typings)
        })
        .collect();
    print_entry_point_table(&rows);
    println!();

    Ok(())
}

pub fn cmd_graph(base_path: PathBuf, json: bool) -> Result<()> {
    let options = resolve_options(base_path)?;
    let info = discover(&options)?;

    if json {
        let graph_data = json!({
            "order": info.entry_points.iter().map(|ep| &ep.name).collect::<Vec<_>>(),
            "invalid": info.invalid_entry_points.iter().map(|invalid| json!({
                "name": invalid.entry_point.name,
                "path": invalid.entry_point.path,
                "missing": invalid.missing_dependencies,
            })).collect::<Vec<_>>(),
            "ignored": info.ignored_dependencies.iter().map(|ignored| json!({
                "name": ignored.entry_point.name,
                "dependency": ignored.dependency_path,
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&graph_data)?);
        return Ok(());
    }

    print_section_header("[Dependency Graph]", SectionStyle::Primary);

    if info.entry_points.is_empty() {
        println!("  {} No entry-points found", "WARNING:".yellow());
    } else {
        println!(
            "  {} Processing order ({} entry-points):",
            "OK".green(),
            info.entry_points.len().to_string().bold().cyan()
        );
        println!();
        for (idx, ep) in info.entry_points.iter().enumerate() {
            println!(
                "  {} {}",
                format!("{:2}", idx + 1).bright_black(),
                ep.name.bold().white()
            );
        }
    }
    println!();

    if !info.invalid_entry_points.is_empty() {
        print_section_header("Invalid entry-points", SectionStyle::Error);
        for invalid in &info.invalid_entry_points {
            println!("  {} {}", "✗".red(), invalid.entry_point.name.bold());
            for missing in &invalid.missing_dependencies {
                println!("      {} {}", "missing".bright_black(), missing);
            }
        }
        println!();
    }

    if !info.ignored_dependencies.is_empty() {
        print_section_header("Ignored dependencies", SectionStyle::Warning);
        for ignored in &info.ignored_dependencies {
            println!(
                "  {} {} {}",
                ignored.entry_point.name.bold(),
                "→".bright_black(),
                ignored.dependency_path.display()
            );
        }
        println!();
    }

    Ok(())
}
