//! Table formatting utilities using comfy-table.

use comfy_table::{Cell, Table};

/// Prints entry points with their format and typings states.
pub fn print_entry_point_table(rows: &[(String, String, String)]) {
    let mut table = Table::new();
    table
        .set_header(vec![
            Cell::new("Entry point").add_attribute(comfy_table::Attribute::Bold),
            Cell::new("Formats").add_attribute(comfy_table::Attribute::Bold),
            Cell::new("Typings").add_attribute(comfy_table::Attribute::Bold),
        ])
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .set_content_arrangement(comfy_table::ContentArrangement::Dynamic);

    for (name, formats, typings) in rows {
        table.add_row(vec![
            Cell::new(name).fg(comfy_table::Color::White),
            Cell::new(formats),
            Cell::new(typings),
        ]);
    }

    println!("{}", table);
}
