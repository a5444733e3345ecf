use comfy_table::{Cell, Table};
use meshpool_core::ConfigSnapshot;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Json,
    Table,
}

pub fn print_output<T: Serialize>(data: T, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&data) {
                println!("{}", json);
            }
        }
        OutputFormat::Table => {
            // Default table output - override in specific implementations
            if let Ok(json) = serde_json::to_string_pretty(&data) {
                println!("{}", json);
            }
        }
    }
}

pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table
}

/// Renders a section-keyed snapshot as section/field/value rows.
pub fn print_snapshot(snapshot: &ConfigSnapshot) {
    let mut table = create_table();
    table.set_header(vec![
        Cell::new("Section"),
        Cell::new("Field"),
        Cell::new("Value"),
    ]);
    for (section, fields) in snapshot.iter() {
        match fields {
            Value::Object(map) => {
                for (field, value) in map {
                    table.add_row(vec![
                        Cell::new(section),
                        Cell::new(field),
                        Cell::new(render_value(value)),
                    ]);
                }
            }
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    table.add_row(vec![
                        Cell::new(section),
                        Cell::new(index),
                        Cell::new(render_value(item)),
                    ]);
                }
            }
            other => {
                table.add_row(vec![
                    Cell::new(section),
                    Cell::new(""),
                    Cell::new(render_value(other)),
                ]);
            }
        }
    }
    println!("{table}");
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
