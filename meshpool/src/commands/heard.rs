use anyhow::Result;
use comfy_table::Cell;
use serde_json::json;

use crate::output::{OutputFormat, create_table, print_output};
use crate::utils::{format_hops, format_snr, format_timestamp};
use meshpool_core::Session;
use meshpool_core::heard::import_heard;

pub async fn handle_heard(session: &mut Session, history: bool, format: OutputFormat) -> Result<()> {
    let identity = session.local_identity().await?;
    let state = session.state_snapshot().await;
    let (nodes, log) = import_heard(&state, &identity.id);

    if nodes.is_empty() {
        println!("No nodes overheard yet; leave the session listening longer");
        return Ok(());
    }

    match format {
        OutputFormat::Json => {
            if history {
                print_output(&json!({ "history": log }), format)
            } else {
                print_output(&json!({ "nodes": nodes }), format)
            }
        }
        OutputFormat::Table => {
            if history {
                let mut table = create_table();
                table.set_header(vec![
                    Cell::new("Node"),
                    Cell::new("Name"),
                    Cell::new("Seen By"),
                    Cell::new("SNR"),
                    Cell::new("Hops"),
                    Cell::new("Position"),
                    Cell::new("When"),
                ]);
                for entry in &log {
                    let position = match (entry.position_lat, entry.position_lon) {
                        (Some(lat), Some(lon)) => format!("{lat:.4},{lon:.4}"),
                        _ => "-".to_string(),
                    };
                    table.add_row(vec![
                        Cell::new(&entry.node_id),
                        Cell::new(&entry.long_name),
                        Cell::new(&entry.seen_by),
                        Cell::new(format_snr(entry.snr)),
                        Cell::new(format_hops(entry.hops_away)),
                        Cell::new(position),
                        Cell::new(format_timestamp(&entry.timestamp)),
                    ]);
                }
                println!("{table}");
            } else {
                let mut table = create_table();
                table.set_header(vec![
                    Cell::new("Short Name"),
                    Cell::new("Node ID"),
                    Cell::new("Hardware"),
                    Cell::new("SNR"),
                    Cell::new("Hops"),
                    Cell::new("Last Seen"),
                ]);
                for node in &nodes {
                    table.add_row(vec![
                        Cell::new(&node.short_name),
                        Cell::new(&node.id),
                        Cell::new(node.hw_model.as_deref().unwrap_or("Unknown")),
                        Cell::new(format_snr(node.snr)),
                        Cell::new(format_hops(node.hops_away)),
                        Cell::new(format_timestamp(&node.last_seen)),
                    ]);
                }
                println!("{table}");
            }
        }
    }

    Ok(())
}
