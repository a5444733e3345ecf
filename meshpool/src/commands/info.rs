use anyhow::Result;
use comfy_table::Cell;
use serde_json::json;

use crate::output::{OutputFormat, create_table, print_output, print_snapshot};
use meshpool_core::Session;

pub async fn handle_info(session: &mut Session, format: OutputFormat) -> Result<()> {
    let identity = session.local_identity().await?;
    let config = session.local_config().await;

    match format {
        OutputFormat::Json => print_output(
            &json!({
                "identity": identity,
                "config": config,
            }),
            format,
        ),
        OutputFormat::Table => {
            let mut table = create_table();
            table.set_header(vec![Cell::new("Property"), Cell::new("Value")]);
            table.add_row(vec![Cell::new("Node ID"), Cell::new(&identity.id)]);
            table.add_row(vec![Cell::new("Short Name"), Cell::new(&identity.short_name)]);
            table.add_row(vec![Cell::new("Long Name"), Cell::new(&identity.long_name)]);
            table.add_row(vec![
                Cell::new("Hardware"),
                Cell::new(identity.hardware_model.as_deref().unwrap_or("Unknown")),
            ]);
            table.add_row(vec![
                Cell::new("Firmware"),
                Cell::new(identity.firmware_version.as_deref().unwrap_or("?")),
            ]);
            println!("{table}");

            if config.is_empty() {
                println!("No configuration pushed during handshake yet");
            } else {
                print_snapshot(&config);
            }
        }
    }

    Ok(())
}
