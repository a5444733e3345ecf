use anyhow::Result;
use comfy_table::Cell;
use indicatif::ProgressBar;
use serde_json::json;
use std::time::Duration;

use crate::output::{OutputFormat, create_table, print_output};
use crate::utils::{print_info, print_warning};
use meshpool_core::discovery;

pub async fn handle_discover(
    ports: Vec<String>,
    network: bool,
    listen: Duration,
    setup_timeout: Duration,
    format: OutputFormat,
) -> Result<()> {
    let candidates = if ports.is_empty() {
        discovery::list_local_endpoints()
    } else {
        ports
    };

    let mut probes = Vec::new();
    if candidates.is_empty() {
        print_warning("No serial candidates found. Try --ports or --network.");
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_message(format!(
            "Probing {count} serial endpoint(s)...",
            count = candidates.len()
        ));
        spinner.enable_steady_tick(Duration::from_millis(120));
        probes = discovery::scan_endpoints(candidates, setup_timeout).await;
        spinner.finish_and_clear();
    }

    let mut network_endpoints = Vec::new();
    if network {
        print_info(&format!("Listening for mDNS announcements for {listen:?}..."));
        network_endpoints = discovery::discover_network_endpoints(listen).await?;
    }

    match format {
        OutputFormat::Json => print_output(
            &json!({
                "probes": probes,
                "network": network_endpoints,
            }),
            format,
        ),
        OutputFormat::Table => {
            if !probes.is_empty() {
                let mut table = create_table();
                table.set_header(vec![
                    Cell::new("Endpoint"),
                    Cell::new("Node"),
                    Cell::new("Short"),
                    Cell::new("Hardware"),
                    Cell::new("Firmware"),
                    Cell::new("Status"),
                ]);
                for probe in &probes {
                    let row = match &probe.identity {
                        Some(identity) => vec![
                            Cell::new(&probe.endpoint),
                            Cell::new(&identity.id),
                            Cell::new(&identity.short_name),
                            Cell::new(identity.hardware_model.as_deref().unwrap_or("Unknown")),
                            Cell::new(identity.firmware_version.as_deref().unwrap_or("?")),
                            Cell::new("ok"),
                        ],
                        None => vec![
                            Cell::new(&probe.endpoint),
                            Cell::new("-"),
                            Cell::new("-"),
                            Cell::new("-"),
                            Cell::new("-"),
                            Cell::new(probe.error.as_deref().unwrap_or("no node")),
                        ],
                    };
                    table.add_row(row);
                }
                println!("{table}");
            }

            if !network_endpoints.is_empty() {
                let mut table = create_table();
                table.set_header(vec![Cell::new("Connection"), Cell::new("Instance")]);
                for endpoint in &network_endpoints {
                    table.add_row(vec![
                        Cell::new(&endpoint.connection_string),
                        Cell::new(&endpoint.instance_name),
                    ]);
                }
                println!("{table}");
            } else if network {
                println!("No mDNS-advertised nodes heard");
            }
        }
    }

    Ok(())
}
