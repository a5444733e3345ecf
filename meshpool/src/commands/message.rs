use anyhow::Result;
use std::time::Duration;

use crate::output::{OutputFormat, print_output};
use crate::utils::{print_success, print_warning};
use meshpool_core::Session;
use meshpool_core::admin::send_acknowledged_message;

pub async fn handle_message(
    session: &mut Session,
    dest: &str,
    text: &str,
    wait: Duration,
    format: OutputFormat,
) -> Result<()> {
    let report = send_acknowledged_message(session, dest, text, wait).await?;

    match format {
        OutputFormat::Json => print_output(&report, format),
        OutputFormat::Table => {
            if report.ack_received {
                print_success(&format!(
                    "Acknowledged by {responder} (packet {id:08x})",
                    responder = report.responder_id.as_deref().unwrap_or("unknown"),
                    id = report.packet_id
                ));
            } else {
                print_warning(
                    report
                        .error
                        .as_deref()
                        .unwrap_or("No acknowledgement received"),
                );
            }
        }
    }

    Ok(())
}
