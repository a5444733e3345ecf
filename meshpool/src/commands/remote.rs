use anyhow::Result;

use crate::cli::RemoteCommands;
use crate::output::{OutputFormat, print_output, print_snapshot};
use crate::utils::{print_info, print_success, print_warning};
use meshpool_core::Session;
use meshpool_core::admin::{get_remote_config, section_names, verify_remote_admin};

pub async fn handle_remote(
    session: &mut Session,
    subcommand: RemoteCommands,
    format: OutputFormat,
) -> Result<()> {
    match subcommand {
        RemoteCommands::Verify { dest } => {
            verify_remote_admin(session, &dest).await?;
            print_success(&format!("Admin probe transmitted to {dest}"));
            print_info("Transmission is not delivery; run 'remote config' to confirm the target answers.");
        }

        RemoteCommands::Config {
            dest,
            wait,
            retries,
        } => {
            let snapshot = get_remote_config(session, &dest, wait, retries).await?;

            let expected = section_names().len();
            let captured = snapshot
                .section_names()
                .filter(|name| *name != "metadata")
                .count();
            if captured < expected {
                print_warning(&format!(
                    "Partial retrieval: {captured}/{expected} sections answered"
                ));
            }

            match format {
                OutputFormat::Json => print_output(&snapshot, format),
                OutputFormat::Table => print_snapshot(&snapshot),
            }
        }
    }

    Ok(())
}
