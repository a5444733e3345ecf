use anyhow::Result;
use colored::*;
use comfy_table::Cell;
use serde_json::json;
use std::time::Duration;

use crate::output::{OutputFormat, create_table, print_output};
use crate::utils::print_warning;
use meshpool_core::Session;
use meshpool_core::admin::get_remote_config;
use meshpool_core::checker::{CheckStatus, ConfigChecker};

pub async fn handle_check(
    session: &mut Session,
    dest: Option<&str>,
    hop_limit: u64,
    region: Option<String>,
    timeout: Duration,
    format: OutputFormat,
) -> Result<()> {
    let (node_id, config) = match dest {
        Some(target) => {
            let snapshot = get_remote_config(session, target, timeout, 1).await?;
            let node_id = session
                .resolve_node(target)
                .await
                .map(|entry| entry.id)
                .unwrap_or_else(|| target.to_string());
            (node_id, snapshot)
        }
        None => {
            let identity = session.local_identity().await?;
            (identity.id, session.local_config().await)
        }
    };

    let checker = ConfigChecker::new(hop_limit, region);
    let checks = checker.check_node(&node_id, &config);

    match format {
        OutputFormat::Json => print_output(&json!({ "checks": checks }), format),
        OutputFormat::Table => {
            let mut table = create_table();
            table.set_header(vec![
                Cell::new("Check"),
                Cell::new("Status"),
                Cell::new("Message"),
            ]);
            for check in &checks {
                let status = match check.status {
                    CheckStatus::Pass => "pass".green().to_string(),
                    CheckStatus::Warning => "warning".yellow().to_string(),
                    CheckStatus::Fail => "fail".red().to_string(),
                };
                table.add_row(vec![
                    Cell::new(check.check_type),
                    Cell::new(status),
                    Cell::new(&check.message),
                ]);
            }
            println!("{table}");

            let failed = checks
                .iter()
                .filter(|c| c.status == CheckStatus::Fail)
                .count();
            if failed > 0 {
                print_warning(&format!("{failed} check(s) failed on {node_id}"));
            }
        }
    }

    Ok(())
}
