mod check;
mod discover;
mod heard;
mod info;
mod message;
mod remote;

use anyhow::{Context, Result};
use meshpool_core::Session;

use crate::cli::{Cli, Commands};
use crate::output::OutputFormat;

pub async fn handle_command(cli: Cli) -> Result<()> {
    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let timeout = cli.timeout_duration();
    let port = cli.port.clone();

    match cli.command {
        // Discovery enumerates endpoints on its own; no session yet.
        Commands::Discover {
            ports,
            network,
            listen,
        } => discover::handle_discover(ports, network, listen, timeout, format).await,

        command => {
            let port = port.context("--port is required for this command")?;
            let mut session = Session::open(&port, timeout).await?;
            let result = dispatch(&mut session, command, timeout, format).await;
            let closed = session.close().await;
            result.and(closed)
        }
    }
}

async fn dispatch(
    session: &mut Session,
    command: Commands,
    timeout: std::time::Duration,
    format: OutputFormat,
) -> Result<()> {
    match command {
        Commands::Info => info::handle_info(session, format).await,
        Commands::Heard { history } => heard::handle_heard(session, history, format).await,
        Commands::Message { dest, text, wait } => {
            message::handle_message(session, &dest, &text, wait, format).await
        }
        Commands::Remote { subcommand } => remote::handle_remote(session, subcommand, format).await,
        Commands::Check {
            dest,
            hop_limit,
            region,
        } => check::handle_check(session, dest.as_deref(), hop_limit, region, timeout, format).await,
        Commands::Discover { .. } => unreachable!("handled before a session is opened"),
    }
}
