//! CLI Adapter
//!
//! Command-line interface for the portage engine.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{CliApp, Command, ExecuteCmd, ProvidersCmd, QuoteCmd};

use anyhow::Result;

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    match app.command {
        Command::Quote(cmd) => commands::quote_command(cmd).await,
        Command::Providers(cmd) => commands::providers_command(cmd).await,
        Command::Execute(cmd) => commands::execute_command(cmd).await,
    }
}
