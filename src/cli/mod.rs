//! Command-line interface.

pub mod commands;
pub mod context;
pub mod output;
pub mod types;

pub use context::AppContext;
pub use types::{Cli, Commands, JobCommands, TargetArgs};

use anyhow::Result;

/// Parse-independent entry point: build the context and dispatch.
pub async fn run(cli: Cli) -> Result<()> {
    let ctx = AppContext::build(cli.config.as_deref()).await?;
    match cli.command {
        Commands::Job(command) => commands::job::execute(command, &ctx, cli.json).await,
        command => commands::corpus::execute(command, &ctx, cli.json).await,
    }
}

/// Print an error chain and exit non-zero.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({ "error": err.to_string(), "causes": chain });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
    std::process::exit(1);
}
