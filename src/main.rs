//! demand-corpus CLI entry point.

use clap::Parser;

use demand_corpus::cli::{handle_error, run, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    if let Err(err) = run(cli).await {
        handle_error(&err, json);
    }
}
