mod bootstrap_helpers;
mod brain_runtime;
mod cli_args;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;
use crate::brain_runtime::run_brain;
use crate::cli_args::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_brain(cli, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}
