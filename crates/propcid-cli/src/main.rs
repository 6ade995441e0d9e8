use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

mod args;
mod cmd;
mod io;
mod logging;
mod output;
mod progress;
mod settings;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = args::Cli::parse();
    output::init(cli.json);
    logging::init(cli.log_json)?;

    cmd::dispatch(cli).await
}
