//! `quill`: sequential, streamed chapter generation from the command line.

mod app;
mod cli;
mod config;
mod logging;
mod outline;
mod store;

use anyhow::Result;
use clap::Parser;

use cli::Cli;
use config::QuillConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = QuillConfig::load(cli.config.as_deref())?.with_overrides(&cli);
    logging::initialize(config.log_destination, config.log_level(), &config.log_file);

    app::run(cli.command, config).await
}
