mod cli;
mod commands;
mod config;
mod controller;
mod database;
mod eos;
mod error;
mod export;
mod inputs;
mod logging;
mod plugins;
mod selector;
mod workflows;

#[cfg(test)]
mod commands_test;

use crate::{
    cli::{Cli, Commands},
    config::CampaignConfig,
    error::Result,
};
use clap::Parser;
use tracing::{debug, info};

fn main() {
    let cli = Cli::parse();

    if let Err(error) = logging::setup_logging(cli.verbose, cli.quiet) {
        eprintln!("{error}");
        std::process::exit(1);
    }

    if let Err(error) = run(cli) {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    debug!("Full CLI arguments parsed: {:?}", &cli);

    let mut config = CampaignConfig::load(&cli.config)?;
    if let Some(set) = cli.set {
        config.set = set;
    }
    if let Some(plugin_file) = cli.plugin_file {
        config.plugin_file = plugin_file;
    }
    config.preflight_checks()?;

    info!(
        campaign = %config.campaign,
        set = %config.set,
        "{} v{} starting up",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    match cli.command {
        Commands::Select => commands::select(&config).map(|_| ()),
        Commands::Export(args) => commands::export(&config, &args),
        Commands::Status => commands::status(&config).map(|_| ()),
        Commands::Submit(args) => commands::submit(&config, &args).map(|_| ()),
        Commands::SubmitOne(args) => commands::submit_one(&config, &args).map(|_| ()),
    }
}
