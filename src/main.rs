//! Presso - a request-addressed web asset optimization pipeline.

mod asset;
mod cache;
mod cli;
mod config;
mod core;
mod filter;
mod logger;
mod param;
mod registry;
mod request;
mod response;
mod utils;

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match &cli.command {
        Commands::Serve { interface, port } => cli::serve::run(config, *interface, *port),
        Commands::Render { request, output } => {
            cli::render::run(&config, request, output.as_deref())
        }
    }
}
