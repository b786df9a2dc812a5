use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod settings;

use cli::Cli;

fn init_logging(debug: bool, json: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.log_json);

    let config = settings::load(cli.config.as_deref())?;
    if let Err(e) = commands::run(cli.command, &config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
