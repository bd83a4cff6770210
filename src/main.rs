use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use kayako_tickets::app;
use kayako_tickets::cli::{Cli, Commands};
use kayako_tickets::config::{self, TicketsConfig};
use kayako_tickets::util::setup_tracing;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", app::error_document(&err));
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let config = TicketsConfig::load_or_init()?;
    let runtime = config::runtime_settings();

    match cli.command {
        Some(Commands::Status) => app::print_status(&config),
        Some(Commands::Login) => app::login(&config, &runtime),
        Some(Commands::Logout) => app::logout(&config, &runtime),
        Some(Commands::Poll { text }) => app::poll(&config, &runtime, text),
        None => app::poll(&config, &runtime, false),
    }
}
