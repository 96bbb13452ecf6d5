//! hexboot - Field firmware updater for internal flash
//!
//! Programs the microcontroller's internal flash from an Intel HEX file on
//! removable media, then hands control to the application.
//!
//! # Architecture
//!
//! The flashing logic lives in `hexboot-core` and talks to the flash
//! controller through the `FlashController` trait. This binary drives it
//! against `hexboot-sim`, an emulation of the STM32F1 flash interface
//! backed by a raw image file, with a directory standing in for the card.

mod cli;
mod commands;
mod config;
mod hexfile;
mod image;
mod indicator;
mod media;

use clap::Parser;
use cli::{Cli, Commands};
use config::BoardConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let board = match BoardConfig::load(cli.board.as_deref()) {
        Ok(board) => board,
        Err(e) => {
            eprintln!("Failed to load board description: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Update { media, flash, keep } => {
            commands::run_update(&board, &media, &flash, keep)
        }
        Commands::Info => commands::run_info(&board),
        Commands::Dump { flash, page } => commands::run_dump(&board, &flash, page),
        Commands::Erase { flash, page } => commands::run_erase(&board, &flash, page),
        Commands::Boot { flash } => commands::run_boot(&board, &flash),
    }
}
