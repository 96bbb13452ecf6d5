//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal page index
fn parse_page(s: &str) -> Result<u16, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u16>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "hexboot")]
#[command(author, version, about = "Field firmware updater for internal flash", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Board description file (TOML format); defaults to STM32F107
    #[arg(long, global = true)]
    pub board: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Flash the firmware file from the card, then boot the application
    Update {
        /// Directory standing in for the removable card
        #[arg(short, long)]
        media: PathBuf,

        /// Raw flash image file (created erased if missing)
        #[arg(short, long)]
        flash: PathBuf,

        /// Keep the firmware file on the card after flashing
        #[arg(long)]
        keep: bool,
    },

    /// Show the flash layout
    Info,

    /// Hex dump one flash page
    Dump {
        /// Raw flash image file
        #[arg(short, long)]
        flash: PathBuf,

        /// Page index (hex or decimal)
        #[arg(short, long, value_parser = parse_page)]
        page: u16,
    },

    /// Erase one page of the user region
    Erase {
        /// Raw flash image file
        #[arg(short, long)]
        flash: PathBuf,

        /// Page index (hex or decimal)
        #[arg(short, long, value_parser = parse_page)]
        page: u16,
    },

    /// Hand over to the application in flash
    Boot {
        /// Raw flash image file
        #[arg(short, long)]
        flash: PathBuf,
    },
}
