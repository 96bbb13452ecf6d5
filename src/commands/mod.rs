//! CLI command implementations
//!
//! `update` runs the bootloader flow against a card directory and a flash
//! image file. The remaining commands inspect or maintain the image.

mod boot;
mod dump;
mod erase;
mod info;
mod update;

pub use boot::run_boot;
pub use dump::run_dump;
pub use erase::run_erase;
pub use info::run_info;
pub use update::run_update;
