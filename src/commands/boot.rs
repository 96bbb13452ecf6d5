//! Boot command: hand control to the application in flash

use std::path::Path;

use hexboot_core::boot::VectorTable;
use hexboot_core::controller::FlashController;
use hexboot_sim::SimFlash;

use crate::config::BoardConfig;
use crate::image;

/// Inspect the application's vector table and report the jump
///
/// Returns the vector table when it looks like a real application.
pub fn hand_over(flash: &SimFlash) -> Option<VectorTable> {
    let vectors = VectorTable::read(flash);
    let user_base = flash.geometry().user_base();

    if vectors.is_plausible(flash) {
        log::info!(
            "Jumping to application at 0x{:08X} (SP=0x{:08X}, reset=0x{:08X})",
            user_base,
            vectors.initial_sp,
            vectors.reset_vector
        );
        Some(vectors)
    } else {
        log::warn!("No application found at 0x{:08X}", user_base);
        None
    }
}

/// Run the boot command
pub fn run_boot(board: &BoardConfig, flash_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let flash = image::open(flash_path, board.geometry()?)?;
    match hand_over(&flash) {
        Some(vectors) => {
            println!("Initial SP:   0x{:08X}", vectors.initial_sp);
            println!("Reset vector: 0x{:08X}", vectors.reset_vector);
            Ok(())
        }
        None => Err("No bootable application in flash".into()),
    }
}
