//! Info command: show the flash layout

use crate::config::BoardConfig;

/// Run the info command
pub fn run_info(board: &BoardConfig) -> Result<(), Box<dyn std::error::Error>> {
    let geometry = board.geometry()?;
    let user_pages = geometry.page_count() - geometry.user_start_page().0;

    println!("Flash Layout");
    println!("============");
    println!();
    println!("Base:            0x{:08X}", geometry.base());
    println!(
        "Size:            {} bytes ({} KiB)",
        geometry.size(),
        geometry.size() / 1024
    );
    println!(
        "Pages:           {} x {} bytes",
        geometry.page_count(),
        geometry.page_size()
    );
    println!(
        "Bootloader:      0x{:08X} - 0x{:08X} ({} pages)",
        geometry.base(),
        geometry.user_base() - 1,
        geometry.user_start_page().0
    );
    println!(
        "User region:     0x{:08X} - 0x{:08X} ({} pages)",
        geometry.user_base(),
        geometry.base() + geometry.size() - 1,
        user_pages
    );
    println!();
    println!("Firmware file:   {}", board.media.firmware_name);
    println!("Card timeout:    {} ms", board.media.connect_timeout_ms);

    Ok(())
}
