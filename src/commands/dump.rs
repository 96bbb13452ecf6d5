//! Dump command: hex dump of one flash page

use std::path::Path;

use hexboot_core::controller::FlashController;
use hexboot_core::flash::page;
use hexboot_core::geometry::Page;

use crate::config::BoardConfig;
use crate::image;

const BYTES_PER_LINE: usize = 16;

/// Run the dump command
pub fn run_dump(
    board: &BoardConfig,
    flash_path: &Path,
    index: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let flash = image::open(flash_path, board.geometry()?)?;
    let geometry = flash.geometry();
    if index >= geometry.page_count() {
        return Err(format!(
            "Page {} out of range (flash has {} pages)",
            index,
            geometry.page_count()
        )
        .into());
    }

    let page = Page(index);
    let contents = page::read(&flash, page);
    for line in format_dump(geometry.page_base(page), contents.as_slice()) {
        println!("{}", line);
    }
    Ok(())
}

/// Format `data` as address-prefixed hex lines starting at `base`
fn format_dump(base: u32, data: &[u8]) -> Vec<String> {
    data.chunks(BYTES_PER_LINE)
        .enumerate()
        .map(|(i, chunk)| {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{:02X}", b)).collect();
            format!(
                "0x{:08X}: {}",
                base + (i * BYTES_PER_LINE) as u32,
                hex.join(" ")
            )
        })
        .collect()
}
