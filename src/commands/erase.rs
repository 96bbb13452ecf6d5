//! Erase command: erase a single user page

use std::path::Path;

use hexboot_core::controller::FlashController;
use hexboot_core::flash::page;
use hexboot_core::geometry::Page;
use hexboot_core::Error;

use crate::config::BoardConfig;
use crate::image;

/// Run the erase command
///
/// Pages holding the bootloader are refused.
pub fn run_erase(
    board: &BoardConfig,
    flash_path: &Path,
    index: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut flash = image::open(flash_path, board.geometry()?)?;
    let page = Page(index);
    if !flash.geometry().is_user_page(page) {
        return Err(Error::NoPermission.into());
    }

    if page::is_erased(&flash, page) {
        println!("Page {} is already erased", index);
        return Ok(());
    }

    page::erase(&mut flash, page)?;
    image::save(flash_path, &flash)?;
    println!("Erased page {}", index);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn board() -> BoardConfig {
        BoardConfig::from_toml_str(
            "[flash]\n\
             base = 0x08000000\n\
             page_size = 256\n\
             page_count = 8\n\
             user_base = 0x08000200\n",
        )
        .unwrap()
    }

    #[test]
    fn test_erase_user_page_only() {
        let path = std::env::temp_dir().join(format!("hexboot-erase-{}.bin", std::process::id()));
        fs::write(&path, vec![0u8; 2048]).unwrap();

        run_erase(&board(), &path, 3).unwrap();
        let data = fs::read(&path).unwrap();
        assert!(data[0x300..0x400].iter().all(|&b| b == 0xFF));
        assert!(data[0x200..0x300].iter().all(|&b| b == 0x00));

        assert!(run_erase(&board(), &path, 1).is_err());
        let data = fs::read(&path).unwrap();
        assert!(data[0x100..0x200].iter().all(|&b| b == 0x00));
        fs::remove_file(&path).unwrap();
    }
}
