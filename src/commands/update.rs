//! Update command: the bootloader flow
//!
//! Mount the card, program the firmware file into flash, remove the file,
//! signal any failure on the status LED and hand over to the application.
//! A pass aborted in the middle of the records leaves the file in place.

use std::path::Path;

use hexboot_core::boot::BootError;
use hexboot_core::flash::ProgramStats;
use hexboot_core::status::FlashingFlag;
use hexboot_core::update::{apply_image, UpdateProgress, UpdateReport};
use hexboot_sim::SimFlash;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::BoardConfig;
use crate::hexfile::HexFile;
use crate::image;
use crate::indicator::{blink_error, Indicator, Led};
use crate::media::Medium;

/// Raised while flash is being modified; watched by the indicator thread
static FLASHING: FlashingFlag = FlashingFlag::new();

/// Progress reporter using an indicatif progress bar over payload bytes
pub struct IndicatifProgress {
    bar: ProgressBar,
    bytes: u64,
}

impl IndicatifProgress {
    pub fn new(total_bytes: usize) -> Self {
        let bar = ProgressBar::new(total_bytes as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar, bytes: 0 }
    }

    /// Leave the bar where it stopped
    pub fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.abandon_with_message("failed");
        }
    }
}

impl UpdateProgress for IndicatifProgress {
    fn record(&mut self, _address: u32, len: usize) {
        self.bytes += len as u64;
        self.bar.set_position(self.bytes);
    }

    fn page_committed(&mut self, stats: &ProgramStats) {
        self.bar
            .set_message(format!("{} pages committed", stats.pages_committed));
    }

    fn complete(&mut self, report: &UpdateReport) {
        self.bar.finish_with_message("Flashing complete");

        let pages = &report.pages;
        if pages.pages_written == 0 {
            println!("Flash already contains the firmware - no changes needed");
        } else {
            println!(
                "Programmed {} bytes: {} pages written ({} erased), {} unchanged",
                report.bytes, pages.pages_written, pages.pages_erased, pages.pages_unchanged
            );
        }
        if let Some(entry) = report.entry_point {
            println!("Image entry point: 0x{:08X}", entry);
        }
    }
}

/// Run the update command
pub fn run_update(
    board: &BoardConfig,
    media: &Path,
    flash_path: &Path,
    keep: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let geometry = board.geometry()?;
    let mut flash = image::open(flash_path, geometry)?;

    let indicator = Indicator::spawn(&FLASHING, board.busy_blink_period());
    let outcome = flash_from_card(board, media, &mut flash, keep);
    indicator.stop();

    image::save(flash_path, &flash)?;

    if let Err(error) = outcome {
        let mut led = Led::new("status");
        blink_error(&mut led, error, board.blink_period());
        super::boot::hand_over(&flash);
        return Err(error.into());
    }

    super::boot::hand_over(&flash);
    Ok(())
}

/// Everything between card detection and the end of flashing
fn flash_from_card(
    board: &BoardConfig,
    media: &Path,
    flash: &mut SimFlash,
    keep: bool,
) -> Result<UpdateReport, BootError> {
    let medium = Medium::mount(media, board.connect_timeout()).map_err(|e| {
        log::error!("{}", e);
        e.boot_error()
    })?;

    let name = board.media.firmware_name.as_str();
    let hexdata = medium.read_firmware(name).map_err(|e| {
        log::error!("{}", e);
        e.boot_error()
    })?;

    let mut hex = HexFile::parse(&hexdata);
    log::debug!("Decoded {} records", hex.len());

    let mut progress = IndicatifProgress::new(hex.payload_len());
    let result = apply_image(&mut hex, flash, &FLASHING, &mut progress);
    if let Err(e) = &result {
        progress.abandon();
        if !e.reached_end() {
            log::error!("Update aborted: {}", e);
            return Err(BootError::from(*e));
        }
    }

    if !keep {
        if let Err(e) = medium.remove_firmware(name) {
            log::warn!("Failed to remove firmware file: {}", e);
        }
    }

    result.map_err(|e| {
        log::error!("Update failed: {}", e);
        BootError::from(e)
    })
}
