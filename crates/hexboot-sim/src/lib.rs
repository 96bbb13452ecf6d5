//! hexboot-sim - In-memory emulation of an STM32F1 flash controller
//!
//! [`SimRegisters`] implements the FPEC register block on top of a byte
//! array, so [`Stm32F1Flash`] drives it exactly like the real peripheral:
//!
//! - `CR.LOCK` is set on reset and cleared only by the `KEY1`/`KEY2`
//!   sequence; a wrong key locks the controller until reset
//! - `PER` + `STRT` erases the page addressed by `AR` to all ones
//! - half-word stores with `PG` set can only clear bits; storing over a
//!   programmed half-word sets `PGERR` and leaves it unchanged
//! - `SR.BSY` stays set for a configurable number of polls after each cycle
//!
//! Wear counters and fault injection (stuck bits, weak cells) make it the
//! test double for the flash layer and the backing store of the CLI.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;
#[cfg(feature = "alloc")]
use core::cell::Cell;

#[cfg(feature = "alloc")]
use hexboot_core::geometry::{FlashGeometry, Page, ERASED_BYTE};
#[cfg(feature = "alloc")]
use hexboot_core::stm32f1::{Cr, FlashRegisters, Sr, KEY1, KEY2};
pub use hexboot_core::stm32f1::Stm32F1Flash;

/// Flash controller backed by the emulator
#[cfg(feature = "alloc")]
pub type SimFlash = Stm32F1Flash<SimRegisters>;

/// Emulated flash register block and flash array
#[cfg(feature = "alloc")]
#[derive(Debug, Clone)]
pub struct SimRegisters {
    geometry: FlashGeometry,
    data: Vec<u8>,
    cr: u32,
    sr: Cell<u32>,
    ar: u32,
    key_stage: u8,
    key_lockout: bool,
    busy_polls: u32,
    busy_remaining: Cell<u32>,
    erase_counts: Vec<u32>,
    half_words_programmed: u64,
    stuck_zero: Vec<(u32, u8)>,
    weak: Vec<u32>,
}

#[cfg(feature = "alloc")]
impl SimRegisters {
    /// Erased flash with the given layout, controller locked
    pub fn new(geometry: FlashGeometry) -> Self {
        Self {
            data: vec![ERASED_BYTE; geometry.size() as usize],
            erase_counts: vec![0; geometry.page_count() as usize],
            geometry,
            cr: Cr::LOCK.bits(),
            sr: Cell::new(0),
            ar: 0,
            key_stage: 0,
            key_lockout: false,
            busy_polls: 2,
            busy_remaining: Cell::new(0),
            half_words_programmed: 0,
            stuck_zero: Vec::new(),
            weak: Vec::new(),
        }
    }

    /// Flash pre-loaded with `image` from the start of flash
    ///
    /// Shorter images leave the rest erased; longer ones are truncated.
    pub fn with_image(geometry: FlashGeometry, image: &[u8]) -> Self {
        let mut regs = Self::new(geometry);
        let len = core::cmp::min(image.len(), regs.data.len());
        regs.data[..len].copy_from_slice(&image[..len]);
        regs
    }

    /// Wrap in a controller
    pub fn into_flash(self) -> SimFlash {
        let geometry = self.geometry;
        Stm32F1Flash::new(self, geometry)
    }

    /// Number of status polls for which `BSY` stays set after a cycle
    pub fn set_busy_polls(&mut self, polls: u32) {
        self.busy_polls = polls;
    }

    /// Whole flash contents
    pub fn image(&self) -> &[u8] {
        &self.data
    }

    /// Contents of one page
    pub fn page(&self, page: Page) -> &[u8] {
        let start = page.index() * self.geometry.page_size() as usize;
        &self.data[start..start + self.geometry.page_size() as usize]
    }

    /// Whether `CR.LOCK` is set
    pub fn is_locked(&self) -> bool {
        Cr::from_bits_retain(self.cr).contains(Cr::LOCK)
    }

    /// Current `SR` flags
    pub fn status(&self) -> Sr {
        Sr::from_bits_retain(self.sr.get())
    }

    /// Times a page has been erased
    pub fn erase_count(&self, page: Page) -> u32 {
        self.erase_counts.get(page.index()).copied().unwrap_or(0)
    }

    /// Erases across all pages
    pub fn total_erases(&self) -> u32 {
        self.erase_counts.iter().sum()
    }

    /// Half-word program cycles that changed or confirmed flash contents
    pub fn half_words_programmed(&self) -> u64 {
        self.half_words_programmed
    }

    /// Reset the wear counters
    pub fn reset_counters(&mut self) {
        self.erase_counts.iter_mut().for_each(|c| *c = 0);
        self.half_words_programmed = 0;
    }

    /// Bits in `mask` at `addr` read as zero forever, surviving erase
    pub fn inject_stuck_zero(&mut self, addr: u32, mask: u8) {
        if let Some(offset) = self.offset(addr) {
            self.data[offset] &= !mask;
            self.stuck_zero.push((addr, mask));
        }
    }

    /// The half-word at `addr` ignores programming
    pub fn inject_weak_cell(&mut self, addr: u32) {
        self.weak.push(addr & !1);
    }

    /// Power-on reset of the register block; flash contents are kept
    pub fn reset(&mut self) {
        self.cr = Cr::LOCK.bits();
        self.sr.set(0);
        self.key_stage = 0;
        self.key_lockout = false;
        self.busy_remaining.set(0);
    }

    fn offset(&self, addr: u32) -> Option<usize> {
        let offset = addr.checked_sub(self.geometry.base())? as usize;
        (offset < self.data.len()).then_some(offset)
    }

    fn start_cycle(&self) {
        self.busy_remaining.set(self.busy_polls);
        self.sr.set((self.status() | Sr::EOP).bits());
    }

    fn erase_page(&mut self) {
        let Some(page) = self.geometry.page_of(self.ar) else {
            log::warn!("sim: erase of unmapped address 0x{:08X} ignored", self.ar);
            return;
        };

        let start = page.index() * self.geometry.page_size() as usize;
        let end = start + self.geometry.page_size() as usize;
        self.data[start..end].fill(ERASED_BYTE);
        for &(addr, mask) in &self.stuck_zero {
            if let Some(offset) = self.offset(addr).filter(|o| (start..end).contains(o)) {
                self.data[offset] &= !mask;
            }
        }

        self.erase_counts[page.index()] += 1;
        log::trace!("sim: erased {}", page);
        self.start_cycle();
    }
}

#[cfg(feature = "alloc")]
impl FlashRegisters for SimRegisters {
    fn read_cr(&self) -> u32 {
        self.cr
    }

    fn write_cr(&mut self, value: u32) {
        let requested = Cr::from_bits_retain(value);

        if self.is_locked() {
            // Only the key sequence clears LOCK
            return;
        }
        if requested.contains(Cr::LOCK) {
            self.cr = Cr::LOCK.bits();
            return;
        }

        // STRT is self-clearing
        self.cr = (requested - Cr::STRT).bits();
        if requested.contains(Cr::PER | Cr::STRT) {
            self.erase_page();
        }
    }

    fn read_sr(&self) -> u32 {
        let remaining = self.busy_remaining.get();
        if remaining > 0 {
            self.busy_remaining.set(remaining - 1);
            (self.status() | Sr::BSY).bits()
        } else {
            self.sr.get()
        }
    }

    fn write_ar(&mut self, value: u32) {
        if !self.is_locked() {
            self.ar = value;
        }
    }

    fn write_keyr(&mut self, value: u32) {
        if self.key_lockout || !self.is_locked() {
            return;
        }
        match (self.key_stage, value) {
            (0, KEY1) => self.key_stage = 1,
            (1, KEY2) => {
                self.key_stage = 0;
                self.cr &= !Cr::LOCK.bits();
            }
            _ => {
                log::warn!("sim: bad key 0x{:08X}, controller locked until reset", value);
                self.key_lockout = true;
            }
        }
    }

    fn store_half_word(&mut self, addr: u32, value: u16) {
        let cr = Cr::from_bits_retain(self.cr);
        if cr.contains(Cr::LOCK) || !cr.contains(Cr::PG) {
            self.sr.set((self.status() | Sr::WRPRTERR).bits());
            return;
        }
        let Some(offset) = self.offset(addr & !1) else {
            self.sr.set((self.status() | Sr::PGERR).bits());
            return;
        };

        self.start_cycle();
        let current = u16::from_le_bytes([self.data[offset], self.data[offset + 1]]);
        if current != 0xFFFF && value != 0 {
            self.sr.set((self.status() | Sr::PGERR).bits());
            return;
        }
        if self.weak.contains(&(addr & !1)) {
            return;
        }

        let [lo, hi] = value.to_le_bytes();
        self.data[offset] &= lo;
        self.data[offset + 1] &= hi;
        self.half_words_programmed += 1;
    }

    fn load(&self, addr: u32, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = match self.offset(addr.wrapping_add(i as u32)) {
                Some(offset) => self.data[offset],
                None => ERASED_BYTE,
            };
        }
    }
}
