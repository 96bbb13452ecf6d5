//! STM32F1-style flash controller
//!
//! Implements [`FlashController`] on top of the raw FPEC register block
//! (`KEYR`, `SR`, `CR`, `AR`). Register access itself goes through
//! [`FlashRegisters`], so the sequencing can run against the real
//! peripheral (`MmioRegisters`, bare-metal ARM builds only) or an
//! emulated one.

use bitflags::bitflags;

use crate::controller::FlashController;
use crate::geometry::FlashGeometry;

/// First unlock key written to `KEYR`
pub const KEY1: u32 = 0x4567_0123;
/// Second unlock key written to `KEYR`
pub const KEY2: u32 = 0xCDEF_89AB;

bitflags! {
    /// `FLASH_CR` bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Cr: u32 {
        /// Programming mode
        const PG     = 1 << 0;
        /// Page erase mode
        const PER    = 1 << 1;
        /// Mass erase mode
        const MER    = 1 << 2;
        /// Option byte programming
        const OPTPG  = 1 << 4;
        /// Option byte erase
        const OPTER  = 1 << 5;
        /// Start erase
        const STRT   = 1 << 6;
        /// Controller locked
        const LOCK   = 1 << 7;
        /// Option bytes write enable
        const OPTWRE = 1 << 9;
        /// Error interrupt enable
        const ERRIE  = 1 << 10;
        /// End of operation interrupt enable
        const EOPIE  = 1 << 12;
    }
}

bitflags! {
    /// `FLASH_SR` bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Sr: u32 {
        /// Operation in progress
        const BSY      = 1 << 0;
        /// Programming error (target not erased)
        const PGERR    = 1 << 2;
        /// Write protection error
        const WRPRTERR = 1 << 4;
        /// End of operation
        const EOP      = 1 << 5;
    }
}

/// Raw access to the flash register block and the flash array
pub trait FlashRegisters {
    /// Read `FLASH_CR`
    fn read_cr(&self) -> u32;

    /// Write `FLASH_CR`
    fn write_cr(&mut self, value: u32);

    /// Read `FLASH_SR`
    fn read_sr(&self) -> u32;

    /// Write `FLASH_AR`
    fn write_ar(&mut self, value: u32);

    /// Write `FLASH_KEYR`
    fn write_keyr(&mut self, value: u32);

    /// Half-word store into the flash array
    fn store_half_word(&mut self, addr: u32, value: u16);

    /// Memory-mapped read of the flash array
    fn load(&self, addr: u32, buf: &mut [u8]);
}

/// Flash controller driven through the STM32F1 register interface
#[derive(Debug)]
pub struct Stm32F1Flash<R> {
    regs: R,
    geometry: FlashGeometry,
}

impl<R: FlashRegisters> Stm32F1Flash<R> {
    /// Wrap a register block describing flash with the given layout
    pub fn new(regs: R, geometry: FlashGeometry) -> Self {
        Self { regs, geometry }
    }

    /// Access the register block
    pub fn registers(&self) -> &R {
        &self.regs
    }

    /// Mutable access to the register block
    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    fn cr(&self) -> Cr {
        Cr::from_bits_retain(self.regs.read_cr())
    }

    fn modify_cr(&mut self, f: impl FnOnce(&mut Cr)) {
        let mut cr = self.cr();
        f(&mut cr);
        self.regs.write_cr(cr.bits());
    }
}

impl<R: FlashRegisters> FlashController for Stm32F1Flash<R> {
    fn geometry(&self) -> &FlashGeometry {
        &self.geometry
    }

    fn is_busy(&self) -> bool {
        Sr::from_bits_retain(self.regs.read_sr()).contains(Sr::BSY)
    }

    fn unlock(&mut self) -> bool {
        if !self.cr().contains(Cr::LOCK) {
            return true;
        }

        self.regs.write_keyr(KEY1);
        self.regs.write_keyr(KEY2);

        let unlocked = !self.cr().contains(Cr::LOCK);
        if !unlocked {
            log::warn!("Flash controller refused the unlock sequence");
        }
        unlocked
    }

    fn lock(&mut self) {
        self.modify_cr(|cr| cr.insert(Cr::LOCK));
    }

    fn set_target_address(&mut self, addr: u32) {
        self.regs.write_ar(addr);
    }

    fn begin_erase(&mut self) {
        self.modify_cr(|cr| cr.insert(Cr::PER));
        self.modify_cr(|cr| cr.insert(Cr::STRT));
    }

    fn end_erase(&mut self) {
        // PER does not clear itself; leave every other bit untouched
        self.modify_cr(|cr| cr.remove(Cr::PER));
    }

    fn begin_program(&mut self) {
        self.modify_cr(|cr| cr.insert(Cr::PG));
    }

    fn program_word(&mut self, addr: u32, value: u16) {
        self.regs.store_half_word(addr, value);
    }

    fn end_program(&mut self) {
        self.modify_cr(|cr| cr.remove(Cr::PG));
    }

    fn read(&self, addr: u32, buf: &mut [u8]) {
        self.regs.load(addr, buf);
    }
}

/// Memory-mapped register block of the real peripheral
///
/// Only built for bare-metal ARM targets.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub struct MmioRegisters {
    base: usize,
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
impl MmioRegisters {
    /// Base address of the FPEC on STM32F1 devices
    pub const STM32F1_BASE: usize = 0x4002_2000;

    const KEYR: usize = 0x04;
    const SR: usize = 0x0C;
    const CR: usize = 0x10;
    const AR: usize = 0x14;

    /// Bind the register block at `base`
    ///
    /// # Safety
    ///
    /// `base` must point at a flash controller register block, flash must be
    /// memory-mapped at the addresses later passed to `load` and
    /// `store_half_word`, and nothing else may access the controller while
    /// this value exists.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    fn reg(&self, offset: usize) -> *mut u32 {
        (self.base + offset) as *mut u32
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
impl FlashRegisters for MmioRegisters {
    fn read_cr(&self) -> u32 {
        // SAFETY: register address validated by the constructor contract.
        unsafe { core::ptr::read_volatile(self.reg(Self::CR)) }
    }

    fn write_cr(&mut self, value: u32) {
        // SAFETY: register address validated by the constructor contract.
        unsafe { core::ptr::write_volatile(self.reg(Self::CR), value) }
    }

    fn read_sr(&self) -> u32 {
        // SAFETY: register address validated by the constructor contract.
        unsafe { core::ptr::read_volatile(self.reg(Self::SR)) }
    }

    fn write_ar(&mut self, value: u32) {
        // SAFETY: register address validated by the constructor contract.
        unsafe { core::ptr::write_volatile(self.reg(Self::AR), value) }
    }

    fn write_keyr(&mut self, value: u32) {
        // SAFETY: register address validated by the constructor contract.
        unsafe { core::ptr::write_volatile(self.reg(Self::KEYR), value) }
    }

    fn store_half_word(&mut self, addr: u32, value: u16) {
        // SAFETY: the primitives only store inside the user region of the
        // memory-mapped flash array.
        unsafe { core::ptr::write_volatile(addr as usize as *mut u16, value) }
    }

    fn load(&self, addr: u32, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            // SAFETY: flash is memory-mapped and readable at any address
            // inside the configured geometry.
            *byte = unsafe { core::ptr::read_volatile((addr as usize + i) as *const u8) };
        }
    }
}
