//! Linear flash programmer
//!
//! Accumulates address-ordered chunks into a staging buffer for the page
//! they fall in. A page is committed through [`page::write_if_needed`] only
//! once the stream moves past it or [`LinearProgrammer::finish`] is called,
//! so the erase decision is made against the page's final content.

use core::mem;

use crate::controller::FlashController;
use crate::error::{Error, Result};
use crate::geometry::Page;

use super::buffer::PageBuffer;
use super::page::{self, Comparison};

/// Programmer state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgrammerState {
    /// No page open
    Idle,
    /// A page is open and holds staged data
    Buffering {
        /// Page being staged
        page: Page,
        /// Page contents as read when opened, overlaid with staged data
        buffer: PageBuffer,
    },
    /// Stream ended; nothing open
    Finished,
}

/// Counters for the pages committed during a session
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProgramStats {
    /// Pages flushed through write-if-needed
    pub pages_committed: usize,
    /// Committed pages that already held the staged content
    pub pages_unchanged: usize,
    /// Committed pages that were programmed
    pub pages_written: usize,
    /// Committed pages that had to be erased first
    pub pages_erased: usize,
}

impl ProgramStats {
    fn record(&mut self, comparison: Comparison) {
        self.pages_committed += 1;
        match comparison {
            Comparison::Identical => self.pages_unchanged += 1,
            Comparison::NeedsWriteOnly => self.pages_written += 1,
            Comparison::NeedsErase => {
                self.pages_written += 1;
                self.pages_erased += 1;
            }
        }
    }
}

/// Stateful accumulator for one update pass
///
/// The last open page is only committed by [`finish`](Self::finish). A
/// caller that stops after the final [`program`](Self::program) call leaves
/// that page unwritten.
#[derive(Debug)]
pub struct LinearProgrammer {
    state: ProgrammerState,
    high_water: u64,
    stats: ProgramStats,
}

impl Default for LinearProgrammer {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearProgrammer {
    /// Create an idle programmer
    pub fn new() -> Self {
        Self {
            state: ProgrammerState::Idle,
            high_water: 0,
            stats: ProgramStats::default(),
        }
    }

    /// Reset to `Idle` for a new pass
    ///
    /// Any staged page is discarded without being written.
    pub fn start(&mut self) {
        if let ProgrammerState::Buffering { page, .. } = &self.state {
            log::warn!("Discarding staged data for {}", page);
        }
        self.state = ProgrammerState::Idle;
        self.high_water = 0;
        self.stats = ProgramStats::default();
    }

    /// Current state
    pub fn state(&self) -> &ProgrammerState {
        &self.state
    }

    /// Page currently being staged, if any
    pub fn open_page(&self) -> Option<Page> {
        match &self.state {
            ProgrammerState::Buffering { page, .. } => Some(*page),
            _ => None,
        }
    }

    /// End address of the last programmed chunk
    pub fn high_water(&self) -> u64 {
        self.high_water
    }

    /// Counters for this pass
    pub fn stats(&self) -> ProgramStats {
        self.stats
    }

    /// Stage `data` at `address`
    ///
    /// `address` must not lie below the end of the previous chunk. Pages the
    /// stream leaves behind are committed on the way.
    ///
    /// # Errors
    /// * `Finished` - [`finish`](Self::finish) was called without a new
    ///   [`start`](Self::start)
    /// * `OutOfOrder` - `address` is below the end of the previous chunk
    /// * `NoPermission` - some byte falls outside the user region; nothing is
    ///   staged in that case
    /// * `BadFlash` - committing a page left behind failed verification
    pub fn program<C: FlashController + ?Sized>(
        &mut self,
        ctrl: &mut C,
        address: u32,
        data: &[u8],
    ) -> Result<()> {
        if self.state == ProgrammerState::Finished {
            log::warn!("Chunk at 0x{:08X} after finish", address);
            return Err(Error::Finished);
        }
        if data.is_empty() {
            return Ok(());
        }
        if (address as u64) < self.high_water {
            log::warn!(
                "Chunk at 0x{:08X} is below the previous end 0x{:08X}",
                address,
                self.high_water
            );
            return Err(Error::OutOfOrder);
        }

        let geometry = *ctrl.geometry();
        if !geometry.is_user_range(address, data.len()) {
            log::warn!(
                "Chunk 0x{:08X}+{} is outside the user region",
                address,
                data.len()
            );
            return Err(Error::NoPermission);
        }

        let page_size = geometry.page_size() as usize;
        let mut pos = 0;
        while pos < data.len() {
            let addr = address + pos as u32;
            let page = geometry.page_of(addr).ok_or(Error::NoPermission)?;
            let offset = geometry.page_offset(addr);
            let len = (page_size - offset).min(data.len() - pos);

            self.open(ctrl, page)?;
            if let ProgrammerState::Buffering { buffer, .. } = &mut self.state {
                buffer.as_mut_slice()[offset..offset + len]
                    .copy_from_slice(&data[pos..pos + len]);
            }
            pos += len;
        }

        self.high_water = address as u64 + data.len() as u64;
        Ok(())
    }

    /// Commit the open page, if any, and move to `Finished`
    pub fn finish<C: FlashController + ?Sized>(&mut self, ctrl: &mut C) -> Result<()> {
        let result = self.flush(ctrl);
        self.state = ProgrammerState::Finished;
        log::debug!(
            "Finished: {} pages committed, {} erased",
            self.stats.pages_committed,
            self.stats.pages_erased
        );
        result
    }

    /// Make `page` the open page, committing whatever was open before
    fn open<C: FlashController + ?Sized>(&mut self, ctrl: &mut C, page: Page) -> Result<()> {
        if self.open_page() == Some(page) {
            return Ok(());
        }

        self.flush(ctrl)?;
        log::debug!("Opening {}", page);
        self.state = ProgrammerState::Buffering {
            page,
            buffer: page::read(ctrl, page),
        };
        Ok(())
    }

    fn flush<C: FlashController + ?Sized>(&mut self, ctrl: &mut C) -> Result<()> {
        let ProgrammerState::Buffering { page, buffer } =
            mem::replace(&mut self.state, ProgrammerState::Idle)
        else {
            return Ok(());
        };

        log::debug!("Committing {}", page);
        let comparison = page::write_if_needed(ctrl, page, &buffer)?;
        self.stats.record(comparison);
        Ok(())
    }
}
