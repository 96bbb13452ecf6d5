//! Flash page primitives
//!
//! The only code that sequences the flash controller. Each mutating
//! operation unlocks the controller, waits out the hardware busy flag
//! around every erase or program cycle, and re-locks before returning on
//! every exit path.

use core::ops::{Deref, DerefMut};

use crate::controller::FlashController;
use crate::error::{Error, Result};
use crate::geometry::{Page, ERASED_WORD};

use super::buffer::PageBuffer;

/// What it takes to turn a page into a candidate buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Page already holds the candidate; no I/O needed
    Identical,
    /// Every differing word is still erased, so programming alone suffices
    NeedsWriteOnly,
    /// Some differing word is already programmed; the page must be erased
    NeedsErase,
}

/// Classify the transition from `have` to `want`
///
/// Flash programming can only clear bits. A word that differs can be
/// programmed in place only if it is still in the erased state; anything
/// else needs the whole page erased first.
pub fn classify(have: &[u8], want: &[u8]) -> Comparison {
    debug_assert_eq!(have.len(), want.len());

    let mut identical = true;
    for (h, w) in have.chunks_exact(4).zip(want.chunks_exact(4)) {
        if h == w {
            continue;
        }
        identical = false;
        if u32::from_le_bytes([h[0], h[1], h[2], h[3]]) != ERASED_WORD {
            return Comparison::NeedsErase;
        }
    }

    if identical {
        Comparison::Identical
    } else {
        Comparison::NeedsWriteOnly
    }
}

/// Controller borrowed in the unlocked state; re-locks when dropped
struct Unlocked<'a, C: FlashController + ?Sized> {
    ctrl: &'a mut C,
}

impl<'a, C: FlashController + ?Sized> Unlocked<'a, C> {
    fn acquire(ctrl: &'a mut C) -> Result<Self> {
        if ctrl.unlock() {
            Ok(Self { ctrl })
        } else {
            ctrl.lock();
            Err(Error::NoPermission)
        }
    }
}

impl<C: FlashController + ?Sized> Deref for Unlocked<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.ctrl
    }
}

impl<C: FlashController + ?Sized> DerefMut for Unlocked<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.ctrl
    }
}

impl<C: FlashController + ?Sized> Drop for Unlocked<'_, C> {
    fn drop(&mut self) {
        self.ctrl.lock();
    }
}

fn check_permission<C: FlashController + ?Sized>(ctrl: &C, page: Page) -> Result<()> {
    if ctrl.geometry().is_user_page(page) {
        Ok(())
    } else {
        log::warn!("Refusing to modify {} outside the user region", page);
        Err(Error::NoPermission)
    }
}

/// Read the current contents of a page
///
/// `page` must lie inside flash.
pub fn read<C: FlashController + ?Sized>(ctrl: &C, page: Page) -> PageBuffer {
    let geometry = ctrl.geometry();
    debug_assert!(page.0 < geometry.page_count());

    let mut buffer = PageBuffer::erased(geometry);
    ctrl.read(geometry.page_base(page), buffer.as_mut_slice());
    buffer
}

/// Whether every word of a page reads as erased
pub fn is_erased<C: FlashController + ?Sized>(ctrl: &C, page: Page) -> bool {
    read(ctrl, page).words().all(|w| w == ERASED_WORD)
}

/// Compare a page against a candidate buffer
pub fn compare<C: FlashController + ?Sized>(
    ctrl: &C,
    page: Page,
    candidate: &PageBuffer,
) -> Comparison {
    let current = read(ctrl, page);
    let comparison = classify(current.as_slice(), candidate.as_slice());
    log::trace!("{}: {:?}", page, comparison);
    comparison
}

/// Erase a page and verify that it reads back erased
///
/// # Errors
/// * `NoPermission` - page is outside the user region or unlock failed
/// * `BadFlash` - some word is not erased after the erase cycle
pub fn erase<C: FlashController + ?Sized>(ctrl: &mut C, page: Page) -> Result<()> {
    check_permission(ctrl, page)?;
    let base = ctrl.geometry().page_base(page);
    log::debug!("Erasing {} at 0x{:08X}", page, base);

    {
        let mut flash = Unlocked::acquire(ctrl)?;
        flash.wait_while_busy();
        flash.set_target_address(base);
        flash.begin_erase();
        flash.wait_while_busy();
        flash.end_erase();
    }

    if !is_erased(ctrl, page) {
        log::error!("{} is not blank after erase", page);
        return Err(Error::BadFlash);
    }
    Ok(())
}

/// Program a page from a candidate buffer, verifying every flash word
///
/// The target words must be erased or already hold the candidate value.
/// Programming stops at the first word that does not read back as written.
///
/// # Errors
/// * `NoPermission` - page is outside the user region or unlock failed
/// * `BadFlash` - a word did not read back as written
pub fn write<C: FlashController + ?Sized>(
    ctrl: &mut C,
    page: Page,
    candidate: &PageBuffer,
) -> Result<()> {
    check_permission(ctrl, page)?;
    let base = ctrl.geometry().page_base(page);
    debug_assert_eq!(candidate.len(), ctrl.geometry().page_size() as usize);
    log::debug!("Writing {} at 0x{:08X}", page, base);

    let mut flash = Unlocked::acquire(ctrl)?;
    flash.wait_while_busy();

    for (i, value) in candidate.half_words().enumerate() {
        let addr = base + (i * 2) as u32;

        flash.begin_program();
        flash.program_word(addr, value);
        flash.wait_while_busy();
        flash.end_program();

        let mut readback = [0u8; 2];
        flash.read(addr, &mut readback);
        let found = u16::from_le_bytes(readback);
        if found != value {
            log::error!(
                "Write verify failed at 0x{:08X}: expected 0x{:04X}, found 0x{:04X}",
                addr,
                value,
                found
            );
            return Err(Error::BadFlash);
        }
    }

    Ok(())
}

/// Bring a page to the candidate contents with as little work as possible
///
/// Returns the comparison that decided the path taken: nothing for
/// `Identical`, a write for `NeedsWriteOnly`, erase then write for
/// `NeedsErase`.
pub fn write_if_needed<C: FlashController + ?Sized>(
    ctrl: &mut C,
    page: Page,
    candidate: &PageBuffer,
) -> Result<Comparison> {
    check_permission(ctrl, page)?;

    let comparison = compare(ctrl, page, candidate);
    match comparison {
        Comparison::Identical => {}
        Comparison::NeedsWriteOnly => write(ctrl, page, candidate)?,
        Comparison::NeedsErase => {
            erase(ctrl, page)?;
            write(ctrl, page, candidate)?;
        }
    }
    Ok(comparison)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{small_geometry, MockController};

    const USER: Page = Page(2);
    const RESERVED: Page = Page(1);

    fn buffer_with(ctrl: &MockController, f: impl FnOnce(&mut [u8])) -> PageBuffer {
        let mut buf = PageBuffer::erased(ctrl.geometry());
        f(buf.as_mut_slice());
        buf
    }

    #[test]
    fn test_classify() {
        let erased = [0xFFu8; 8];
        let mut want = erased;
        want[5] = 0x12;

        assert_eq!(classify(&erased, &erased), Comparison::Identical);
        assert_eq!(classify(&erased, &want), Comparison::NeedsWriteOnly);

        // Programmed word that differs needs an erase, even if only bits clear
        let have = [0x0F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let want = [0x07, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(classify(&have, &want), Comparison::NeedsErase);

        // Programmed words that stay the same don't force an erase
        let have = [0x12, 0x34, 0x56, 0x78, 0xFF, 0xFF, 0xFF, 0xFF];
        let want = [0x12, 0x34, 0x56, 0x78, 0x00, 0x00, 0xFF, 0xFF];
        assert_eq!(classify(&have, &want), Comparison::NeedsWriteOnly);
    }

    #[test]
    fn test_erase_restores_blank_page() {
        let g = small_geometry();
        let base = g.page_base(USER);
        let mut ctrl = MockController::with_contents(g, &[(base + 4, &[0x00, 0x11])]);

        erase(&mut ctrl, USER).unwrap();

        assert!(is_erased(&ctrl, USER));
        assert_eq!(
            compare(&ctrl, USER, &PageBuffer::erased(&g)),
            Comparison::Identical
        );
        assert_eq!(ctrl.erase_count(USER), 1);
        assert!(ctrl.is_locked());
        assert_eq!(ctrl.violations, 0);
    }

    #[test]
    fn test_erase_is_idempotent() {
        let mut ctrl = MockController::new(small_geometry());
        erase(&mut ctrl, USER).unwrap();
        erase(&mut ctrl, USER).unwrap();
        assert!(is_erased(&ctrl, USER));
        assert_eq!(ctrl.erase_count(USER), 2);
    }

    #[test]
    fn test_erase_reports_bad_flash() {
        let g = small_geometry();
        let mut ctrl = MockController::new(g);
        ctrl.stick_zero(g.page_base(USER) + 10, 0x04);

        assert_eq!(erase(&mut ctrl, USER), Err(Error::BadFlash));
        assert!(ctrl.is_locked());
    }

    #[test]
    fn test_reserved_pages_are_untouched() {
        let g = small_geometry();
        let mut ctrl =
            MockController::with_contents(g, &[(g.page_base(RESERVED), &[0xAA, 0xBB])]);
        let before = ctrl.memory.clone();
        let zeros = PageBuffer::filled(&g, 0);

        assert_eq!(erase(&mut ctrl, RESERVED), Err(Error::NoPermission));
        assert_eq!(write(&mut ctrl, RESERVED, &zeros), Err(Error::NoPermission));
        assert_eq!(
            write_if_needed(&mut ctrl, RESERVED, &zeros),
            Err(Error::NoPermission)
        );
        assert_eq!(
            erase(&mut ctrl, Page(g.page_count())),
            Err(Error::NoPermission)
        );

        assert_eq!(ctrl.memory, before);
        assert_eq!(ctrl.total_erases(), 0);
        assert!(ctrl.programs.is_empty());
    }

    #[test]
    fn test_unlock_failure_is_no_permission() {
        let mut ctrl = MockController::new(small_geometry());
        ctrl.refuse_unlock();
        let zeros = PageBuffer::filled(ctrl.geometry(), 0);

        assert_eq!(erase(&mut ctrl, USER), Err(Error::NoPermission));
        assert_eq!(write(&mut ctrl, USER, &zeros), Err(Error::NoPermission));
        assert!(ctrl.is_locked());
    }

    #[test]
    fn test_write_programs_every_word() {
        let mut ctrl = MockController::new(small_geometry());
        let candidate = buffer_with(&ctrl, |b| {
            for (i, byte) in b.iter_mut().enumerate() {
                *byte = i as u8;
            }
        });

        write(&mut ctrl, USER, &candidate).unwrap();

        assert_eq!(read(&ctrl, USER), candidate);
        assert_eq!(ctrl.programs.len(), 32);
        assert_eq!(ctrl.programs[1], (ctrl.geometry().page_base(USER) + 2, 0x0302));
        assert!(ctrl.is_locked());
        assert_eq!(ctrl.violations, 0);
    }

    #[test]
    fn test_write_stops_at_first_mismatch() {
        let g = small_geometry();
        let mut ctrl = MockController::new(g);
        ctrl.weaken(g.page_base(USER) + 6);
        let zeros = PageBuffer::filled(&g, 0);

        assert_eq!(write(&mut ctrl, USER, &zeros), Err(Error::BadFlash));

        // Words 0..=3 attempted, nothing after the failing one
        assert_eq!(ctrl.programs.len(), 4);
        assert!(ctrl.is_locked());
    }

    #[test]
    fn test_write_if_needed_paths() {
        let g = small_geometry();
        let mut ctrl = MockController::new(g);

        // Identical: nothing happens
        let erased = PageBuffer::erased(&g);
        assert_eq!(
            write_if_needed(&mut ctrl, USER, &erased),
            Ok(Comparison::Identical)
        );
        assert!(ctrl.programs.is_empty());

        // Erased page: write only
        let first = buffer_with(&ctrl, |b| b[..4].copy_from_slice(&[1, 2, 3, 4]));
        assert_eq!(
            write_if_needed(&mut ctrl, USER, &first),
            Ok(Comparison::NeedsWriteOnly)
        );
        assert_eq!(read(&ctrl, USER), first);
        assert_eq!(ctrl.erase_count(USER), 0);

        // Filling the erased remainder still avoids an erase
        let second = buffer_with(&ctrl, |b| {
            b[..4].copy_from_slice(&[1, 2, 3, 4]);
            b[60..].copy_from_slice(&[9, 9, 9, 9]);
        });
        assert_eq!(
            write_if_needed(&mut ctrl, USER, &second),
            Ok(Comparison::NeedsWriteOnly)
        );
        assert_eq!(read(&ctrl, USER), second);
        assert_eq!(ctrl.erase_count(USER), 0);

        // Changing programmed data needs an erase
        let third = buffer_with(&ctrl, |b| b[..4].copy_from_slice(&[5, 6, 7, 8]));
        assert_eq!(
            write_if_needed(&mut ctrl, USER, &third),
            Ok(Comparison::NeedsErase)
        );
        assert_eq!(read(&ctrl, USER), third);
        assert_eq!(ctrl.erase_count(USER), 1);
        assert!(ctrl.is_locked());
        assert_eq!(ctrl.violations, 0);
    }

    #[test]
    fn test_write_if_needed_propagates_erase_failure() {
        let g = small_geometry();
        let base = g.page_base(USER);
        let mut ctrl = MockController::with_contents(g, &[(base, &[0x00])]);
        ctrl.stick_zero(base + 20, 0x80);
        let candidate = PageBuffer::filled(&g, 0x5A);

        assert_eq!(
            write_if_needed(&mut ctrl, USER, &candidate),
            Err(Error::BadFlash)
        );
        assert!(ctrl.programs.is_empty());
    }
}
