//! Hardware-access capability for the flash controller
//!
//! This is the only seam through which the page primitives touch the flash
//! peripheral. A register-level implementation lives in [`crate::stm32f1`];
//! tests and the host tool plug in an emulated register block instead.

use crate::geometry::FlashGeometry;

/// Flash controller capability
///
/// The sequencing (unlock, mode bits, busy waits, lock) is driven by the
/// page primitives in [`crate::flash`]; implementations only expose the
/// individual steps.
///
/// ## Example: erase sequence as driven by the primitives
///
/// ```ignore
/// ctrl.unlock();
/// ctrl.wait_while_busy();
/// ctrl.set_target_address(page_base);
/// ctrl.begin_erase();
/// ctrl.wait_while_busy();
/// ctrl.end_erase();
/// ctrl.lock();
/// ```
pub trait FlashController {
    /// Layout of the flash behind this controller
    fn geometry(&self) -> &FlashGeometry;

    /// Whether an erase or program cycle is in progress
    fn is_busy(&self) -> bool;

    /// Unlock the controller for erase/program access
    ///
    /// Returns `false` if the controller is still locked afterwards.
    fn unlock(&mut self) -> bool;

    /// Re-lock the controller
    fn lock(&mut self);

    /// Select the address for the next page erase
    fn set_target_address(&mut self, addr: u32);

    /// Enter page-erase mode and start erasing the targeted page
    fn begin_erase(&mut self);

    /// Leave page-erase mode
    fn end_erase(&mut self);

    /// Enter programming mode
    fn begin_program(&mut self);

    /// Store one flash word; only valid between `begin_program` and
    /// `end_program`
    fn program_word(&mut self, addr: u32, value: u16);

    /// Leave programming mode
    fn end_program(&mut self);

    /// Copy flash contents starting at `addr` into `buf`
    ///
    /// Flash is memory-mapped for reads, so this never fails.
    fn read(&self, addr: u32, buf: &mut [u8]);

    /// Spin until the current erase or program cycle is done
    ///
    /// The latency is bounded by the hardware; no timeout is applied.
    fn wait_while_busy(&mut self) {
        while self.is_busy() {
            core::hint::spin_loop();
        }
    }
}
