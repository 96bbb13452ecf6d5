//! Update outcome reporting and the hand-off to the application
//!
//! Every failure is signalled as a distinct number of indicator blinks
//! before control passes to whatever application is already in flash.

use core::fmt;

use crate::controller::FlashController;
use crate::update::UpdateError;

/// Reasons an update did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BootError {
    /// No removable medium found
    NoCard = 1,
    /// Medium present but its filesystem is unreadable
    BadFilesystem = 2,
    /// No firmware file on the medium
    NoFile = 3,
    /// Firmware file is malformed or uses segment addressing
    BadHex = 4,
    /// Flash refused a chunk or failed verification
    BadFlash = 5,
}

impl BootError {
    /// Number of indicator blinks signalling this error
    pub const fn blink_count(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NoCard => "no card",
            Self::BadFilesystem => "bad filesystem",
            Self::NoFile => "no firmware file",
            Self::BadHex => "bad hex file",
            Self::BadFlash => "flash hardware fault",
        };
        write!(f, "{} ({} blinks)", msg, self.blink_count())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BootError {}

impl From<UpdateError> for BootError {
    fn from(e: UpdateError) -> Self {
        match e {
            UpdateError::Flash(_) | UpdateError::Finish(_) => BootError::BadFlash,
            UpdateError::Hex(_) | UpdateError::UnsupportedRecord(_) => BootError::BadHex,
        }
    }
}

/// First two entries of the application's vector table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorTable {
    /// Initial main stack pointer
    pub initial_sp: u32,
    /// Reset handler address
    pub reset_vector: u32,
}

impl VectorTable {
    /// Read the vector table at the start of the user region
    pub fn read<C: FlashController + ?Sized>(ctrl: &C) -> Self {
        let mut raw = [0u8; 8];
        ctrl.read(ctrl.geometry().user_base(), &mut raw);
        Self {
            initial_sp: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            reset_vector: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
        }
    }

    /// Whether the user region looks like it holds an application
    ///
    /// Erased flash reads as all ones; a Thumb reset handler has bit 0 set
    /// and must point into flash.
    pub fn is_plausible<C: FlashController + ?Sized>(&self, ctrl: &C) -> bool {
        let geometry = ctrl.geometry();
        self.initial_sp != u32::MAX
            && self.initial_sp % 4 == 0
            && self.reset_vector & 1 == 1
            && geometry.is_user_range(self.reset_vector & !1, 2)
    }
}
