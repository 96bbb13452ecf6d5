//! Error types for hexboot-core
//!
//! A flat, no_std compatible error type shared by the page primitives and
//! the linear programmer. `Ok(())` stands for a verified success.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Target page lies outside the user-writable region, or the flash
    /// controller refused to unlock
    NoPermission,
    /// Post-erase scan or post-write readback did not match
    BadFlash,
    /// Chunk address is below data already accepted by the programmer
    OutOfOrder,
    /// Programmer has finished; `start` must be called before programming
    /// again
    Finished,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPermission => write!(f, "address outside the user-writable flash region"),
            Self::BadFlash => write!(f, "flash verification failed"),
            Self::OutOfOrder => write!(f, "address precedes data already programmed"),
            Self::Finished => write!(f, "programmer already finished"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
