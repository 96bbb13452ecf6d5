//! Flash page management
//!
//! - [`page`] - erase, read, compare and verified write of single pages
//! - [`LinearProgrammer`] - turns an address-ordered chunk stream into page
//!   commits with at most one erase per touched page

mod buffer;
mod linear;
pub mod page;

pub use buffer::PageBuffer;
pub use linear::{LinearProgrammer, ProgramStats, ProgrammerState};
pub use page::Comparison;
