//! hexboot-core - Core library for internal flash programming
//!
//! This crate turns a stream of address-tagged data chunks into verified,
//! minimal-wear flash page mutations. It is `no_std` so the same code runs
//! inside the bootloader and in host-side tests.
//!
//! # Layers
//!
//! - [`controller`] - the narrow hardware-access capability
//! - [`stm32f1`] - register sequencing for STM32F1-style flash controllers
//! - [`flash`] - page primitives and the linear programmer
//! - [`update`] - drives the linear programmer from decoded hex records
//!
//! # Features
//!
//! - `std` - Enable standard library support (`std::error::Error` impls)
//!
//! # Example
//!
//! ```ignore
//! use hexboot_core::flash::LinearProgrammer;
//!
//! let mut prog = LinearProgrammer::new();
//! prog.start();
//! prog.program(&mut controller, 0x0800_4000, &image)?;
//! prog.finish(&mut controller)?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod boot;
pub mod controller;
pub mod error;
pub mod flash;
pub mod geometry;
#[cfg(test)]
mod mock;
pub mod status;
pub mod stm32f1;
pub mod update;

pub use error::{Error, Result};
