//! Status LED handling
//!
//! A background thread toggles the busy LED while the flashing flag is
//! raised. Failure codes are blinked on the status LED by the flashing
//! thread itself before it hands over to the application.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hexboot_core::boot::BootError;
use hexboot_core::status::FlashingFlag;

/// Idle poll interval of the indicator thread
const IDLE_POLL: Duration = Duration::from_millis(50);

/// A board LED; state changes are logged
#[derive(Debug)]
pub struct Led {
    name: &'static str,
    on: bool,
}

impl Led {
    pub const fn new(name: &'static str) -> Self {
        Self { name, on: false }
    }

    pub fn set(&mut self, on: bool) {
        if self.on != on {
            log::trace!("{} LED {}", self.name, if on { "on" } else { "off" });
        }
        self.on = on;
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

/// Handle to the running indicator thread
pub struct Indicator {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Indicator {
    /// Start toggling the busy LED whenever `flag` is set
    pub fn spawn(flag: &'static FlashingFlag, period: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("indicator".into())
            .spawn(move || {
                let mut led = Led::new("busy");
                // Lit while the bootloader runs
                led.set(true);
                while !thread_stop.load(Ordering::Acquire) {
                    if flag.is_set() {
                        led.set(false);
                        thread::sleep(period);
                        led.set(true);
                        thread::sleep(period);
                    } else {
                        thread::sleep(IDLE_POLL);
                    }
                }
                led.set(false);
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("Failed to start indicator thread: {}", e);
                None
            }
        };

        Self { stop, handle }
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Indicator thread panicked");
            }
        }
    }
}

impl Drop for Indicator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Blink the failure code of `error` on `led`
pub fn blink_error(led: &mut Led, error: BootError, period: Duration) {
    log::warn!("Signalling {}", error);
    for _ in 0..error.blink_count() {
        led.set(true);
        thread::sleep(period);
        led.set(false);
        thread::sleep(period);
    }
}
