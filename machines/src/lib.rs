//! Reference systems assembled from [`tachyon_core`] configuration.
//!
//! Each "simple" system wires one CPU mode to a minimal memory map and an
//! output-capture IO port. They are the integration surface the core's own
//! tests drive programs through.

pub mod simple8080;
pub mod simplegb;
pub mod simplez80;

pub use simple8080::Simple8080System;
pub use simplegb::SimpleGameBoySystem;
pub use simplez80::SimpleZ80System;

use std::sync::{Arc, Mutex};

use tachyon_core::peripherals::{IoPeripheral, Peripheral};

/// IO port that captures everything written to it, for program output in
/// tests. Reads return the number of bytes captured so far.
pub struct CapturePort {
    port: u8,
    captured: Arc<Mutex<Vec<u8>>>,
}

impl CapturePort {
    pub fn new(port: u8) -> Self {
        Self {
            port,
            captured: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the captured bytes; clones see the same buffer.
    pub fn captured(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.captured)
    }
}

impl Peripheral for CapturePort {}

impl IoPeripheral for CapturePort {
    fn port(&self) -> u8 {
        self.port
    }

    fn read_byte(&mut self, _address_msb: u8) -> u8 {
        self.captured.lock().unwrap().len() as u8
    }

    fn write_byte(&mut self, _address_msb: u8, value: u8) {
        self.captured.lock().unwrap().push(value);
    }
}
