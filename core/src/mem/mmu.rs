use std::sync::mpsc::{self, Receiver, Sender};

use log::{debug, trace};

use crate::mem::{AddressSegment, MemoryError};

/// Policy for writes that land in a non-writable segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum WriteFaultMode {
    /// Raise a segmentation fault to the caller of the executing block.
    #[default]
    Throw,
    /// Silently drop the write. Matches real ROM-backed cartridge behavior.
    Continue,
}

/// Emitted on the write-notification channel after every effectful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteNotification {
    pub address: u16,
    pub length: u16,
}

/// The memory-management unit: an ordered, non-overlapping set of address
/// segments whose union covers exactly `0x0000..=0xFFFF`.
///
/// Layout is fixed at construction; contents are mutable. Word access is
/// little-endian and wraps at the top of the address space, matching the
/// 16-bit address bus.
pub struct Mmu {
    segments: Vec<Box<dyn AddressSegment>>,
    /// Base address per segment, sorted; binary-searched on every access.
    bounds: Vec<u16>,
    write_fault_mode: WriteFaultMode,
    write_listeners: Vec<Sender<WriteNotification>>,
}

impl Mmu {
    /// Compose segments into an address space, validating the layout.
    ///
    /// Segments are sorted by base address. Any gap or overlap between
    /// adjacent segments, or coverage short of `0xFFFF`, is a fatal
    /// configuration error carrying the exact boundary addresses.
    pub fn new(
        mut segments: Vec<Box<dyn AddressSegment>>,
        write_fault_mode: WriteFaultMode,
    ) -> Result<Self, MemoryError> {
        if segments.is_empty() {
            return Err(MemoryError::Empty);
        }
        segments.sort_by_key(|s| s.base_address());

        let mut expected: u32 = 0;
        for segment in &segments {
            let base = segment.base_address();
            let end = base as u32 + segment.len() as u32;
            if end > 0x1_0000 {
                return Err(MemoryError::SegmentBounds {
                    base,
                    length: segment.len(),
                });
            }
            if (base as u32) > expected {
                return Err(MemoryError::Gap {
                    expected: expected as u16,
                    found: base,
                });
            }
            if (base as u32) < expected {
                return Err(MemoryError::Overlap {
                    expected: expected as u16,
                    found: base,
                });
            }
            expected = end;
        }
        if expected != 0x1_0000 {
            return Err(MemoryError::IncompleteCoverage { end: expected });
        }

        let bounds = segments.iter().map(|s| s.base_address()).collect();
        Ok(Self {
            segments,
            bounds,
            write_fault_mode,
            write_listeners: Vec::new(),
        })
    }

    pub fn write_fault_mode(&self) -> WriteFaultMode {
        self.write_fault_mode
    }

    /// Subscribe to write notifications. Each effectful write sends one
    /// `(address, length)` notification; the instruction-block cache drains
    /// its receiver before every fetch so invalidation happens first.
    pub fn subscribe_writes(&mut self) -> Receiver<WriteNotification> {
        let (tx, rx) = mpsc::channel();
        self.write_listeners.push(tx);
        rx
    }

    /// Index of the segment owning `address`. Total coverage makes this
    /// infallible after construction.
    fn segment_index(&self, address: u16) -> usize {
        self.bounds.partition_point(|&base| base <= address) - 1
    }

    pub fn read_byte(&self, address: u16) -> u8 {
        let index = self.segment_index(address);
        let segment = &self.segments[index];
        let offset = (address - segment.base_address()) as usize;
        debug_assert!(offset < segment.len());
        segment.read_byte(offset)
    }

    /// Little-endian word read; the high byte wraps past `0xFFFF`.
    pub fn read_word(&self, address: u16) -> u16 {
        let low = self.read_byte(address);
        let high = self.read_byte(address.wrapping_add(1));
        u16::from_le_bytes([low, high])
    }

    pub fn read_bytes(&self, address: u16, length: usize) -> Vec<u8> {
        (0..length)
            .map(|i| self.read_byte(address.wrapping_add(i as u16)))
            .collect()
    }

    pub fn write_byte(&mut self, address: u16, value: u8) -> Result<(), MemoryError> {
        if self.write_byte_quiet(address, value)? {
            self.notify(address, 1);
        }
        Ok(())
    }

    /// Little-endian word write; wraps past `0xFFFF`.
    pub fn write_word(&mut self, address: u16, value: u16) -> Result<(), MemoryError> {
        let [low, high] = value.to_le_bytes();
        let mut effectful = self.write_byte_quiet(address, low)?;
        effectful |= self.write_byte_quiet(address.wrapping_add(1), high)?;
        if effectful {
            self.notify(address, 2);
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, address: u16, data: &[u8]) -> Result<(), MemoryError> {
        let mut effectful = false;
        for (i, &value) in data.iter().enumerate() {
            effectful |= self.write_byte_quiet(address.wrapping_add(i as u16), value)?;
        }
        if effectful {
            self.notify(address, data.len() as u16);
        }
        Ok(())
    }

    /// Byte-to-byte copy inside the address space (block copy instructions).
    pub fn transfer_byte(&mut self, from: u16, to: u16) -> Result<(), MemoryError> {
        let value = self.read_byte(from);
        self.write_byte(to, value)
    }

    /// Returns whether the write actually changed memory; dropped writes to
    /// read-only segments in `Continue` mode are not effectful and emit no
    /// notification.
    fn write_byte_quiet(&mut self, address: u16, value: u8) -> Result<bool, MemoryError> {
        let index = self.segment_index(address);
        let segment = &mut self.segments[index];
        let offset = (address - segment.base_address()) as usize;
        debug_assert!(offset < segment.len());
        if !segment.writable() {
            match self.write_fault_mode {
                WriteFaultMode::Throw => {
                    debug!("write fault at {address:#06x} (value {value:#04x})");
                    return Err(MemoryError::SegmentFault { address });
                }
                WriteFaultMode::Continue => {
                    trace!("dropped write to read-only {address:#06x}");
                    return Ok(false);
                }
            }
        }
        segment.write_byte(offset, value);
        Ok(true)
    }

    fn notify(&mut self, address: u16, length: u16) {
        let event = WriteNotification { address, length };
        // Drop listeners whose receiver has gone away.
        self.write_listeners.retain(|tx| tx.send(event).is_ok());
    }
}
