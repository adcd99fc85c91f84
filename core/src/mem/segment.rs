use std::sync::{Arc, Mutex, MutexGuard};

use crate::mem::MemoryError;

/// What backs an address segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SegmentKind {
    Ram,
    Rom,
    /// Memory-mapped peripheral registers or RAM lent by a peripheral.
    Peripheral,
}

/// A contiguous, fixed-size region of the 64KB address space.
///
/// Segments address their contents by offset from `base_address`; the MMU
/// resolves absolute addresses and bounds-checks against `len` before
/// dispatching. Invariant: `base_address + len <= 0x1_0000`.
pub trait AddressSegment: Send {
    fn kind(&self) -> SegmentKind;
    fn base_address(&self) -> u16;
    fn len(&self) -> usize;
    fn writable(&self) -> bool;

    fn read_byte(&self, offset: usize) -> u8;
    fn write_byte(&mut self, offset: usize, value: u8);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A byte buffer backing one address segment, owned by the MMU.
pub struct MemoryBank {
    kind: SegmentKind,
    base: u16,
    data: Vec<u8>,
    writable: bool,
}

impl MemoryBank {
    /// RAM bank, zero-initialized.
    pub fn ram(base: u16, length: usize) -> Result<Self, MemoryError> {
        Self::new(SegmentKind::Ram, base, length, None, true)
    }

    /// ROM bank initialized from an image. Writes depend on the MMU's
    /// write-fault mode; the bank itself reports non-writable.
    pub fn rom(base: u16, image: Vec<u8>) -> Result<Self, MemoryError> {
        let length = image.len();
        Self::new(SegmentKind::Rom, base, length, Some(image), false)
    }

    /// General constructor. An initial-state image must match the segment
    /// length exactly; a mismatch is a fatal configuration error.
    pub fn new(
        kind: SegmentKind,
        base: u16,
        length: usize,
        initial: Option<Vec<u8>>,
        writable: bool,
    ) -> Result<Self, MemoryError> {
        if base as usize + length > 0x1_0000 {
            return Err(MemoryError::SegmentBounds { base, length });
        }
        let data = match initial {
            Some(image) => {
                if image.len() != length {
                    return Err(MemoryError::InitialImageLength {
                        image_len: image.len(),
                        bank_len: length,
                    });
                }
                image
            }
            None => vec![0; length],
        };
        Ok(Self {
            kind,
            base,
            data,
            writable,
        })
    }
}

impl AddressSegment for MemoryBank {
    fn kind(&self) -> SegmentKind {
        self.kind
    }

    fn base_address(&self) -> u16 {
        self.base
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn read_byte(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    fn write_byte(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }
}

/// A bank whose contents are shared between the MMU and a peripheral.
///
/// The peripheral keeps a clone while lending the segment view to the MMU at
/// construction. All access goes through the mutex, so a holder performing a
/// multi-byte transfer (DMA) can take the guard with [`SharedMemoryBank::lock`]
/// for the duration of the copy; the core's reads and writes then block until
/// the guard is released, never observing a torn transfer.
#[derive(Clone)]
pub struct SharedMemoryBank {
    kind: SegmentKind,
    base: u16,
    length: usize,
    writable: bool,
    data: Arc<Mutex<Vec<u8>>>,
}

impl SharedMemoryBank {
    pub fn new(
        kind: SegmentKind,
        base: u16,
        length: usize,
        writable: bool,
    ) -> Result<Self, MemoryError> {
        if base as usize + length > 0x1_0000 {
            return Err(MemoryError::SegmentBounds { base, length });
        }
        Ok(Self {
            kind,
            base,
            length,
            writable,
            data: Arc::new(Mutex::new(vec![0; length])),
        })
    }

    /// Exclusive access for the duration of a block transfer.
    pub fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AddressSegment for SharedMemoryBank {
    fn kind(&self) -> SegmentKind {
        self.kind
    }

    fn base_address(&self) -> u16 {
        self.base
    }

    fn len(&self) -> usize {
        self.length
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn read_byte(&self, offset: usize) -> u8 {
        self.lock()[offset]
    }

    fn write_byte(&mut self, offset: usize, value: u8) {
        self.lock()[offset] = value;
    }
}
