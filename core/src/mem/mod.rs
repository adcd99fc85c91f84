//! Segmented 64KB address space: fixed segments composed into a flat MMU.

pub mod mmu;
pub mod segment;

pub use mmu::{Mmu, WriteFaultMode, WriteNotification};
pub use segment::{AddressSegment, MemoryBank, SegmentKind, SharedMemoryBank};

use thiserror::Error;

/// Errors raised by address-space construction and memory access.
///
/// The configuration variants (`Gap`, `Overlap`, `IncompleteCoverage`,
/// `SegmentBounds`, `InitialImageLength`, `Empty`) are fatal and surface at
/// MMU/bank construction, before any instruction executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("gap in address space: expected a segment at {expected:#06x}, next starts at {found:#06x}")]
    Gap { expected: u16, found: u16 },

    #[error("overlapping segments: expected next segment at {expected:#06x}, found one at {found:#06x}")]
    Overlap { expected: u16, found: u16 },

    #[error("address space ends at {end:#07x}, must cover through 0xFFFF")]
    IncompleteCoverage { end: u32 },

    #[error("segment at {base:#06x} with length {length:#x} exceeds the 64KB address space")]
    SegmentBounds { base: u16, length: usize },

    #[error("initial state image is {image_len} bytes, bank is {bank_len} bytes")]
    InitialImageLength { image_len: usize, bank_len: usize },

    #[error("no address segments configured")]
    Empty,

    #[error("segmentation fault: write to non-writable segment at {address:#06x}")]
    SegmentFault { address: u16 },

    #[error("instruction decode ran past the end of the address space at {address:#06x}")]
    DecodeOverrun { address: u16 },
}
