pub mod cache;
pub mod config;
pub mod cpu;
pub mod interrupts;
pub mod mem;
pub mod peripherals;
pub mod runner;
pub mod timer;

pub mod prelude {
    pub use crate::cache::BlockCache;
    pub use crate::config::{
        ClockConfig, CpuCoreBuilder, CpuMode, MemoryBankConfig, PlatformConfig,
    };
    pub use crate::cpu::block::{InstructionBlock, TimingResult};
    pub use crate::cpu::registers::{
        FlagsRegister, Intel8080RegisterState, RegisterSet, Z80RegisterState,
    };
    pub use crate::cpu::CoreError;
    pub use crate::interrupts::{InterruptLine, InterruptManager, InterruptMode};
    pub use crate::mem::{AddressSegment, MemoryBank, MemoryError, Mmu, SegmentKind, WriteFaultMode};
    pub use crate::peripherals::{IoPeripheral, MemoryMappedPeripheral, Peripheral};
    pub use crate::runner::{CancellationToken, CpuCore};
    pub use crate::timer::{InstructionTimer, TimerMode};
}
