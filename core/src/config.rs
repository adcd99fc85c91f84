//! Platform configuration and the core builder.
//!
//! Everything the core needs is decided here, once, before construction:
//! CPU mode, memory-bank layout, clock parameters, fault policies. There is
//! no runtime wiring; the builder assembles the parts and hands back a
//! [`CpuCore`].

use serde::{Deserialize, Serialize};

use crate::cache::BlockCache;
use crate::cpu::alu::Alu;
use crate::cpu::decode::InstructionDecoder;
use crate::cpu::registers::RegisterSet;
use crate::cpu::CoreError;
use crate::interrupts::InterruptManager;
use crate::mem::{AddressSegment, MemoryBank, Mmu, SegmentKind, WriteFaultMode};
use crate::peripherals::{IoPeripheral, MemoryMappedPeripheral, PeripheralManager};
use crate::runner::CpuCore;
use crate::timer::{InstructionTimer, TimerMode};

/// Which opcode table and register model the core emulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CpuMode {
    Intel8080,
    #[default]
    Z80,
    /// The GameBoy-flavored variant: Z80 register/ALU model with the SM83
    /// opcode table (no IX/IY/ED, LDH/HL± forms, SWAP, STOP).
    GameBoy,
}

/// One memory bank in the platform's address map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryBankConfig {
    pub id: u8,
    pub kind: SegmentKind,
    pub base_address: u16,
    pub length: usize,
    /// Initial byte image; must match `length` exactly when present.
    #[serde(default)]
    pub initial_contents: Option<Vec<u8>>,
    pub writable: bool,
}

impl MemoryBankConfig {
    pub fn ram(id: u8, base_address: u16, length: usize) -> Self {
        Self {
            id,
            kind: SegmentKind::Ram,
            base_address,
            length,
            initial_contents: None,
            writable: true,
        }
    }

    pub fn rom(id: u8, base_address: u16, image: Vec<u8>) -> Self {
        Self {
            id,
            kind: SegmentKind::Rom,
            base_address,
            length: image.len(),
            initial_contents: Some(image),
            writable: false,
        }
    }
}

/// Virtual clock rates in MHz. `None` throughout means unthrottled.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClockConfig {
    pub machine_cycle_mhz: Option<f64>,
    pub throttling_state_mhz: Option<f64>,
}

impl ClockConfig {
    /// Throttling states are preferred when available for their finer
    /// granularity.
    pub fn timer_mode(&self) -> TimerMode {
        if let Some(mhz) = self.throttling_state_mhz {
            TimerMode::ThrottlingStates { mhz }
        } else if let Some(mhz) = self.machine_cycle_mhz {
            TimerMode::MachineCycles { mhz }
        } else {
            TimerMode::Null
        }
    }
}

fn default_max_block_instructions() -> usize {
    64
}

/// Loaded from external configuration before core construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub cpu_mode: CpuMode,
    pub banks: Vec<MemoryBankConfig>,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub write_fault_mode: WriteFaultMode,
    /// Escalate undefined opcodes to a fatal lock instead of NOP.
    #[serde(default)]
    pub lock_on_undefined: bool,
    #[serde(default = "default_max_block_instructions")]
    pub max_block_instructions: usize,
}

impl PlatformConfig {
    pub fn new(cpu_mode: CpuMode, banks: Vec<MemoryBankConfig>) -> Self {
        Self {
            cpu_mode,
            banks,
            clock: ClockConfig::default(),
            write_fault_mode: WriteFaultMode::default(),
            lock_on_undefined: false,
            max_block_instructions: default_max_block_instructions(),
        }
    }
}

/// Assembles a [`CpuCore`] from configuration plus attached peripherals.
pub struct CpuCoreBuilder {
    config: PlatformConfig,
    io_peripherals: Vec<Box<dyn IoPeripheral>>,
    memory_mapped: Vec<Box<dyn MemoryMappedPeripheral>>,
}

impl CpuCoreBuilder {
    pub fn new(config: PlatformConfig) -> Self {
        Self {
            config,
            io_peripherals: Vec::new(),
            memory_mapped: Vec::new(),
        }
    }

    pub fn with_io_peripheral(mut self, peripheral: Box<dyn IoPeripheral>) -> Self {
        self.io_peripherals.push(peripheral);
        self
    }

    pub fn with_memory_mapped_peripheral(
        mut self,
        peripheral: Box<dyn MemoryMappedPeripheral>,
    ) -> Self {
        self.memory_mapped.push(peripheral);
        self
    }

    /// Validate the memory map and build the core. Configuration errors
    /// (segment gap/overlap, image-length mismatch) surface here, before any
    /// instruction executes.
    pub fn build(mut self) -> Result<CpuCore, CoreError> {
        let mut segments: Vec<Box<dyn AddressSegment>> = Vec::new();
        for bank in &self.config.banks {
            let segment = MemoryBank::new(
                bank.kind,
                bank.base_address,
                bank.length,
                bank.initial_contents.clone(),
                bank.writable,
            )?;
            segments.push(Box::new(segment));
        }
        let mut peripherals = PeripheralManager::new();
        for mut peripheral in self.memory_mapped.drain(..) {
            segments.extend(peripheral.take_segments());
            peripherals.attach_memory_mapped(peripheral);
        }
        for peripheral in self.io_peripherals.drain(..) {
            peripherals.attach_io(peripheral);
        }

        let mut mmu = Mmu::new(segments, self.config.write_fault_mode)?;
        let cache = BlockCache::new(mmu.subscribe_writes());
        let decoder = InstructionDecoder::new(
            self.config.cpu_mode,
            self.config.lock_on_undefined,
            self.config.max_block_instructions,
        );
        let alu = Alu::new(self.config.cpu_mode == CpuMode::Intel8080);
        let interrupts = InterruptManager::new(self.config.cpu_mode);
        let timer = InstructionTimer::new(self.config.clock.timer_mode());

        Ok(CpuCore::from_parts(
            self.config.cpu_mode,
            RegisterSet::new(),
            mmu,
            alu,
            decoder,
            cache,
            interrupts,
            timer,
            peripherals,
        ))
    }
}
