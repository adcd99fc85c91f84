use std::sync::{Arc, Mutex};

use tachyon_core::prelude::*;

use crate::CapturePort;

/// Output-capture port number shared by the simple systems.
pub const OUTPUT_PORT: u8 = 0x00;

/// A Z80 wired to a flat 64KB of RAM and one output-capture port. Programs
/// load anywhere; no clock throttling unless configured.
pub struct SimpleZ80System {
    core: CpuCore,
    output: Arc<Mutex<Vec<u8>>>,
}

impl SimpleZ80System {
    pub fn new() -> Result<Self, CoreError> {
        Self::with_config(|config| config)
    }

    /// Build with a tweak applied to the default platform config, e.g. a
    /// clock or a different fault mode.
    pub fn with_config(
        tweak: impl FnOnce(PlatformConfig) -> PlatformConfig,
    ) -> Result<Self, CoreError> {
        let config = PlatformConfig::new(
            CpuMode::Z80,
            vec![MemoryBankConfig::ram(0, 0x0000, 0x1_0000)],
        );
        let port = CapturePort::new(OUTPUT_PORT);
        let output = port.captured();
        let core = CpuCoreBuilder::new(tweak(config))
            .with_io_peripheral(Box::new(port))
            .build()?;
        Ok(Self { core, output })
    }

    pub fn core(&self) -> &CpuCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut CpuCore {
        &mut self.core
    }

    pub fn load_program(&mut self, offset: u16, program: &[u8]) -> Result<(), MemoryError> {
        log::debug!("loading {} bytes at {offset:#06x}", program.len());
        self.core.mmu_mut().write_bytes(offset, program)
    }

    /// Run `steps` driver iterations without pacing interruptions.
    pub fn run_steps(&mut self, steps: usize) -> Result<TimingResult, CoreError> {
        let token = CancellationToken::new();
        let mut total = TimingResult::default();
        for _ in 0..steps {
            let retired = self.core.step(&token)?;
            total.accumulate(retired.machine_cycles, retired.throttling_states);
        }
        Ok(total)
    }

    /// Bytes the program wrote to the output port so far.
    pub fn output(&self) -> Vec<u8> {
        self.output.lock().unwrap().clone()
    }

    pub fn state(&self) -> Z80RegisterState {
        self.core.z80_state()
    }
}
